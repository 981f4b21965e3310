use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};

use nestql_core::{Adapter, ConnectionConfig, Driver, ErrorKind, OpenOptions, Version};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const SCENARIO_SOURCE_LABEL: &str = "yaml scenario";

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Adapter(#[from] nestql_core::Error),
    #[error("assertion failed: {0}")]
    Assertion(String),
    #[error("failed to parse {excerpt} at {location}: {source}")]
    Yaml {
        excerpt: String,
        location: String,
        #[source]
        source: serde_yaml::Error,
    },
}

pub type RunnerResult<T> = std::result::Result<T, RunnerError>;

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scenario {
    pub steps: Vec<Step>,
    /// Message of the error the scenario is expected to stop on.
    pub error: Option<String>,
    pub min_version: Option<String>,
    pub max_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Open(OpenStep),
    Close,
    Begin,
    Commit,
    Rollback,
    Execute(String),
    ExpectDepth(usize),
    ExpectOpen(bool),
    Fails(FailingStep),
}

impl Step {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open(_) => "open",
            Self::Close => "close",
            Self::Begin => "begin",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
            Self::Execute(_) => "execute",
            Self::ExpectDepth(_) => "expect_depth",
            Self::ExpectOpen(_) => "expect_open",
            Self::Fails(_) => "fails",
        }
    }
}

/// Overrides applied on top of the runner's base [`ConnectionConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpenStep {
    pub read_only: Option<bool>,
    pub create_if_missing: Option<bool>,
    pub busy_timeout_ms: Option<u32>,
}

impl OpenStep {
    fn config(&self, base: &ConnectionConfig) -> ConnectionConfig {
        let defaults = base.options;
        base.clone().with_options(OpenOptions {
            read_only: self.read_only.unwrap_or(defaults.read_only),
            create_if_missing: self.create_if_missing.unwrap_or(defaults.create_if_missing),
            busy_timeout_ms: self.busy_timeout_ms.or(defaults.busy_timeout_ms),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailingStep {
    pub step: Box<Step>,
    pub kind: ExpectedErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedErrorKind {
    Connection,
    State,
    Database,
}

impl From<ExpectedErrorKind> for ErrorKind {
    fn from(value: ExpectedErrorKind) -> Self {
        match value {
            ExpectedErrorKind::Connection => Self::Connection,
            ExpectedErrorKind::State => Self::State,
            ExpectedErrorKind::Database => Self::Database,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioResult {
    Passed,
    Skipped(String),
    Failed(String),
}

impl ScenarioResult {
    #[must_use]
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

#[derive(Debug)]
struct StepFailure {
    index: usize,
    step: &'static str,
    error: RunnerError,
}

pub fn load_scenarios_from_str(yaml: &str) -> RunnerResult<BTreeMap<String, Scenario>> {
    serde_yaml::from_str(yaml).map_err(|source| parse_yaml_error(yaml, source))
}

/// Replays `scenario` on a fresh adapter built from `driver`. `base` names
/// the database every `open` step connects to.
///
/// When the scenario carries version bounds, a probe connection is opened on
/// `base` first to read the engine version.
pub fn run_scenario(
    driver: Arc<dyn Driver>,
    base: &ConnectionConfig,
    scenario: &Scenario,
) -> ScenarioResult {
    match version_gate(&driver, base, scenario) {
        Ok(Some(reason)) => return ScenarioResult::Skipped(reason),
        Ok(None) => {}
        Err(error) => return ScenarioResult::Failed(format!("version gate: {error}")),
    }

    let mut adapter = Adapter::new(driver);
    let outcome = run_steps(&mut adapter, base, &scenario.steps);

    match (outcome, scenario.error.as_deref()) {
        (Ok(()), None) => ScenarioResult::Passed,
        (Ok(()), Some(expected)) => {
            ScenarioResult::Failed(format!("expected error: {expected}, but got no error"))
        }
        (Err(failure), Some(expected)) => {
            let actual = failure.error.to_string();
            if actual == expected {
                ScenarioResult::Passed
            } else {
                ScenarioResult::Failed(format!(
                    "expected error: {expected}, but step[{}] {} failed with: {actual}",
                    failure.index, failure.step
                ))
            }
        }
        (Err(failure), None) => ScenarioResult::Failed(format!(
            "step[{}] {} failed: {}",
            failure.index, failure.step, failure.error
        )),
    }
}

fn run_steps(
    adapter: &mut Adapter,
    base: &ConnectionConfig,
    steps: &[Step],
) -> std::result::Result<(), StepFailure> {
    for (index, step) in steps.iter().enumerate() {
        debug!(index, step = step.name(), depth = adapter.nesting_depth(), "running scenario step");
        apply_step(adapter, base, step).map_err(|error| StepFailure {
            index,
            step: step.name(),
            error,
        })?;
    }

    Ok(())
}

fn apply_step(adapter: &mut Adapter, base: &ConnectionConfig, step: &Step) -> RunnerResult<()> {
    match step {
        Step::Open(open) => adapter.open(&open.config(base))?,
        Step::Close => adapter.close()?,
        Step::Begin => adapter.begin()?,
        Step::Commit => adapter.commit()?,
        Step::Rollback => adapter.rollback()?,
        Step::Execute(sql) => adapter.execute(sql)?,
        Step::ExpectDepth(expected) => {
            assert_state("nesting depth", *expected, adapter.nesting_depth())?;
        }
        Step::ExpectOpen(expected) => assert_state("open", *expected, adapter.is_open())?,
        Step::Fails(failing) => expect_failure(adapter, base, failing)?,
    }

    Ok(())
}

fn expect_failure(
    adapter: &mut Adapter,
    base: &ConnectionConfig,
    failing: &FailingStep,
) -> RunnerResult<()> {
    let expected = ErrorKind::from(failing.kind);

    match apply_step(adapter, base, &failing.step) {
        Ok(()) => Err(RunnerError::Assertion(format!(
            "expected {} error from `{}`, but it succeeded",
            expected.tag(),
            failing.step.name()
        ))),
        Err(RunnerError::Adapter(error)) if error.kind() == expected => Ok(()),
        Err(error) => Err(RunnerError::Assertion(format!(
            "expected {} error from `{}`, but got: {error}",
            expected.tag(),
            failing.step.name()
        ))),
    }
}

fn assert_state<T>(what: &str, expected: T, actual: T) -> RunnerResult<()>
where
    T: PartialEq + std::fmt::Display,
{
    if expected == actual {
        return Ok(());
    }

    Err(RunnerError::Assertion(format!(
        "{what} mismatch; expected {expected}, actual {actual}"
    )))
}

fn version_gate(
    driver: &Arc<dyn Driver>,
    base: &ConnectionConfig,
    scenario: &Scenario,
) -> RunnerResult<Option<String>> {
    let min_version = normalized_version_requirement(scenario.min_version.as_deref());
    let max_version = normalized_version_requirement(scenario.max_version.as_deref());
    if min_version.is_none() && max_version.is_none() {
        return Ok(None);
    }

    let mut probe = Adapter::new(Arc::clone(driver));
    probe.open(base)?;
    let version = probe.server_version()?;
    probe.close()?;

    version_skip_reason(&version, min_version, max_version)
}

fn version_skip_reason(
    version: &Version,
    min_version: Option<&str>,
    max_version: Option<&str>,
) -> RunnerResult<Option<String>> {
    if let Some(min_version) = min_version
        && compare_version_against_requirement(version, min_version)? == Ordering::Less
    {
        return Ok(Some(format!(
            "Version '{version}' is smaller than min_version '{min_version}'"
        )));
    }

    if let Some(max_version) = max_version
        && compare_version_against_requirement(version, max_version)? == Ordering::Greater
    {
        return Ok(Some(format!(
            "Version '{version}' is larger than max_version '{max_version}'"
        )));
    }

    Ok(None)
}

fn normalized_version_requirement(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|value| !value.is_empty())
}

fn compare_version_against_requirement(
    version: &Version,
    requirement: &str,
) -> RunnerResult<Ordering> {
    let expected = parse_version_requirement(requirement)?;
    let actual = [version.major, version.minor, version.patch];

    for index in 0..actual.len().min(expected.len()) {
        match actual[index].cmp(&expected[index]) {
            Ordering::Equal => continue,
            ordering => return Ok(ordering),
        }
    }

    Ok(Ordering::Equal)
}

fn parse_version_requirement(requirement: &str) -> RunnerResult<Vec<u16>> {
    requirement
        .split('.')
        .map(|segment| parse_version_segment(requirement, segment))
        .collect()
}

fn parse_version_segment(requirement: &str, segment: &str) -> RunnerResult<u16> {
    let digits: String = segment
        .chars()
        .take_while(|ch| ch.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return Err(RunnerError::Assertion(format!(
            "invalid version requirement '{requirement}': no numeric prefix in segment '{segment}'"
        )));
    }

    digits.parse::<u16>().map_err(|_| {
        RunnerError::Assertion(format!(
            "invalid version requirement '{requirement}': segment '{segment}' is out of range"
        ))
    })
}

fn parse_yaml_error(yaml: &str, source: serde_yaml::Error) -> RunnerError {
    let location = source.location().map_or_else(
        || "unknown location".to_string(),
        |location| format!("line {} column {}", location.line(), location.column()),
    );

    RunnerError::Yaml {
        excerpt: source_excerpt(yaml),
        location,
        source,
    }
}

fn source_excerpt(yaml: &str) -> String {
    let trimmed = yaml.trim();
    if trimmed.is_empty() {
        return SCENARIO_SOURCE_LABEL.to_string();
    }

    const MAX_CHARS: usize = 64;
    if trimmed.chars().count() <= MAX_CHARS {
        return trimmed.to_string();
    }

    let mut excerpt: String = trimmed.chars().take(MAX_CHARS).collect();
    excerpt.push_str("...");
    excerpt
}
