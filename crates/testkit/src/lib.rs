//! YAML scenarios for exercising nestql drivers.
//!
//! A scenario is a list of adapter operations (`open`, `begin`, `commit`,
//! ...) interleaved with state assertions. Any [`nestql_core::Driver`] can be
//! replayed against the same scenario file.

mod yaml_runner;

pub use yaml_runner::{
    ExpectedErrorKind, FailingStep, OpenStep, RunnerError, RunnerResult, Scenario,
    ScenarioResult, Step, load_scenarios_from_str, run_scenario,
};
