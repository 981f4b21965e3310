#![allow(dead_code)]

use std::{
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use nestql_core::{
    Adapter, Connection, ConnectionConfig, ConnectionError, Driver, EngineResult, Result, Version,
};

pub const BEGIN_SQL: &str = "BEGIN";
pub const COMMIT_SQL: &str = "COMMIT";
pub const ROLLBACK_SQL: &str = "ROLLBACK";
pub const FAKE_DRIVER_NAME: &str = "fake";

#[derive(Debug)]
struct FailureRule {
    sql: String,
    message: String,
    aborts_transaction: bool,
}

#[derive(Debug)]
struct FakeState {
    executed_sql: Vec<String>,
    fail_on_sql: Option<FailureRule>,
    fail_connect: Option<String>,
    fail_close: Option<String>,
    connects: usize,
    closes: usize,
    in_transaction: bool,
    server_version: Version,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            executed_sql: Vec::new(),
            fail_on_sql: None,
            fail_connect: None,
            fail_close: None,
            connects: 0,
            closes: 0,
            in_transaction: false,
            server_version: Version {
                major: 3,
                minor: 45,
                patch: 0,
            },
        }
    }
}

/// Records every statement it receives. Clones share the same log, so a test
/// can keep a handle after giving the driver to an adapter.
#[derive(Debug, Clone, Default)]
pub struct FakeDriver {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDriver {
    pub fn adapter(&self) -> Adapter {
        Adapter::new(Arc::new(self.clone()))
    }

    pub fn open_adapter(&self) -> Adapter {
        let mut adapter = self.adapter();
        adapter
            .open(&memory_config())
            .expect("fake connection should open");
        adapter
    }

    pub fn set_fail_on_sql(&self, sql: impl Into<String>, message: impl Into<String>) {
        self.state().fail_on_sql = Some(FailureRule {
            sql: sql.into(),
            message: message.into(),
            aborts_transaction: false,
        });
    }

    /// Fails `sql` the way an engine does when the failure also rolls back
    /// the whole transaction.
    pub fn set_abort_on_sql(&self, sql: impl Into<String>, message: impl Into<String>) {
        self.state().fail_on_sql = Some(FailureRule {
            sql: sql.into(),
            message: message.into(),
            aborts_transaction: true,
        });
    }

    pub fn in_transaction(&self) -> bool {
        self.state().in_transaction
    }

    pub fn clear_fail_on_sql(&self) {
        self.state().fail_on_sql = None;
    }

    pub fn set_fail_connect(&self, message: impl Into<String>) {
        self.state().fail_connect = Some(message.into());
    }

    pub fn set_fail_close(&self, message: impl Into<String>) {
        self.state().fail_close = Some(message.into());
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.state().executed_sql.clone()
    }

    pub fn clear_executed_sql(&self) {
        self.state().executed_sql.clear();
    }

    pub fn connects(&self) -> usize {
        self.state().connects
    }

    pub fn closes(&self) -> usize {
        self.state().closes
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Driver for FakeDriver {
    fn name(&self) -> &'static str {
        FAKE_DRIVER_NAME
    }

    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let mut state = self.state();
        if let Some(message) = &state.fail_connect {
            let source = io::Error::other(message.clone());
            return Err(ConnectionError::open_failed(config.location.clone(), source).into());
        }

        state.connects += 1;
        state.in_transaction = false;
        Ok(Box::new(FakeConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

#[derive(Debug)]
struct FakeConnection {
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnection {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connection for FakeConnection {
    fn execute(&self, sql: &str) -> EngineResult<()> {
        let mut state = self.state();

        if let Some(rule) = &state.fail_on_sql
            && rule.sql == sql
        {
            let message = rule.message.clone();
            if rule.aborts_transaction {
                state.in_transaction = false;
            }
            return Err(io::Error::other(message).into());
        }

        if sql == BEGIN_SQL || sql.starts_with("SAVEPOINT ") {
            state.in_transaction = true;
        } else if sql == COMMIT_SQL || sql == ROLLBACK_SQL {
            state.in_transaction = false;
        }
        state.executed_sql.push(sql.to_string());
        Ok(())
    }

    fn ping(&self) -> bool {
        true
    }

    fn in_transaction(&self) -> bool {
        self.state().in_transaction
    }

    fn server_version(&self) -> Version {
        self.state().server_version.clone()
    }

    fn close(self: Box<Self>) -> EngineResult<()> {
        let mut state = self.state();
        state.closes += 1;
        match &state.fail_close {
            Some(message) => Err(io::Error::other(message.clone()).into()),
            None => Ok(()),
        }
    }
}

pub fn memory_config() -> ConnectionConfig {
    ConnectionConfig::new(":memory:")
}
