use std::{fmt, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    BoxedSource, Connection, ConnectionConfig, ConnectionError, DatabaseError, Driver, Error, Result,
    ScopeCommand, ScopeStack, StateError, Transaction, Version,
};

const OPEN_OPERATION: &str = "open";
const CLOSE_OPERATION: &str = "close";
const BEGIN_OPERATION: &str = "begin";
const COMMIT_OPERATION: &str = "commit";
const ROLLBACK_OPERATION: &str = "rollback";
const EXECUTE_OPERATION: &str = "execute";
const SERVER_VERSION_OPERATION: &str = "server_version";

/// Owns one engine connection and the depth of the transaction scopes
/// opened on it.
///
/// Nested scopes are mapped onto savepoints named after their depth, so the
/// engine only ever sees a single top-level transaction. The depth changes
/// only after the engine accepted every statement of a transition.
///
/// An adapter does no locking of its own. Keep one adapter per thread, or
/// wrap it in a mutex that covers every mutating call.
pub struct Adapter {
    driver: Arc<dyn Driver>,
    connection: Option<Box<dyn Connection>>,
    location: Option<String>,
    scopes: ScopeStack,
}

impl Adapter {
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            connection: None,
            location: None,
            scopes: ScopeStack::new(),
        }
    }

    #[must_use]
    pub fn driver_name(&self) -> &'static str {
        self.driver.name()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    #[must_use]
    pub fn nesting_depth(&self) -> usize {
        self.scopes.depth()
    }

    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn open(&mut self, config: &ConnectionConfig) -> Result<()> {
        if let Some(location) = &self.location {
            return Err(StateError::AlreadyOpen {
                location: location.clone(),
            }
            .into());
        }

        info!(
            driver = self.driver.name(),
            location = %config.location,
            read_only = config.options.read_only,
            create_if_missing = config.options.create_if_missing,
            "opening connection"
        );
        let connection = self.driver.connect(config)?;

        self.connection = Some(connection);
        self.location = Some(config.location.clone());
        self.scopes.clear();
        debug!(operation = OPEN_OPERATION, "connection ready");
        Ok(())
    }

    /// Closing an adapter that is not open succeeds without doing anything.
    pub fn close(&mut self) -> Result<()> {
        if self.connection.is_none() {
            return Ok(());
        }
        if !self.scopes.is_empty() {
            return Err(StateError::ScopesOpen {
                operation: CLOSE_OPERATION,
                depth: self.scopes.depth(),
            }
            .into());
        }

        self.release_connection()
    }

    pub fn begin(&mut self) -> Result<()> {
        self.ensure_engine_transaction(BEGIN_OPERATION)?;
        let commands = self.scopes.plan_begin();
        self.run_commands(BEGIN_OPERATION, &commands)?;
        self.scopes.push();
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open(COMMIT_OPERATION)?;
        let commands = self
            .scopes
            .plan_commit()
            .ok_or(StateError::NoOpenScope {
                operation: COMMIT_OPERATION,
            })?;
        self.ensure_engine_transaction(COMMIT_OPERATION)?;
        self.run_commands(COMMIT_OPERATION, &commands)?;
        self.scopes.pop();
        Ok(())
    }

    /// Leaves the innermost scope. When the engine has already rolled the
    /// whole transaction back on its own, the scope is unwound without
    /// issuing any statement.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open(ROLLBACK_OPERATION)?;
        let commands = self
            .scopes
            .plan_rollback()
            .ok_or(StateError::NoOpenScope {
                operation: ROLLBACK_OPERATION,
            })?;
        if self.engine_rolled_back() {
            warn!(
                depth = self.scopes.depth(),
                "engine already rolled back the transaction; unwinding scope without SQL"
            );
            self.scopes.pop();
            return Ok(());
        }
        self.run_commands(ROLLBACK_OPERATION, &commands)?;
        self.scopes.pop();
        Ok(())
    }

    /// Discards every open scope with a single top-level rollback.
    pub fn rollback_all(&mut self) -> Result<()> {
        if self.scopes.is_empty() {
            return Ok(());
        }
        if self.engine_rolled_back() {
            warn!(
                depth = self.scopes.depth(),
                "engine already rolled back the transaction; discarding scopes without SQL"
            );
            self.scopes.clear();
            return Ok(());
        }

        self.run_commands(ROLLBACK_OPERATION, &[ScopeCommand::Rollback])?;
        self.scopes.clear();
        Ok(())
    }

    /// Runs statements that return no rows. The depth is not affected.
    pub fn execute(&self, sql: &str) -> Result<()> {
        let connection = self.connection(EXECUTE_OPERATION)?;
        connection
            .execute(sql)
            .map_err(|source| self.statement_error(sql, self.scopes.depth(), source))
    }

    #[must_use]
    pub fn ping(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|connection| connection.ping())
    }

    pub fn server_version(&self) -> Result<Version> {
        Ok(self.connection(SERVER_VERSION_OPERATION)?.server_version())
    }

    #[must_use]
    pub fn escape(&self, value: &str) -> String {
        escape_literal(value)
    }

    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        self.begin()?;
        let depth = self.scopes.depth();
        Ok(Transaction::new(self, depth))
    }

    /// Runs `body` inside one scope: commit when it returns `Ok`, roll back
    /// when it returns `Err`.
    ///
    /// `body` must leave the depth where it found it. When it leaves extra
    /// scopes open, those and this scope are rolled back. A scope that `body`
    /// already committed or rolled back itself cannot be undone. Either way
    /// the error from `body` is returned if it failed, and
    /// [`StateError::UnbalancedScope`] otherwise.
    pub fn scoped<T, E, F>(&mut self, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Self) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.begin()?;
        let expected = self.scopes.depth();

        let outcome = body(self);

        let actual = self.scopes.depth();
        if actual != expected {
            let unbalanced = Error::from(StateError::UnbalancedScope { expected, actual });
            let unwound = self.unwind_to(expected);
            return match outcome {
                Ok(_) => {
                    unwound?;
                    Err(unbalanced.into())
                }
                Err(error) => {
                    warn!(
                        error = %unbalanced,
                        "scoped block failed and left its scopes unbalanced"
                    );
                    if let Err(unwind_error) = unwound {
                        warn!(
                            error = %unwind_error,
                            "unwinding after failed scoped block did not complete"
                        );
                    }
                    Err(error)
                }
            };
        }

        match outcome {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = self.rollback() {
                    warn!(
                        depth = expected,
                        error = %rollback_error,
                        "rollback after failed scoped block did not complete"
                    );
                }
                Err(error)
            }
        }
    }

    /// Rolls back whatever is still open and closes the connection no matter
    /// what. Reports the first failure.
    pub(crate) fn force_close(&mut self) -> Result<()> {
        if self.connection.is_none() {
            return Ok(());
        }

        let rollback = if self.scopes.is_empty() {
            Ok(())
        } else {
            warn!(
                location = self.location.as_deref().unwrap_or_default(),
                depth = self.scopes.depth(),
                "discarding open transaction scopes before close"
            );
            self.rollback_all()
        };
        let close = self.release_connection();

        rollback.and(close)
    }

    /// Rolls back every scope at or above `depth`.
    fn unwind_to(&mut self, depth: usize) -> Result<()> {
        while self.scopes.depth() >= depth && !self.scopes.is_empty() && self.is_open() {
            self.rollback()?;
        }
        Ok(())
    }

    fn release_connection(&mut self) -> Result<()> {
        let location = self.location.take().unwrap_or_default();
        self.scopes.clear();
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };

        info!(location = %location, "closing connection");
        connection.close().map_err(|source| {
            warn!(location = %location, error = %source, "engine reported an error on close");
            Error::from(DatabaseError::CloseFailed { source })
        })
    }

    fn run_commands(&self, operation: &'static str, commands: &[ScopeCommand]) -> Result<()> {
        let connection = self.connection(operation)?;
        let depth = self.scopes.depth();

        for command in commands {
            let sql = command.to_sql();
            debug!(operation, depth, sql = %sql, "scope transition");
            connection
                .execute(&sql)
                .map_err(|source| self.statement_error(sql, depth, source))?;
        }

        Ok(())
    }

    /// True when scopes are open here but the engine has no transaction.
    fn engine_rolled_back(&self) -> bool {
        !self.scopes.is_empty()
            && self
                .connection
                .as_deref()
                .is_some_and(|connection| !connection.in_transaction())
    }

    fn ensure_engine_transaction(&self, operation: &'static str) -> Result<()> {
        self.ensure_open(operation)?;
        if self.engine_rolled_back() {
            return Err(StateError::TransactionAborted {
                operation,
                depth: self.scopes.depth(),
            }
            .into());
        }
        Ok(())
    }

    fn statement_error(&self, sql: impl Into<String>, depth: usize, source: BoxedSource) -> Error {
        if self.engine_rolled_back() {
            warn!(
                depth,
                "engine rolled back the open transaction after a failed statement"
            );
        }
        DatabaseError::statement_failed(sql, depth, source).into()
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        self.connection(operation).map(|_| ())
    }

    fn connection(&self, operation: &'static str) -> Result<&dyn Connection> {
        self.connection
            .as_deref()
            .ok_or_else(|| ConnectionError::NotOpen { operation }.into())
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        if let Err(error) = self.force_close() {
            warn!(error = %error, "connection released with errors while dropping adapter");
        }
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("driver", &self.driver.name())
            .field("location", &self.location)
            .field("nesting_depth", &self.scopes.depth())
            .finish()
    }
}

/// Doubles single quotes so `value` can sit inside an SQL string literal.
#[must_use]
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
