//! SQLite driver for `nestql-core`, backed by `rusqlite` with a bundled
//! SQLite build.
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use nestql_core::{Adapter, ConnectionConfig};
//! use nestql_driver_sqlite::SqliteDriver;
//!
//! let mut adapter = Adapter::new(Arc::new(SqliteDriver));
//! adapter.open(&ConnectionConfig::new("app.db"))?;
//! adapter.begin()?;
//! adapter.execute("INSERT INTO notes(body) VALUES ('hello')")?;
//! adapter.commit()?;
//! adapter.close()?;
//! ```

use nestql_core::{Connection, ConnectionConfig, Driver, Result};

mod connection;
mod queries;

pub use connection::{
    MINIMUM_SQLITE_VERSION, PRAGMA_KEY_PREFIX, SERVER_VERSION_OVERRIDE_KEY, parse_server_version,
};

pub const SQLITE_DRIVER_NAME: &str = "sqlite";

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        SQLITE_DRIVER_NAME
    }

    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        connection::connect(config)
    }
}
