//! Connection ownership and nested transaction scopes for embedded databases.
//!
//! An [`Adapter`] owns a single engine connection and counts the transaction
//! scopes opened on it. The outermost scope is a plain `BEGIN`/`COMMIT`/
//! `ROLLBACK` transaction; every scope inside it becomes a savepoint named
//! after its depth (`sp2`, `sp3`, ...).
//!
//! Engines plug in through the [`Driver`] and [`Connection`] traits. A host
//! that needs process-wide bookkeeping keeps a [`Registry`].

mod adapter;
mod config;
mod driver;
mod error;
mod registry;
mod scope;
mod transaction;

pub use adapter::{Adapter, escape_literal};
pub use config::{ConnectionConfig, OpenOptions, Version};
pub use driver::{Connection, Driver, EngineResult};
pub use error::{
    BoxedSource, ConnectionError, DatabaseError, Error, ErrorKind, Result, StateError,
};
pub use registry::{AdapterId, Registry};
pub use scope::{ScopeCommand, ScopeStack, savepoint_name};
pub use transaction::Transaction;
