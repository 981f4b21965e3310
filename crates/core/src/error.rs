use std::error::Error as StdError;

use thiserror::Error;

pub type BoxedSource = Box<dyn StdError + Send + Sync>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    State,
    Database,
}

impl ErrorKind {
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::State => "state",
            Self::Database => "database",
        }
    }
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) => ErrorKind::Connection,
            Self::State(_) => ErrorKind::State,
            Self::Database(_) => ErrorKind::Database,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to open `{location}`: {source}")]
    OpenFailed {
        location: String,
        #[source]
        source: BoxedSource,
    },
    #[error("{operation} requires an open connection")]
    NotOpen { operation: &'static str },
    #[error("no driver registered under `{name}`")]
    UnknownDriver { name: String },
    #[error("engine version `{version}` is not supported; requires {minimum}+")]
    UnsupportedVersion { version: String, minimum: String },
}

impl ConnectionError {
    pub fn open_failed<E>(location: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::OpenFailed {
            location: location.into(),
            source: Box::new(source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("{operation} rejected: {depth} transaction scope(s) still open")]
    ScopesOpen {
        operation: &'static str,
        depth: usize,
    },
    #[error("{operation} rejected: no transaction scope is open")]
    NoOpenScope { operation: &'static str },
    #[error("connection to `{location}` is already open")]
    AlreadyOpen { location: String },
    #[error(
        "{operation} rejected: the engine already rolled back the transaction; \
         roll back the {depth} open scope(s) first"
    )]
    TransactionAborted {
        operation: &'static str,
        depth: usize,
    },
    #[error("scoped block left depth {actual}, expected {expected}")]
    UnbalancedScope { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("statement failed at depth {depth}: `{sql}`: {source}")]
    StatementFailed {
        sql: String,
        depth: usize,
        #[source]
        source: BoxedSource,
    },
    #[error("failed to close connection: {source}")]
    CloseFailed {
        #[source]
        source: BoxedSource,
    },
}

impl DatabaseError {
    pub fn statement_failed(sql: impl Into<String>, depth: usize, source: BoxedSource) -> Self {
        Self::StatementFailed {
            sql: sql.into(),
            depth,
            source,
        }
    }
}
