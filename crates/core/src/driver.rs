use crate::{BoxedSource, ConnectionConfig, Result, Version};

pub type EngineResult<T> = std::result::Result<T, BoxedSource>;

/// An embedded database engine that can hand out connections.
pub trait Driver: Send + Sync {
    fn name(&self) -> &'static str;
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>>;
}

/// One live engine handle. Not shared between threads; the owning adapter
/// serializes every call.
pub trait Connection: Send {
    fn execute(&self, sql: &str) -> EngineResult<()>;
    fn ping(&self) -> bool;
    /// Whether the engine currently has a transaction open. Engines may end
    /// a transaction on their own, for example when a trigger raises
    /// `ROLLBACK`.
    fn in_transaction(&self) -> bool;
    fn server_version(&self) -> Version;
    /// Releases the handle. The handle is gone even when an error is returned.
    fn close(self: Box<Self>) -> EngineResult<()>;
}
