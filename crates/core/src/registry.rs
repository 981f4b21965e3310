use std::{collections::BTreeMap, fmt, sync::Arc};

use tracing::{info, warn};

use crate::{Adapter, ConnectionConfig, ConnectionError, Driver, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AdapterId(u64);

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "adapter#{}", self.0)
    }
}

/// Host-owned table of registered drivers and the adapters opened through
/// them.
///
/// Dropping the registry drops every tracked adapter, which releases their
/// connections. Call [`shutdown`](Self::shutdown) instead to observe the
/// errors.
#[derive(Default)]
pub struct Registry {
    drivers: BTreeMap<&'static str, Arc<dyn Driver>>,
    adapters: BTreeMap<AdapterId, Adapter>,
    next_id: u64,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `driver` under its name, replacing any earlier driver with
    /// the same name.
    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        let name = driver.name();
        if self.drivers.insert(name, driver).is_some() {
            warn!(driver = name, "replacing previously registered driver");
        }
    }

    #[must_use]
    pub fn driver(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.get(name).cloned()
    }

    #[must_use]
    pub fn driver_names(&self) -> Vec<&'static str> {
        self.drivers.keys().copied().collect()
    }

    pub fn open(&mut self, driver_name: &str, config: &ConnectionConfig) -> Result<AdapterId> {
        let driver = self
            .driver(driver_name)
            .ok_or_else(|| ConnectionError::UnknownDriver {
                name: driver_name.to_string(),
            })?;

        let mut adapter = Adapter::new(driver);
        adapter.open(config)?;

        let id = AdapterId(self.next_id);
        self.next_id += 1;
        self.adapters.insert(id, adapter);
        Ok(id)
    }

    #[must_use]
    pub fn adapter(&self, id: AdapterId) -> Option<&Adapter> {
        self.adapters.get(&id)
    }

    #[must_use]
    pub fn adapter_mut(&mut self, id: AdapterId) -> Option<&mut Adapter> {
        self.adapters.get_mut(&id)
    }

    /// Closes one adapter and stops tracking it. Unknown ids are ignored.
    /// An adapter with open scopes is left in place and a state error is
    /// returned.
    pub fn release(&mut self, id: AdapterId) -> Result<()> {
        let Some(adapter) = self.adapters.get_mut(&id) else {
            return Ok(());
        };

        let closed = adapter.close();
        if !adapter.is_open() {
            self.adapters.remove(&id);
        }
        closed
    }

    /// Rolls back and closes every tracked adapter. Keeps going after a
    /// failure and returns the first error seen.
    pub fn shutdown(&mut self) -> Result<()> {
        info!(adapters = self.adapters.len(), "shutting down registry");

        let mut first_error = None;
        for (id, mut adapter) in std::mem::take(&mut self.adapters) {
            if let Err(error) = adapter.force_close() {
                warn!(adapter = %id, error = %error, "adapter did not shut down cleanly");
                first_error.get_or_insert(error);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("drivers", &self.driver_names())
            .field("adapters", &self.adapters)
            .finish()
    }
}
