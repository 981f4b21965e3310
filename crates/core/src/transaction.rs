use tracing::warn;

use crate::{Adapter, Result};

/// Guard for one transaction scope opened by [`Adapter::transaction`].
///
/// Dropping the guard without calling [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) rolls the scope back.
#[derive(Debug)]
pub struct Transaction<'a> {
    adapter: &'a mut Adapter,
    depth: usize,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(adapter: &'a mut Adapter, depth: usize) -> Self {
        Self {
            adapter,
            depth,
            finished: false,
        }
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn execute(&mut self, sql: &str) -> Result<()> {
        self.adapter.execute(sql)
    }

    /// Opens a scope nested inside this one. The parent guard is borrowed
    /// until the child finishes.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        self.adapter.transaction()
    }

    /// On failure the guard is dropped and the scope is rolled back.
    pub fn commit(mut self) -> Result<()> {
        self.adapter.commit()?;
        self.finished = true;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.adapter.rollback()?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished || self.adapter.nesting_depth() != self.depth {
            return;
        }

        if let Err(error) = self.adapter.rollback() {
            warn!(
                depth = self.depth,
                error = %error,
                "failed to roll back abandoned transaction scope"
            );
        }
    }
}
