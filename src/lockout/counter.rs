//! Namespace-scoped consecutive-failure counter over the TTL store.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::store::TtlStore;

#[derive(Clone)]
pub struct FailureCounter {
    store: Arc<dyn TtlStore>,
    namespace: &'static str,
    window: Duration,
}

impl FailureCounter {
    #[must_use]
    pub fn new(store: Arc<dyn TtlStore>, namespace: &'static str, window: Duration) -> Self {
        Self {
            store,
            namespace,
            window,
        }
    }

    /// Atomically record a failure. The first failure of a new window creates
    /// the counter with a fresh TTL; later failures keep the existing window.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn record_failure(&self, key: &str) -> Result<u64> {
        self.store.increment(&self.key(key), self.window)
    }

    /// # Errors
    /// Propagates store failures.
    pub fn current(&self, key: &str) -> Result<u64> {
        Ok(self
            .store
            .get(&self.key(key))?
            .and_then(|value| value.parse().ok())
            .unwrap_or(0))
    }

    /// # Errors
    /// Propagates store failures.
    pub fn clear(&self, key: &str) -> Result<()> {
        self.store.delete(&self.key(key))
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{key}", self.namespace)
    }
}
