//! Revocation list for session tokens.
//!
//! Entries are keyed by the serialized token under the `blacklist:` namespace
//! and carry a TTL equal to the token's remaining lifetime at revocation, so
//! nothing has to be stored past the token's own expiry.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::store::TtlStore;

const NAMESPACE: &str = "blacklist";

#[derive(Clone)]
pub struct TokenBlacklist {
    store: Arc<dyn TtlStore>,
}

impl TokenBlacklist {
    #[must_use]
    pub fn new(store: Arc<dyn TtlStore>) -> Self {
        Self { store }
    }

    /// Record a revocation. Re-inserting the same token is a no-op in effect.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn insert(&self, token: &str, principal: &str, remaining: Duration) -> Result<()> {
        self.store.set(&key(token), principal, remaining)
    }

    /// # Errors
    /// Propagates store failures; callers on the validation path must treat a
    /// failure as revoked (fail closed).
    pub fn contains(&self, token: &str) -> Result<bool> {
        Ok(self.store.get(&key(token))?.is_some())
    }
}

fn key(token: &str) -> String {
    format!("{NAMESPACE}:{token}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTtlStore;

    #[test]
    fn insert_then_contains() -> Result<()> {
        let blacklist = TokenBlacklist::new(Arc::new(MemoryTtlStore::new()));
        assert!(!blacklist.contains("abc")?);
        blacklist.insert("abc", "alice", Duration::from_secs(60))?;
        assert!(blacklist.contains("abc")?);
        assert!(!blacklist.contains("other")?);
        Ok(())
    }

    #[test]
    fn entries_expire_with_the_token() -> Result<()> {
        let blacklist = TokenBlacklist::new(Arc::new(MemoryTtlStore::new()));
        blacklist.insert("abc", "alice", Duration::from_millis(20))?;
        std::thread::sleep(Duration::from_millis(40));
        assert!(!blacklist.contains("abc")?);
        Ok(())
    }
}
