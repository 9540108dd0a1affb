//! TTL key-value store backing failure counters and the token blacklist.
//!
//! Any store offering atomic increment-with-TTL and get/set/delete suffices;
//! the in-memory implementation below is adequate for a single-instance
//! deployment. Methods are fallible so callers can decide whether a store
//! outage fails open or closed.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

pub trait TtlStore: Send + Sync {
    /// Atomically increment a counter, creating it with `ttl_on_create` when
    /// absent or expired. Returns the new value.
    fn increment(&self, key: &str, ttl_on_create: Duration) -> Result<u64>;
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    /// Remaining lifetime of a live key, `None` when absent or expired.
    fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>>;
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// `Mutex<HashMap>` store with lazy expiry on access plus a periodic reaper.
#[derive(Debug, Default)]
pub struct MemoryTtlStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryTtlStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a background task that evicts expired entries on a fixed cadence.
    pub fn spawn_reaper(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                store.reap();
            }
        })
    }

    fn reap(&self) {
        let now = Instant::now();
        if let Ok(mut entries) = self.entries.lock() {
            let before = entries.len();
            entries.retain(|_, entry| entry.live(now));
            let evicted = before - entries.len();
            if evicted > 0 {
                debug!(evicted, "reaped expired ttl entries");
            }
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("ttl store mutex poisoned"))
    }
}

impl TtlStore for MemoryTtlStore {
    fn increment(&self, key: &str, ttl_on_create: Duration) -> Result<u64> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        match entries.get_mut(key) {
            Some(entry) if entry.live(now) => {
                let current: u64 = entry.value.parse().unwrap_or(0);
                let next = current.saturating_add(1);
                entry.value = next.to_string();
                Ok(next)
            }
            _ => {
                // First failure of a new window: fresh TTL.
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: now + ttl_on_create,
                    },
                );
                Ok(1)
            }
        }
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if entry.live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.lock()?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.lock()?;
        entries.remove(key);
        Ok(())
    }

    fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        let entries = self.lock()?;
        Ok(entries
            .get(key)
            .filter(|entry| entry.live(now))
            .map(|entry| entry.expires_at - now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_creates_then_counts() -> Result<()> {
        let store = MemoryTtlStore::new();
        assert_eq!(store.increment("k", Duration::from_secs(60))?, 1);
        assert_eq!(store.increment("k", Duration::from_secs(60))?, 2);
        assert_eq!(store.increment("k", Duration::from_secs(60))?, 3);
        assert_eq!(store.get("k")?, Some("3".to_string()));
        Ok(())
    }

    #[test]
    fn increment_restarts_after_expiry() -> Result<()> {
        let store = MemoryTtlStore::new();
        store.increment("k", Duration::from_millis(20))?;
        store.increment("k", Duration::from_millis(20))?;
        std::thread::sleep(Duration::from_millis(40));
        // Expired window: the counter recreates with a fresh TTL.
        assert_eq!(store.increment("k", Duration::from_secs(60))?, 1);
        Ok(())
    }

    #[test]
    fn get_hides_expired_entries() -> Result<()> {
        let store = MemoryTtlStore::new();
        store.set("k", "v", Duration::from_millis(20))?;
        assert_eq!(store.get("k")?, Some("v".to_string()));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(store.get("k")?, None);
        Ok(())
    }

    #[test]
    fn delete_removes_live_entries() -> Result<()> {
        let store = MemoryTtlStore::new();
        store.set("k", "v", Duration::from_secs(60))?;
        store.delete("k")?;
        assert_eq!(store.get("k")?, None);
        Ok(())
    }

    #[test]
    fn remaining_ttl_reports_live_keys_only() -> Result<()> {
        let store = MemoryTtlStore::new();
        store.set("k", "v", Duration::from_secs(60))?;
        let remaining = store.remaining_ttl("k")?.map(|d| d.as_secs());
        assert!(remaining.is_some_and(|secs| secs >= 59));
        assert_eq!(store.remaining_ttl("missing")?, None);
        Ok(())
    }

    #[test]
    fn reap_evicts_expired_entries() -> Result<()> {
        let store = MemoryTtlStore::new();
        store.set("gone", "v", Duration::from_millis(10))?;
        store.set("kept", "v", Duration::from_secs(60))?;
        std::thread::sleep(Duration::from_millis(30));
        store.reap();
        let entries = store.lock()?;
        assert!(!entries.contains_key("gone"));
        assert!(entries.contains_key("kept"));
        Ok(())
    }
}
