//! Principal records and the stores the lockout layer talks to.
//!
//! Credential verification is delegated behind [`CredentialVerifier`]; the
//! lock state machine only reads and writes [`LockState`] through
//! [`PrincipalStore`].

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

pub use crate::policy::PrincipalClass;

/// Lock metadata persisted on the principal record. The failure counter is
/// the source of truth for counts; `attempt_count` is a snapshot written
/// alongside lock transitions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LockState {
    pub locked: bool,
    pub reason: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    /// `None` on a locked record means a manual/permanent lock.
    pub unlock_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
}

impl LockState {
    /// A principal is authenticatable iff it is not locked.
    #[must_use]
    pub const fn authenticatable(&self) -> bool {
        !self.locked
    }
}

#[derive(Clone, Debug)]
pub struct Principal {
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub class: PrincipalClass,
    pub lock: LockState,
    pub last_failed_login: Option<DateTime<Utc>>,
}

impl Principal {
    #[must_use]
    pub fn new(username: &str, password_hash: &str, role: &str, class: PrincipalClass) -> Self {
        Self {
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role: role.to_string(),
            class,
            lock: LockState::default(),
            last_failed_login: None,
        }
    }
}

pub trait PrincipalStore: Send + Sync {
    /// # Errors
    /// Propagates store failures.
    fn find_by_username(&self, username: &str) -> Result<Option<Principal>>;
    /// # Errors
    /// Propagates store failures.
    fn save(&self, principal: Principal) -> Result<()>;
    /// Principals locked with a non-null `unlock_at` at or before `now`.
    /// Feeds the auto-unlock sweep.
    ///
    /// # Errors
    /// Propagates store failures.
    fn expired_locks(&self, now: DateTime<Utc>) -> Result<Vec<Principal>>;
}

/// Opaque password verifier; the hashing scheme is not this layer's business.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, presented: &str, stored_hash: &str) -> bool;
}

/// Verifier for stores that keep a SHA-256 hex digest of the password.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Verifier;

impl Sha256Verifier {
    #[must_use]
    pub fn hash(password: &str) -> String {
        let digest = Sha256::digest(password.as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl CredentialVerifier for Sha256Verifier {
    fn verify(&self, presented: &str, stored_hash: &str) -> bool {
        Self::hash(presented) == stored_hash
    }
}

/// Single-instance in-memory principal store.
#[derive(Default)]
pub struct MemoryPrincipalStore {
    principals: Mutex<HashMap<String, Principal>>,
}

impl MemoryPrincipalStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a principal, replacing any existing record with the same name.
    ///
    /// # Errors
    /// Fails only on a poisoned lock.
    pub fn insert(&self, principal: Principal) -> Result<()> {
        self.lock()?
            .insert(principal.username.clone(), principal);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Principal>>> {
        self.principals
            .lock()
            .map_err(|_| anyhow!("principal store mutex poisoned"))
    }
}

impl PrincipalStore for MemoryPrincipalStore {
    fn find_by_username(&self, username: &str) -> Result<Option<Principal>> {
        Ok(self.lock()?.get(username).cloned())
    }

    fn save(&self, principal: Principal) -> Result<()> {
        self.insert(principal)
    }

    fn expired_locks(&self, now: DateTime<Utc>) -> Result<Vec<Principal>> {
        Ok(self
            .lock()?
            .values()
            .filter(|p| p.lock.locked && p.lock.unlock_at.is_some_and(|at| at <= now))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn sha256_verifier_accepts_matching_password() {
        let hash = Sha256Verifier::hash("hunter2");
        assert!(Sha256Verifier.verify("hunter2", &hash));
        assert!(!Sha256Verifier.verify("hunter3", &hash));
    }

    #[test]
    fn store_round_trips_principals() -> Result<()> {
        let store = MemoryPrincipalStore::new();
        store.insert(Principal::new(
            "alice",
            &Sha256Verifier::hash("pw"),
            "user",
            PrincipalClass::Ordinary,
        ))?;
        let found = store.find_by_username("alice")?.expect("alice exists");
        assert_eq!(found.role, "user");
        assert!(found.lock.authenticatable());
        assert!(store.find_by_username("bob")?.is_none());
        Ok(())
    }

    #[test]
    fn expired_locks_skips_permanent_and_future_locks() -> Result<()> {
        let store = MemoryPrincipalStore::new();
        let now = Utc::now();

        let mut expired = Principal::new("expired", "h", "user", PrincipalClass::Ordinary);
        expired.lock.locked = true;
        expired.lock.unlock_at = Some(now - Duration::minutes(1));
        store.insert(expired)?;

        let mut pending = Principal::new("pending", "h", "user", PrincipalClass::Ordinary);
        pending.lock.locked = true;
        pending.lock.unlock_at = Some(now + Duration::minutes(30));
        store.insert(pending)?;

        let mut permanent = Principal::new("permanent", "h", "user", PrincipalClass::Ordinary);
        permanent.lock.locked = true;
        permanent.lock.unlock_at = None;
        store.insert(permanent)?;

        let due = store.expired_locks(now)?;
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].username, "expired");
        Ok(())
    }
}
