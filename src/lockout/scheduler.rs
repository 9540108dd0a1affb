//! Periodic reconciliation of expired locks.
//!
//! An explicit tokio task, not a framework hook: the interval comes from
//! configuration and the sweep itself runs under a soft deadline so a slow
//! principal store cannot block the next tick indefinitely. Each unlock is
//! idempotent, so concurrent logins and redundant instances are safe.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::lockout::LockoutEngine;

pub struct AutoUnlockScheduler {
    engine: Arc<LockoutEngine>,
    every: Duration,
    soft_deadline: Duration,
}

impl AutoUnlockScheduler {
    #[must_use]
    pub fn new(engine: Arc<LockoutEngine>, every: Duration) -> Self {
        Self {
            engine,
            every,
            soft_deadline: every.min(Duration::from_secs(30)),
        }
    }

    /// One sweep: unlock every principal whose `unlock_at` has passed.
    /// Returns the number of accounts transitioned.
    ///
    /// # Errors
    /// Propagates principal-store failures; a failed sweep is retried on the
    /// next tick.
    pub fn run_once(engine: &LockoutEngine) -> Result<usize> {
        let now = Utc::now();
        let due = engine.principals().expired_locks(now)?;
        let mut unlocked = 0;
        for principal in due {
            if engine.manual_unlock(&principal.username)? {
                unlocked += 1;
            }
        }
        if unlocked > 0 {
            info!(unlocked, "auto-unlock sweep transitioned expired locks");
        }
        Ok(unlocked)
    }

    /// Start the periodic task.
    pub fn spawn(self) -> JoinHandle<()> {
        let Self {
            engine,
            every,
            soft_deadline,
        } = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let engine = Arc::clone(&engine);
                let sweep =
                    tokio::task::spawn_blocking(move || Self::run_once(engine.as_ref()));
                match tokio::time::timeout(soft_deadline, sweep).await {
                    Ok(Ok(Ok(_))) => {}
                    Ok(Ok(Err(err))) => error!("auto-unlock sweep failed: {err}"),
                    Ok(Err(err)) => error!("auto-unlock sweep panicked: {err}"),
                    Err(_) => warn!(
                        deadline_secs = soft_deadline.as_secs(),
                        "auto-unlock sweep missed its soft deadline"
                    ),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{LockoutPolicy, PrincipalClass};
    use crate::principal::{MemoryPrincipalStore, Principal, PrincipalStore};
    use crate::store::MemoryTtlStore;
    use chrono::Duration as ChronoDuration;

    fn engine_with(principals: Arc<MemoryPrincipalStore>) -> LockoutEngine {
        LockoutEngine::new(
            Arc::new(MemoryTtlStore::new()),
            principals as Arc<dyn PrincipalStore>,
            LockoutPolicy::default(),
        )
    }

    fn locked_principal(username: &str, minutes_ago: i64) -> Principal {
        let mut principal = Principal::new(username, "h", "user", PrincipalClass::Ordinary);
        principal.lock.locked = true;
        principal.lock.unlock_at = Some(Utc::now() - ChronoDuration::minutes(minutes_ago));
        principal
    }

    #[test]
    fn sweep_unlocks_expired_locks_exactly_once() -> Result<()> {
        let principals = Arc::new(MemoryPrincipalStore::new());
        principals.insert(locked_principal("alice", 5))?;

        let mut pending = Principal::new("bob", "h", "user", PrincipalClass::Ordinary);
        pending.lock.locked = true;
        pending.lock.unlock_at = Some(Utc::now() + ChronoDuration::minutes(30));
        principals.insert(pending)?;

        // Permanent locks are never auto-unlocked.
        let mut permanent = Principal::new("carol", "h", "user", PrincipalClass::Ordinary);
        permanent.lock.locked = true;
        permanent.lock.unlock_at = None;
        principals.insert(permanent)?;

        let engine = engine_with(Arc::<MemoryPrincipalStore>::clone(&principals));
        assert_eq!(AutoUnlockScheduler::run_once(&engine)?, 1);

        let alice = principals.find_by_username("alice")?.unwrap();
        assert!(alice.lock.authenticatable());
        let bob = principals.find_by_username("bob")?.unwrap();
        assert!(bob.lock.locked);
        let carol = principals.find_by_username("carol")?.unwrap();
        assert!(carol.lock.locked);

        // Idempotence: a second run is a no-op.
        assert_eq!(AutoUnlockScheduler::run_once(&engine)?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn spawned_task_performs_the_sweep() -> Result<()> {
        let principals = Arc::new(MemoryPrincipalStore::new());
        principals.insert(locked_principal("alice", 5))?;
        let engine = Arc::new(engine_with(Arc::<MemoryPrincipalStore>::clone(&principals)));

        let scheduler =
            AutoUnlockScheduler::new(Arc::clone(&engine), Duration::from_millis(10));
        let handle = scheduler.spawn();

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        let alice = principals.find_by_username("alice")?.unwrap();
        assert!(alice.lock.authenticatable());
        Ok(())
    }
}
