//! Account-lock state machine.
//!
//! Two states per principal: unlocked, or locked with a reason and an
//! optional unlock time (`None` means a manual/permanent lock). The engine is
//! consulted *before* credentials are verified, so a locked account never
//! leaks whether a guessed password was correct.

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::policy::{LockoutPolicy, PrincipalClass};
use crate::principal::{LockState, Principal, PrincipalStore};
use crate::store::TtlStore;

pub mod captcha;
pub mod counter;
pub mod scheduler;

pub use captcha::CaptchaGate;
pub use counter::FailureCounter;
pub use scheduler::AutoUnlockScheduler;

const FAILURE_NAMESPACE: &str = "login:failure";
const LOCK_REASON: &str = "too many failed login attempts";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("account is locked")]
    AccountLocked {
        unlock_at: Option<DateTime<Utc>>,
    },
    #[error("invalid username or password")]
    CredentialsInvalid { remaining_attempts: u32 },
    #[error("captcha required")]
    CaptchaRequired,
    #[error("captcha invalid")]
    CaptchaInvalid,
}

pub struct LockoutEngine {
    counter: FailureCounter,
    principals: Arc<dyn PrincipalStore>,
    policy: LockoutPolicy,
}

impl LockoutEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn TtlStore>,
        principals: Arc<dyn PrincipalStore>,
        policy: LockoutPolicy,
    ) -> Self {
        #[allow(clippy::cast_sign_loss)]
        let window = Duration::from_secs(policy.reset_window_hours().max(0) as u64 * 3600);
        Self {
            counter: FailureCounter::new(store, FAILURE_NAMESPACE, window),
            principals,
            policy,
        }
    }

    #[must_use]
    pub fn principals(&self) -> &Arc<dyn PrincipalStore> {
        &self.principals
    }

    /// Gate an authentication attempt. Must run before any credential
    /// comparison. An expired lock is reconciled lazily here, so a principal
    /// whose lock ran out logs in without waiting for the scheduler.
    ///
    /// # Errors
    /// [`AuthError::AccountLocked`] while the lock is in force.
    pub fn ensure_unlocked(
        &self,
        principal: &mut Principal,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        if !principal.lock.locked {
            return Ok(());
        }
        if principal.lock.unlock_at.is_some_and(|at| at <= now) {
            self.apply_unlock(principal);
            return Ok(());
        }
        Err(AuthError::AccountLocked {
            unlock_at: principal.lock.unlock_at,
        })
    }

    /// Record a failed credential check and return the error to surface.
    /// Crossing the class threshold performs the lock transition; the counter
    /// is retained so the attempt count stays auditable.
    pub fn on_failure(&self, principal: &mut Principal, now: DateTime<Utc>) -> AuthError {
        let threshold = self.policy.threshold(principal.class);

        let count = match self.counter.record_failure(&principal.username) {
            Ok(count) => count,
            Err(err) => {
                // A counter outage must not lock accounts; report the failure
                // without advancing the state machine.
                error!("failure counter unavailable: {err}");
                return AuthError::CredentialsInvalid {
                    remaining_attempts: threshold,
                };
            }
        };

        principal.last_failed_login = Some(now);

        if count >= u64::from(threshold) {
            let minutes = self.policy.lock_duration_minutes(principal.class);
            let unlock_at = now + ChronoDuration::minutes(minutes);
            principal.lock = LockState {
                locked: true,
                reason: Some(LOCK_REASON.to_string()),
                locked_at: Some(now),
                unlock_at: Some(unlock_at),
                attempt_count: u32::try_from(count).unwrap_or(u32::MAX),
            };
            self.save(principal);
            info!(
                username = %principal.username,
                attempts = count,
                %unlock_at,
                "account locked"
            );
            return AuthError::AccountLocked {
                unlock_at: Some(unlock_at),
            };
        }

        self.save(principal);
        #[allow(clippy::cast_possible_truncation)]
        let remaining = threshold.saturating_sub(count as u32);
        AuthError::CredentialsInvalid {
            remaining_attempts: remaining,
        }
    }

    /// A successful login resets the failure counter; the next failure starts
    /// counting from one.
    pub fn on_success(&self, principal: &mut Principal, now: DateTime<Utc>) {
        if let Err(err) = self.counter.clear(&principal.username) {
            error!("failed to clear failure counter: {err}");
        }
        if principal.lock.locked && principal.lock.unlock_at.is_some_and(|at| at <= now) {
            self.apply_unlock(principal);
        } else {
            self.save(principal);
        }
    }

    /// Administrative override: clear lock metadata, the failure counter, and
    /// the last failed login time unconditionally. Also the transition the
    /// auto-unlock sweep applies; re-unlocking an unlocked account is a no-op.
    ///
    /// # Errors
    /// Propagates principal-store failures.
    pub fn manual_unlock(&self, username: &str) -> Result<bool> {
        let Some(mut principal) = self.principals.find_by_username(username)? else {
            return Ok(false);
        };
        self.apply_unlock(&mut principal);
        Ok(true)
    }

    fn apply_unlock(&self, principal: &mut Principal) {
        principal.lock = LockState::default();
        principal.last_failed_login = None;
        if let Err(err) = self.counter.clear(&principal.username) {
            error!("failed to clear failure counter: {err}");
        }
        self.save(principal);
    }

    fn save(&self, principal: &Principal) {
        if let Err(err) = self.principals.save(principal.clone()) {
            error!(
                username = %principal.username,
                "failed to persist principal: {err}"
            );
        }
    }
}
