//! Per-client-IP challenge gate for the public surface.
//!
//! A simplified failure tracker: it never locks, only raises a
//! "challenge required" flag once a lower, capped threshold is crossed, and
//! resets on TTL expiry or a successful login. The counter store failing must
//! never block a legitimate login, so every path here fails open.

use anyhow::Result;
use rand::{rngs::OsRng, Rng};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::lockout::counter::FailureCounter;
use crate::store::TtlStore;

const IP_NAMESPACE: &str = "login:ip";
const CHALLENGE_NAMESPACE: &str = "login:captcha";
const CHALLENGE_LEN: usize = 6;
const CHALLENGE_TTL: Duration = Duration::from_secs(5 * 60);
const CHALLENGE_ALPHABET: &[u8] = b"23456789abcdefghjkmnpqrstuvwxyz";

#[derive(Clone)]
pub struct CaptchaGate {
    counter: FailureCounter,
    store: Arc<dyn TtlStore>,
    threshold: u32,
}

impl CaptchaGate {
    #[must_use]
    pub fn new(store: Arc<dyn TtlStore>, threshold: u32, window: Duration) -> Self {
        Self {
            counter: FailureCounter::new(Arc::clone(&store), IP_NAMESPACE, window),
            store,
            threshold,
        }
    }

    /// Whether the next attempt from this IP must carry a CAPTCHA solve.
    #[must_use]
    pub fn required(&self, ip: &str) -> bool {
        match self.counter.current(ip) {
            Ok(count) => count >= u64::from(self.threshold),
            Err(err) => {
                error!("captcha counter unavailable, failing open: {err}");
                false
            }
        }
    }

    /// Record a failed attempt; returns whether the *next* attempt needs a
    /// CAPTCHA solve.
    pub fn on_failure(&self, ip: &str) -> bool {
        match self.counter.record_failure(ip) {
            Ok(count) => count >= u64::from(self.threshold),
            Err(err) => {
                error!("captcha counter unavailable, failing open: {err}");
                false
            }
        }
    }

    /// A successful login clears the IP counter and any pending challenge.
    pub fn on_success(&self, ip: &str) {
        if let Err(err) = self.counter.clear(ip) {
            error!("failed to clear captcha counter: {err}");
        }
        if let Err(err) = self.store.delete(&challenge_key(ip)) {
            error!("failed to clear captcha challenge: {err}");
        }
    }

    /// Generate and store a fresh challenge for this IP. Rendering the
    /// challenge to the user (image, audio) is the caller's concern.
    ///
    /// # Errors
    /// Propagates store failures; issuing a challenge is not a login attempt,
    /// so there is nothing to fail open here.
    pub fn issue_challenge(&self, ip: &str) -> Result<String> {
        let mut rng = OsRng;
        let code: String = (0..CHALLENGE_LEN)
            .map(|_| {
                let idx = rng.gen_range(0..CHALLENGE_ALPHABET.len());
                CHALLENGE_ALPHABET[idx] as char
            })
            .collect();
        self.store.set(&challenge_key(ip), &code, CHALLENGE_TTL)?;
        Ok(code)
    }

    /// Check a presented solve against the stored challenge. Store outage
    /// fails open; a stored challenge compares case-insensitively and is
    /// consumed on success.
    #[must_use]
    pub fn verify(&self, ip: &str, presented: &str) -> bool {
        match self.store.get(&challenge_key(ip)) {
            Ok(Some(expected)) => {
                let ok = expected.eq_ignore_ascii_case(presented.trim());
                if ok {
                    let _ = self.store.delete(&challenge_key(ip));
                }
                ok
            }
            Ok(None) => false,
            Err(err) => {
                error!("captcha challenge store unavailable, failing open: {err}");
                true
            }
        }
    }
}

fn challenge_key(ip: &str) -> String {
    format!("{CHALLENGE_NAMESPACE}:{ip}")
}
