//! Shared state for the auth endpoints: the request gate, the lockout
//! engine, and the per-IP challenge gate, wired once at startup.

use std::sync::Arc;
use std::time::Duration;

use crate::envelope::EnvelopeCodec;
use crate::gate::RequestGate;
use crate::lockout::{CaptchaGate, LockoutEngine};
use crate::policy::{CryptoPolicy, LockoutPolicy};
use crate::principal::{CredentialVerifier, PrincipalStore};
use crate::store::TtlStore;
use crate::token::{SessionTokenService, TokenBlacklist};

pub struct GateState {
    gate: RequestGate,
    engine: LockoutEngine,
    captcha: CaptchaGate,
    verifier: Arc<dyn CredentialVerifier>,
    policy: Arc<CryptoPolicy>,
}

impl GateState {
    /// Wire the full security layer over one TTL store and one principal
    /// store. Policy warnings are logged here, once, at startup.
    #[must_use]
    pub fn build(
        policy: CryptoPolicy,
        lockout: LockoutPolicy,
        store: Arc<dyn TtlStore>,
        principals: Arc<dyn PrincipalStore>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        lockout.validate();
        let policy = Arc::new(policy);

        let codec = EnvelopeCodec::new(Arc::clone(&policy));
        let tokens = SessionTokenService::new(
            Arc::clone(&policy),
            TokenBlacklist::new(Arc::clone(&store)),
        );
        let gate = RequestGate::new(codec, tokens);

        #[allow(clippy::cast_sign_loss)]
        let reset_window =
            Duration::from_secs(lockout.reset_window_hours().max(0) as u64 * 3600);
        let captcha = CaptchaGate::new(
            Arc::clone(&store),
            lockout.captcha_threshold(),
            reset_window,
        );
        let engine = LockoutEngine::new(store, principals, lockout);

        Self {
            gate,
            engine,
            captcha,
            verifier,
            policy,
        }
    }

    #[must_use]
    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    #[must_use]
    pub fn engine(&self) -> &LockoutEngine {
        &self.engine
    }

    #[must_use]
    pub fn captcha(&self) -> &CaptchaGate {
        &self.captcha
    }

    #[must_use]
    pub fn verifier(&self) -> &dyn CredentialVerifier {
        self.verifier.as_ref()
    }

    #[must_use]
    pub fn policy(&self) -> &CryptoPolicy {
        &self.policy
    }
}
