//! Immutable security policy, resolved once at startup.
//!
//! `CryptoPolicy` and `LockoutPolicy` are plain values constructed by the CLI
//! layer and injected into every component that needs them. Nothing mutates
//! them after construction.

use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

const DEFAULT_TIME_WINDOW_MS: i64 = 180_000;
const DEFAULT_MAX_DRIFT_MS: i64 = 60_000;
const DEFAULT_AES_KEY_SIZE: usize = 16;
const DEFAULT_AES_IV_SIZE: usize = 16;
const DEFAULT_TOKEN_TTL_SECONDS: i64 = 2 * 60 * 60;
const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 10;
const DEFAULT_LOCK_DURATION_MINUTES: i64 = 30;
const DEFAULT_ADMIN_MAX_FAILED_ATTEMPTS: u32 = 5;
const DEFAULT_ADMIN_LOCK_DURATION_MINUTES: i64 = 60;
const DEFAULT_RESET_WINDOW_HOURS: i64 = 24;
const DEFAULT_CAPTCHA_THRESHOLD: u32 = 3;
const DEFAULT_AUTO_UNLOCK_INTERVAL_SECONDS: u64 = 300;

// The per-IP challenge threshold is capped so a misconfigured value cannot
// push the challenge past the point where it is useful.
pub const CAPTCHA_THRESHOLD_CAP: u32 = 10;

/// Client surfaces protected by the envelope layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientType {
    H5,
    Admin,
    Mobile,
}

impl ClientType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::H5 => "h5",
            Self::Admin => "admin",
            Self::Mobile => "mobile",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CryptoPolicy {
    base_secret: SecretString,
    device_salt: SecretString,
    aes_algorithm: String,
    aes_transformation: String,
    aes_key_size: usize,
    aes_iv_size: usize,
    hmac_algorithm: String,
    hash_algorithm: String,
    time_window_ms: i64,
    max_drift_ms: i64,
    h5_enabled: bool,
    admin_enabled: bool,
    mobile_enabled: bool,
    jwt_device_binding: bool,
    jwt_additional_encryption: bool,
    require_signature: bool,
    strict_device_binding: bool,
    token_ttl_seconds: i64,
}

impl CryptoPolicy {
    #[must_use]
    pub fn new(base_secret: SecretString, device_salt: SecretString) -> Self {
        Self {
            base_secret,
            device_salt,
            aes_algorithm: "AES".to_string(),
            aes_transformation: "AES/CTR/NoPadding".to_string(),
            aes_key_size: DEFAULT_AES_KEY_SIZE,
            aes_iv_size: DEFAULT_AES_IV_SIZE,
            hmac_algorithm: "HmacSHA256".to_string(),
            hash_algorithm: "SHA-256".to_string(),
            time_window_ms: DEFAULT_TIME_WINDOW_MS,
            max_drift_ms: DEFAULT_MAX_DRIFT_MS,
            h5_enabled: true,
            admin_enabled: true,
            mobile_enabled: true,
            jwt_device_binding: false,
            jwt_additional_encryption: false,
            require_signature: true,
            strict_device_binding: false,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_time_window_ms(mut self, ms: i64) -> Self {
        self.time_window_ms = ms;
        self
    }

    #[must_use]
    pub fn with_max_drift_ms(mut self, ms: i64) -> Self {
        self.max_drift_ms = ms;
        self
    }

    #[must_use]
    pub fn with_aes_algorithm(mut self, algorithm: String) -> Self {
        self.aes_algorithm = algorithm;
        self
    }

    #[must_use]
    pub fn with_aes_transformation(mut self, transformation: String) -> Self {
        self.aes_transformation = transformation;
        self
    }

    #[must_use]
    pub fn with_aes_key_size(mut self, bytes: usize) -> Self {
        self.aes_key_size = bytes;
        self
    }

    #[must_use]
    pub fn with_aes_iv_size(mut self, bytes: usize) -> Self {
        self.aes_iv_size = bytes;
        self
    }

    #[must_use]
    pub fn with_hmac_algorithm(mut self, algorithm: String) -> Self {
        self.hmac_algorithm = algorithm;
        self
    }

    #[must_use]
    pub fn with_hash_algorithm(mut self, algorithm: String) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    #[must_use]
    pub fn with_client_enabled(mut self, client: ClientType, enabled: bool) -> Self {
        match client {
            ClientType::H5 => self.h5_enabled = enabled,
            ClientType::Admin => self.admin_enabled = enabled,
            ClientType::Mobile => self.mobile_enabled = enabled,
        }
        self
    }

    #[must_use]
    pub fn with_jwt_device_binding(mut self, enabled: bool) -> Self {
        self.jwt_device_binding = enabled;
        self
    }

    #[must_use]
    pub fn with_jwt_additional_encryption(mut self, enabled: bool) -> Self {
        self.jwt_additional_encryption = enabled;
        self
    }

    #[must_use]
    pub fn with_require_signature(mut self, enabled: bool) -> Self {
        self.require_signature = enabled;
        self
    }

    #[must_use]
    pub fn with_strict_device_binding(mut self, enabled: bool) -> Self {
        self.strict_device_binding = enabled;
        self
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn base_secret(&self) -> &str {
        self.base_secret.expose_secret()
    }

    #[must_use]
    pub fn device_salt(&self) -> &str {
        self.device_salt.expose_secret()
    }

    #[must_use]
    pub fn aes_algorithm(&self) -> &str {
        &self.aes_algorithm
    }

    #[must_use]
    pub fn aes_transformation(&self) -> &str {
        &self.aes_transformation
    }

    #[must_use]
    pub const fn aes_key_size(&self) -> usize {
        self.aes_key_size
    }

    #[must_use]
    pub const fn aes_iv_size(&self) -> usize {
        self.aes_iv_size
    }

    #[must_use]
    pub fn hmac_algorithm(&self) -> &str {
        &self.hmac_algorithm
    }

    #[must_use]
    pub fn hash_algorithm(&self) -> &str {
        &self.hash_algorithm
    }

    #[must_use]
    pub const fn time_window_ms(&self) -> i64 {
        self.time_window_ms
    }

    #[must_use]
    pub const fn max_drift_ms(&self) -> i64 {
        self.max_drift_ms
    }

    /// Freshness budget for inbound envelopes: the advertised window plus the
    /// clock-skew allowance, summed (an envelope produced near the end of its
    /// window on a drifting clock must still be accepted).
    #[must_use]
    pub const fn freshness_budget_ms(&self) -> i64 {
        self.time_window_ms + self.max_drift_ms
    }

    #[must_use]
    pub const fn enabled_for(&self, client: ClientType) -> bool {
        match client {
            ClientType::H5 => self.h5_enabled,
            ClientType::Admin => self.admin_enabled,
            ClientType::Mobile => self.mobile_enabled,
        }
    }

    #[must_use]
    pub const fn jwt_device_binding(&self) -> bool {
        self.jwt_device_binding
    }

    #[must_use]
    pub const fn jwt_additional_encryption(&self) -> bool {
        self.jwt_additional_encryption
    }

    #[must_use]
    pub const fn require_signature(&self) -> bool {
        self.require_signature
    }

    #[must_use]
    pub const fn strict_device_binding(&self) -> bool {
        self.strict_device_binding
    }

    #[must_use]
    pub const fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }
}

/// Principal classes with differentiated lockout policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrincipalClass {
    Ordinary,
    Privileged,
}

#[derive(Clone, Debug)]
pub struct LockoutPolicy {
    max_failed_attempts: u32,
    lock_duration_minutes: i64,
    admin_max_failed_attempts: u32,
    admin_lock_duration_minutes: i64,
    reset_window_hours: i64,
    captcha_threshold: u32,
    auto_unlock_interval_seconds: u64,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            lock_duration_minutes: DEFAULT_LOCK_DURATION_MINUTES,
            admin_max_failed_attempts: DEFAULT_ADMIN_MAX_FAILED_ATTEMPTS,
            admin_lock_duration_minutes: DEFAULT_ADMIN_LOCK_DURATION_MINUTES,
            reset_window_hours: DEFAULT_RESET_WINDOW_HOURS,
            captcha_threshold: DEFAULT_CAPTCHA_THRESHOLD,
            auto_unlock_interval_seconds: DEFAULT_AUTO_UNLOCK_INTERVAL_SECONDS,
        }
    }
}

impl LockoutPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_failed_attempts(mut self, attempts: u32) -> Self {
        self.max_failed_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_lock_duration_minutes(mut self, minutes: i64) -> Self {
        self.lock_duration_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_admin_max_failed_attempts(mut self, attempts: u32) -> Self {
        self.admin_max_failed_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_admin_lock_duration_minutes(mut self, minutes: i64) -> Self {
        self.admin_lock_duration_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_reset_window_hours(mut self, hours: i64) -> Self {
        self.reset_window_hours = hours;
        self
    }

    #[must_use]
    pub fn with_captcha_threshold(mut self, threshold: u32) -> Self {
        self.captcha_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_auto_unlock_interval_seconds(mut self, seconds: u64) -> Self {
        self.auto_unlock_interval_seconds = seconds;
        self
    }

    /// Check cross-field expectations. Violations are logged, not fatal; the
    /// values are used as configured.
    pub fn validate(&self) {
        if self.admin_max_failed_attempts > self.max_failed_attempts {
            warn!(
                admin = self.admin_max_failed_attempts,
                ordinary = self.max_failed_attempts,
                "admin failure threshold exceeds the ordinary threshold"
            );
        }
        if self.admin_lock_duration_minutes < self.lock_duration_minutes {
            warn!(
                admin = self.admin_lock_duration_minutes,
                ordinary = self.lock_duration_minutes,
                "admin lock duration is shorter than the ordinary duration"
            );
        }
    }

    #[must_use]
    pub const fn threshold(&self, class: PrincipalClass) -> u32 {
        match class {
            PrincipalClass::Ordinary => self.max_failed_attempts,
            PrincipalClass::Privileged => self.admin_max_failed_attempts,
        }
    }

    #[must_use]
    pub const fn lock_duration_minutes(&self, class: PrincipalClass) -> i64 {
        match class {
            PrincipalClass::Ordinary => self.lock_duration_minutes,
            PrincipalClass::Privileged => self.admin_lock_duration_minutes,
        }
    }

    #[must_use]
    pub const fn reset_window_hours(&self) -> i64 {
        self.reset_window_hours
    }

    /// Per-IP challenge threshold, capped.
    #[must_use]
    pub fn captcha_threshold(&self) -> u32 {
        self.captcha_threshold.min(CAPTCHA_THRESHOLD_CAP)
    }

    #[must_use]
    pub const fn auto_unlock_interval_seconds(&self) -> u64 {
        self.auto_unlock_interval_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CryptoPolicy {
        CryptoPolicy::new(
            SecretString::from("0123456789abcdef0123456789abcdef"),
            SecretString::from("salt"),
        )
    }

    #[test]
    fn crypto_policy_defaults() {
        let policy = policy();
        assert_eq!(policy.time_window_ms(), 180_000);
        assert_eq!(policy.max_drift_ms(), 60_000);
        assert_eq!(policy.freshness_budget_ms(), 240_000);
        assert_eq!(policy.aes_key_size(), 16);
        assert_eq!(policy.aes_iv_size(), 16);
        assert_eq!(policy.aes_transformation(), "AES/CTR/NoPadding");
        assert_eq!(policy.hmac_algorithm(), "HmacSHA256");
        assert_eq!(policy.hash_algorithm(), "SHA-256");
        assert!(policy.require_signature());
        assert!(!policy.strict_device_binding());
        assert!(!policy.jwt_device_binding());
        assert!(!policy.jwt_additional_encryption());
        for client in [ClientType::H5, ClientType::Admin, ClientType::Mobile] {
            assert!(policy.enabled_for(client));
        }
    }

    #[test]
    fn crypto_policy_overrides() {
        let policy = policy()
            .with_time_window_ms(1_000)
            .with_max_drift_ms(500)
            .with_client_enabled(ClientType::H5, false)
            .with_jwt_device_binding(true)
            .with_token_ttl_seconds(60);
        assert_eq!(policy.freshness_budget_ms(), 1_500);
        assert!(!policy.enabled_for(ClientType::H5));
        assert!(policy.enabled_for(ClientType::Mobile));
        assert!(policy.jwt_device_binding());
        assert_eq!(policy.token_ttl_seconds(), 60);
    }

    #[test]
    fn lockout_defaults_use_configured_ten_not_documented_five() {
        // The source of this policy documented 5 attempts but configured 10;
        // the configured value is the contract.
        let policy = LockoutPolicy::default();
        assert_eq!(policy.threshold(PrincipalClass::Ordinary), 10);
        assert_eq!(policy.threshold(PrincipalClass::Privileged), 5);
        assert_eq!(policy.lock_duration_minutes(PrincipalClass::Ordinary), 30);
        assert_eq!(policy.lock_duration_minutes(PrincipalClass::Privileged), 60);
        assert_eq!(policy.reset_window_hours(), 24);
        assert_eq!(policy.captcha_threshold(), 3);
    }

    #[test]
    fn captcha_threshold_is_capped() {
        let policy = LockoutPolicy::default().with_captcha_threshold(50);
        assert_eq!(policy.captcha_threshold(), CAPTCHA_THRESHOLD_CAP);
    }

    #[test]
    fn validate_accepts_misconfigured_values() {
        // Stricter-than-ordinary admin policy is only a warning; the values
        // stay as configured.
        let policy = LockoutPolicy::default()
            .with_admin_max_failed_attempts(20)
            .with_admin_lock_duration_minutes(1);
        policy.validate();
        assert_eq!(policy.threshold(PrincipalClass::Privileged), 20);
        assert_eq!(policy.lock_duration_minutes(PrincipalClass::Privileged), 1);
    }
}
