use anyhow::{anyhow, Result};
use secrecy::SecretString;

use crate::cli::actions::{Action, BootstrapAdmin};
use crate::policy::{ClientType, CryptoPolicy, LockoutPolicy};

/// Turn parsed arguments into the immutable policies the server runs with.
///
/// # Errors
/// Fails when a required argument is missing (clap enforces most of this
/// before we get here).
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let base_secret = matches
        .get_one::<String>("base-secret")
        .map(|s| SecretString::from(s.clone()))
        .ok_or_else(|| anyhow!("missing required argument: --base-secret"))?;
    let device_salt = matches
        .get_one::<String>("device-salt")
        .map(|s| SecretString::from(s.clone()))
        .ok_or_else(|| anyhow!("missing required argument: --device-salt"))?;

    let mut crypto = CryptoPolicy::new(base_secret, device_salt)
        .with_client_enabled(ClientType::H5, !matches.get_flag("disable-h5"))
        .with_client_enabled(ClientType::Admin, !matches.get_flag("disable-admin"))
        .with_client_enabled(ClientType::Mobile, !matches.get_flag("disable-mobile"))
        .with_require_signature(!matches.get_flag("skip-signature"))
        .with_jwt_device_binding(matches.get_flag("jwt-device-binding"))
        .with_strict_device_binding(matches.get_flag("strict-device-binding"))
        .with_jwt_additional_encryption(matches.get_flag("jwt-additional-encryption"));

    if let Some(&ms) = matches.get_one::<i64>("time-window-ms") {
        crypto = crypto.with_time_window_ms(ms);
    }
    if let Some(&ms) = matches.get_one::<i64>("max-drift-ms") {
        crypto = crypto.with_max_drift_ms(ms);
    }
    if let Some(&bytes) = matches.get_one::<usize>("aes-key-size") {
        crypto = crypto.with_aes_key_size(bytes);
    }
    if let Some(&bytes) = matches.get_one::<usize>("aes-iv-size") {
        crypto = crypto.with_aes_iv_size(bytes);
    }
    if let Some(&seconds) = matches.get_one::<i64>("token-ttl-seconds") {
        crypto = crypto.with_token_ttl_seconds(seconds);
    }

    let mut lockout = LockoutPolicy::default();
    if let Some(&attempts) = matches.get_one::<u32>("max-failed-attempts") {
        lockout = lockout.with_max_failed_attempts(attempts);
    }
    if let Some(&minutes) = matches.get_one::<i64>("lock-duration-minutes") {
        lockout = lockout.with_lock_duration_minutes(minutes);
    }
    if let Some(&attempts) = matches.get_one::<u32>("admin-max-failed-attempts") {
        lockout = lockout.with_admin_max_failed_attempts(attempts);
    }
    if let Some(&minutes) = matches.get_one::<i64>("admin-lock-duration-minutes") {
        lockout = lockout.with_admin_lock_duration_minutes(minutes);
    }
    if let Some(&hours) = matches.get_one::<i64>("reset-window-hours") {
        lockout = lockout.with_reset_window_hours(hours);
    }
    if let Some(&threshold) = matches.get_one::<u32>("captcha-threshold") {
        lockout = lockout.with_captcha_threshold(threshold);
    }
    if let Some(&seconds) = matches.get_one::<u64>("auto-unlock-interval-seconds") {
        lockout = lockout.with_auto_unlock_interval_seconds(seconds);
    }

    let bootstrap_admin = match (
        matches.get_one::<String>("bootstrap-admin-username"),
        matches.get_one::<String>("bootstrap-admin-password"),
    ) {
        (Some(username), Some(password)) => Some(BootstrapAdmin {
            username: username.clone(),
            password: SecretString::from(password.clone()),
        }),
        _ => None,
    };

    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        crypto,
        lockout,
        bootstrap_admin,
    })
}
