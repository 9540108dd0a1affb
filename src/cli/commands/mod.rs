use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[allow(clippy::too_many_lines)]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("trustgate")
        .about("Request security and session trust layer")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("TRUSTGATE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("base-secret")
                .long("base-secret")
                .help("Base secret that all envelope and token keys derive from")
                .env("TRUSTGATE_BASE_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("device-salt")
                .long("device-salt")
                .help("Salt mixed into the envelope signing key")
                .env("TRUSTGATE_DEVICE_SALT")
                .required(true),
        )
        .arg(
            Arg::new("time-window-ms")
                .long("time-window-ms")
                .help("Envelope freshness window in milliseconds")
                .default_value("180000")
                .env("TRUSTGATE_TIME_WINDOW_MS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("max-drift-ms")
                .long("max-drift-ms")
                .help("Clock drift allowance in milliseconds, added to the freshness window")
                .default_value("60000")
                .env("TRUSTGATE_MAX_DRIFT_MS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("aes-key-size")
                .long("aes-key-size")
                .help("AES key size in bytes (16 or 32)")
                .default_value("16")
                .env("TRUSTGATE_AES_KEY_SIZE")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("aes-iv-size")
                .long("aes-iv-size")
                .help("AES initialization vector size in bytes")
                .default_value("16")
                .env("TRUSTGATE_AES_IV_SIZE")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("token-ttl-seconds")
                .long("token-ttl-seconds")
                .help("Session token lifetime in seconds")
                .default_value("7200")
                .env("TRUSTGATE_TOKEN_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("disable-h5")
                .long("disable-h5")
                .help("Serve the H5 surface without envelope protection")
                .env("TRUSTGATE_DISABLE_H5")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("disable-admin")
                .long("disable-admin")
                .help("Serve the admin surface without envelope protection")
                .env("TRUSTGATE_DISABLE_ADMIN")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("disable-mobile")
                .long("disable-mobile")
                .help("Serve the mobile surface without envelope protection")
                .env("TRUSTGATE_DISABLE_MOBILE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("skip-signature")
                .long("skip-signature")
                .help("Accept envelopes without verifying their HMAC signature")
                .env("TRUSTGATE_SKIP_SIGNATURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("jwt-device-binding")
                .long("jwt-device-binding")
                .help("Bind issued session tokens to the device id presented at login")
                .env("TRUSTGATE_JWT_DEVICE_BINDING")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("strict-device-binding")
                .long("strict-device-binding")
                .help("Reject requests whose envelope device id differs from the session's")
                .env("TRUSTGATE_STRICT_DEVICE_BINDING")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("jwt-additional-encryption")
                .long("jwt-additional-encryption")
                .help("Wrap issued tokens in an additional AES layer")
                .env("TRUSTGATE_JWT_ADDITIONAL_ENCRYPTION")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("max-failed-attempts")
                .long("max-failed-attempts")
                .help("Failed logins before an ordinary account locks")
                .default_value("10")
                .env("TRUSTGATE_MAX_FAILED_ATTEMPTS")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("lock-duration-minutes")
                .long("lock-duration-minutes")
                .help("Ordinary account lock duration in minutes")
                .default_value("30")
                .env("TRUSTGATE_LOCK_DURATION_MINUTES")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("admin-max-failed-attempts")
                .long("admin-max-failed-attempts")
                .help("Failed logins before a privileged account locks")
                .default_value("5")
                .env("TRUSTGATE_ADMIN_MAX_FAILED_ATTEMPTS")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("admin-lock-duration-minutes")
                .long("admin-lock-duration-minutes")
                .help("Privileged account lock duration in minutes")
                .default_value("60")
                .env("TRUSTGATE_ADMIN_LOCK_DURATION_MINUTES")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("reset-window-hours")
                .long("reset-window-hours")
                .help("Hours without failures before the failure counter expires")
                .default_value("24")
                .env("TRUSTGATE_RESET_WINDOW_HOURS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("captcha-threshold")
                .long("captcha-threshold")
                .help("Failed attempts per client IP before the H5 surface requires a captcha")
                .default_value("3")
                .env("TRUSTGATE_CAPTCHA_THRESHOLD")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("auto-unlock-interval-seconds")
                .long("auto-unlock-interval-seconds")
                .help("Seconds between auto-unlock sweeps")
                .default_value("300")
                .env("TRUSTGATE_AUTO_UNLOCK_INTERVAL_SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("bootstrap-admin-username")
                .long("bootstrap-admin-username")
                .help("Seed a privileged account at startup")
                .env("TRUSTGATE_BOOTSTRAP_ADMIN_USERNAME")
                .requires("bootstrap-admin-password"),
        )
        .arg(
            Arg::new("bootstrap-admin-password")
                .long("bootstrap-admin-password")
                .help("Password for the seeded privileged account")
                .env("TRUSTGATE_BOOTSTRAP_ADMIN_PASSWORD")
                .requires("bootstrap-admin-username"),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("TRUSTGATE_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}
