use secrecy::SecretString;

use crate::policy::{CryptoPolicy, LockoutPolicy};

pub mod server;

/// Privileged account seeded into the principal store at startup.
pub struct BootstrapAdmin {
    pub username: String,
    pub password: SecretString,
}

pub enum Action {
    Server {
        port: u16,
        crypto: CryptoPolicy,
        lockout: LockoutPolicy,
        bootstrap_admin: Option<BootstrapAdmin>,
    },
}
