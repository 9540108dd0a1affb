pub mod auth;
pub mod health;

pub use self::auth::GateState;
pub use self::health::health;
