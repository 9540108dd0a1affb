//! Request security and session trust layer: envelope-encrypted requests,
//! revocable session tokens, and a brute-force lockout state machine behind
//! an HTTP API.

pub mod api;
pub mod cli;
pub mod envelope;
pub mod gate;
pub mod lockout;
pub mod policy;
pub mod principal;
pub mod store;
pub mod token;
