//! Request admission: the composition point in front of business logic.
//!
//! Within a single request the envelope is decoded first, then the session
//! token is validated, then the lockout engine is consulted by the login
//! flow. Running these out of order would let an attacker probe credentials
//! through a forged envelope.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::envelope::{Envelope, EnvelopeCodec, EnvelopeError};
use crate::policy::ClientType;
use crate::token::{SessionClaims, SessionTokenService, TokenError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// A request that passed the gate: decrypted payload plus, when a bearer
/// token was presented, its validated claims.
#[derive(Debug)]
pub struct AdmittedRequest {
    pub payload: Vec<u8>,
    pub claims: Option<SessionClaims>,
}

#[derive(Clone)]
pub struct RequestGate {
    codec: EnvelopeCodec,
    tokens: SessionTokenService,
}

impl RequestGate {
    #[must_use]
    pub fn new(codec: EnvelopeCodec, tokens: SessionTokenService) -> Self {
        Self { codec, tokens }
    }

    #[must_use]
    pub fn codec(&self) -> &EnvelopeCodec {
        &self.codec
    }

    #[must_use]
    pub fn tokens(&self) -> &SessionTokenService {
        &self.tokens
    }

    /// Admit a request on an authenticated surface: decode the envelope,
    /// validate the bearer token, then cross-check the envelope device id
    /// against the session's bound device under strict binding.
    ///
    /// # Errors
    /// Envelope errors are terminal and raised before the token is looked at;
    /// token errors before any business logic runs. Neither is retried.
    pub fn admit(
        &self,
        envelope: &Envelope,
        client: ClientType,
        bearer: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AdmittedRequest, GateError> {
        let payload = self.codec.decode(envelope, client, now.timestamp_millis())?;

        let claims = match bearer {
            Some(token) => {
                let claims = self.tokens.validate(token, now)?;
                self.codec
                    .enforce_device_binding(envelope.device_id.as_deref(), claims.dev.as_deref())?;
                Some(claims)
            }
            None => None,
        };

        Ok(AdmittedRequest { payload, claims })
    }

    /// Admit a request on an unauthenticated surface (login): envelope checks
    /// only, no session yet to bind against.
    ///
    /// # Errors
    /// See [`RequestGate::admit`].
    pub fn open(
        &self,
        envelope: &Envelope,
        client: ClientType,
        now: DateTime<Utc>,
    ) -> Result<Vec<u8>, GateError> {
        Ok(self.codec.decode(envelope, client, now.timestamp_millis())?)
    }
}
