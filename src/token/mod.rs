//! Session token issue/validate/revoke.
//!
//! Tokens are compact HS256 JWTs. With `jwt_additional_encryption` enabled,
//! the serialized token is further wrapped in AES-128-ECB/PKCS7 and
//! base64url-encoded before being handed out — a deterministic transform that
//! keeps relaying clients from casually inspecting claims; it does not replace
//! the token's own integrity protection.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::error;
use ulid::Ulid;

use crate::policy::CryptoPolicy;

pub mod blacklist;

pub use blacklist::TokenBlacklist;

type HmacSha256 = Hmac<Sha256>;
type EcbEncryptor = ecb::Encryptor<aes::Aes128>;
type EcbDecryptor = ecb::Decryptor<aes::Aes128>;

const SIGNING_CONTEXT: &[u8] = b"session-token";
const WRAP_CONTEXT: &[u8] = b"token-wrap";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("token expired")]
    Expired,
    #[error("token revoked")]
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Claims carried by a session token. Immutable once issued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev: Option<String>,
}

impl SessionClaims {
    #[must_use]
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.exp - now.timestamp()).max(0)
    }
}

#[derive(Clone)]
pub struct SessionTokenService {
    policy: Arc<CryptoPolicy>,
    blacklist: TokenBlacklist,
}

impl SessionTokenService {
    #[must_use]
    pub fn new(policy: Arc<CryptoPolicy>, blacklist: TokenBlacklist) -> Self {
        Self { policy, blacklist }
    }

    /// Issue a token for an authenticated principal. The device id is only
    /// bound into the claims when the policy enables device binding.
    ///
    /// # Errors
    /// Returns [`TokenError::Malformed`] if the claims cannot be serialized.
    pub fn issue(
        &self,
        subject: &str,
        role: &str,
        device_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = SessionClaims {
            sub: subject.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: now.timestamp() + self.policy.token_ttl_seconds(),
            jti: Ulid::new().to_string(),
            dev: self
                .policy
                .jwt_device_binding()
                .then(|| device_id.map(str::to_string))
                .flatten(),
        };

        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(&claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        let signature = self.sign(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&signature);
        let token = format!("{signing_input}.{signature_b64}");

        if self.policy.jwt_additional_encryption() {
            Ok(self.wrap(token.as_bytes()))
        } else {
            Ok(token)
        }
    }

    /// Verify a presented token and return its claims. Never mutates state.
    ///
    /// # Errors
    /// [`TokenError::Malformed`] for anything that fails to parse or carries a
    /// bad signature, [`TokenError::Expired`] past `exp`, and
    /// [`TokenError::Revoked`] for blacklisted tokens — including when the
    /// blacklist store is unreachable (fail closed).
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError> {
        let claims = self.peek_claims(token)?;

        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }

        // A possibly-revoked token must not slip through on a store outage.
        let revoked = self.blacklist.contains(token).unwrap_or_else(|err| {
            error!("blacklist lookup failed, failing closed: {err}");
            true
        });
        if revoked {
            return Err(TokenError::Revoked);
        }

        Ok(claims)
    }

    /// Revoke a token for its remaining lifetime. Idempotent; a token that has
    /// already expired needs no entry at all.
    ///
    /// # Errors
    /// [`TokenError::Malformed`] when the presented token does not parse.
    pub fn revoke(&self, token: &str, now: DateTime<Utc>) -> Result<(), TokenError> {
        let claims = self.peek_claims(token)?;
        let remaining = claims.exp - now.timestamp();
        if remaining <= 0 {
            return Ok(());
        }
        #[allow(clippy::cast_sign_loss)]
        let ttl = Duration::from_secs(remaining as u64);
        if let Err(err) = self.blacklist.insert(token, &claims.sub, ttl) {
            error!("failed to record token revocation: {err}");
            return Err(TokenError::Revoked);
        }
        Ok(())
    }

    /// Parse and integrity-check a token without touching expiry or the
    /// blacklist.
    fn peek_claims(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let inner = if self.policy.jwt_additional_encryption() {
            self.unwrap(token)?
        } else {
            token.to_string()
        };

        let mut parts = inner.split('.');
        let header_b64 = parts.next().ok_or(TokenError::Malformed)?;
        let claims_b64 = parts.next().ok_or(TokenError::Malformed)?;
        let sig_b64 = parts.next().ok_or(TokenError::Malformed)?;
        if parts.next().is_some() {
            return Err(TokenError::Malformed);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != "HS256" {
            return Err(TokenError::Malformed);
        }

        let signing_input = format!("{header_b64}.{claims_b64}");
        let signature =
            Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac();
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::Malformed)?;

        b64d_json(claims_b64)
    }

    fn sign(&self, input: &[u8]) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(input);
        mac.finalize().into_bytes().to_vec()
    }

    fn mac(&self) -> HmacSha256 {
        let mut key = Sha256::new();
        key.update(self.policy.base_secret().as_bytes());
        key.update(SIGNING_CONTEXT);
        let key = key.finalize();
        #[allow(clippy::expect_used)]
        <HmacSha256 as Mac>::new_from_slice(&key).expect("hmac accepts any key size")
    }

    fn wrap_key(&self) -> [u8; 16] {
        let mut hasher = Sha256::new();
        hasher.update(self.policy.base_secret().as_bytes());
        hasher.update(WRAP_CONTEXT);
        let digest = hasher.finalize();
        let mut key = [0u8; 16];
        key.copy_from_slice(&digest[..16]);
        key
    }

    fn wrap(&self, token: &[u8]) -> String {
        let ciphertext =
            EcbEncryptor::new(&self.wrap_key().into()).encrypt_padded_vec_mut::<Pkcs7>(token);
        Base64UrlUnpadded::encode_string(&ciphertext)
    }

    fn unwrap(&self, token: &str) -> Result<String, TokenError> {
        let ciphertext =
            Base64UrlUnpadded::decode_vec(token).map_err(|_| TokenError::Malformed)?;
        let plaintext = EcbDecryptor::new(&self.wrap_key().into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| TokenError::Malformed)?;
        String::from_utf8(plaintext).map_err(|_| TokenError::Malformed)
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value).map_err(|_| TokenError::Malformed)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}
