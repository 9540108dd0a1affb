//! Encrypted request envelope codec.
//!
//! Wire format (JSON):
//!
//! ```json
//! {
//!   "payload": "<base64 ciphertext>",
//!   "iv": "<base64 initialization vector>",
//!   "sig": "<base64url-unpadded HMAC-SHA256 tag>",
//!   "ts": 1700000000000,
//!   "device_id": "optional client device identifier"
//! }
//! ```
//!
//! The MAC is computed over `ciphertext ‖ decimal ts ‖ device-id-or-empty`
//! with a key derived as `SHA-256(base_secret ‖ device_salt)`. The cipher key
//! is `SHA-256(base_secret)` truncated to the configured AES key size, applied
//! in CTR mode (big-endian 128-bit counter, no padding). Checks run in order:
//! freshness, then MAC, then decryption; nothing about the ciphertext is
//! trusted before the MAC verifies.

use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;

use crate::policy::{ClientType, CryptoPolicy};

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope timestamp outside the accepted window")]
    ReplayDetected,
    #[error("envelope signature mismatch")]
    SignatureMismatch,
    #[error("envelope decryption failure")]
    DecryptionFailure,
    #[error("envelope protection disabled for client type {0}")]
    ClientTypeDisabled(&'static str),
}

/// The encrypted+signed container wrapping a request payload. Produced by the
/// caller, consumed exactly once; never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Envelope {
    pub payload: String,
    pub iv: String,
    pub sig: String,
    /// Producer clock, milliseconds since epoch.
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// Stateless codec over an immutable [`CryptoPolicy`].
#[derive(Clone, Debug)]
pub struct EnvelopeCodec {
    policy: Arc<CryptoPolicy>,
}

impl EnvelopeCodec {
    #[must_use]
    pub fn new(policy: Arc<CryptoPolicy>) -> Self {
        Self { policy }
    }

    /// Verify and decrypt an inbound envelope.
    ///
    /// With envelope protection disabled for `client`, the payload passes
    /// through unchanged as plaintext; the session and lockout checks still
    /// apply downstream.
    ///
    /// # Errors
    /// [`EnvelopeError::ReplayDetected`] outside the freshness budget,
    /// [`EnvelopeError::SignatureMismatch`] on a bad MAC, and
    /// [`EnvelopeError::DecryptionFailure`] on malformed ciphertext/IV.
    pub fn decode(
        &self,
        envelope: &Envelope,
        client: ClientType,
        now_ms: i64,
    ) -> Result<Vec<u8>, EnvelopeError> {
        if !self.policy.enabled_for(client) {
            return Ok(envelope.payload.clone().into_bytes());
        }

        if (now_ms - envelope.ts).abs() > self.policy.freshness_budget_ms() {
            return Err(EnvelopeError::ReplayDetected);
        }

        let ciphertext = Base64::decode_vec(&envelope.payload)
            .map_err(|_| EnvelopeError::DecryptionFailure)?;

        if self.policy.require_signature() {
            let tag = Base64UrlUnpadded::decode_vec(&envelope.sig)
                .map_err(|_| EnvelopeError::SignatureMismatch)?;
            let mac = self.mac(&ciphertext, envelope.ts, envelope.device_id.as_deref());
            mac.verify_slice(&tag)
                .map_err(|_| EnvelopeError::SignatureMismatch)?;
        }

        let iv = Base64::decode_vec(&envelope.iv).map_err(|_| EnvelopeError::DecryptionFailure)?;
        if iv.len() != self.policy.aes_iv_size() {
            return Err(EnvelopeError::DecryptionFailure);
        }

        let mut buffer = ciphertext;
        self.apply_keystream(&iv, &mut buffer)?;
        Ok(buffer)
    }

    /// Produce an envelope for an outbound payload: fresh random IV, MAC over
    /// the ciphertext, timestamp set by the caller's clock.
    ///
    /// # Errors
    /// [`EnvelopeError::ClientTypeDisabled`] when envelope protection is off
    /// for `client`; [`EnvelopeError::DecryptionFailure`] on an unsupported
    /// key size.
    pub fn encode(
        &self,
        plaintext: &[u8],
        client: ClientType,
        device_id: Option<&str>,
        now_ms: i64,
    ) -> Result<Envelope, EnvelopeError> {
        if !self.policy.enabled_for(client) {
            return Err(EnvelopeError::ClientTypeDisabled(client.as_str()));
        }

        let mut iv = vec![0u8; self.policy.aes_iv_size()];
        OsRng.fill_bytes(&mut iv);

        let mut buffer = plaintext.to_vec();
        self.apply_keystream(&iv, &mut buffer)?;

        let mac = self.mac(&buffer, now_ms, device_id);
        let tag = mac.finalize().into_bytes();

        Ok(Envelope {
            payload: Base64::encode_string(&buffer),
            iv: Base64::encode_string(&iv),
            sig: Base64UrlUnpadded::encode_string(&tag),
            ts: now_ms,
            device_id: device_id.map(str::to_string),
        })
    }

    /// Cross-check the envelope device id against the device bound to the
    /// active session. Rejected as a signature-class error so a probing
    /// client cannot distinguish it from a bad MAC.
    ///
    /// # Errors
    /// [`EnvelopeError::SignatureMismatch`] on mismatch under strict binding.
    pub fn enforce_device_binding(
        &self,
        envelope_device: Option<&str>,
        session_device: Option<&str>,
    ) -> Result<(), EnvelopeError> {
        if !self.policy.strict_device_binding() {
            return Ok(());
        }
        match (envelope_device, session_device) {
            (Some(envelope), Some(session)) if envelope == session => Ok(()),
            (None, None) => Ok(()),
            _ => Err(EnvelopeError::SignatureMismatch),
        }
    }

    // CTR mode is its own inverse; the same keystream encrypts and decrypts.
    fn apply_keystream(&self, iv: &[u8], buffer: &mut [u8]) -> Result<(), EnvelopeError> {
        let key = self.cipher_key();
        match key.len() {
            32 => {
                let mut cipher = Aes256Ctr::new_from_slices(&key, iv)
                    .map_err(|_| EnvelopeError::DecryptionFailure)?;
                cipher.apply_keystream(buffer);
            }
            _ => {
                let mut cipher = Aes128Ctr::new_from_slices(&key, iv)
                    .map_err(|_| EnvelopeError::DecryptionFailure)?;
                cipher.apply_keystream(buffer);
            }
        }
        Ok(())
    }

    fn cipher_key(&self) -> Vec<u8> {
        let digest = Sha256::digest(self.policy.base_secret().as_bytes());
        let size = self.policy.aes_key_size().min(digest.len());
        digest[..size].to_vec()
    }

    fn mac(&self, ciphertext: &[u8], ts: i64, device_id: Option<&str>) -> HmacSha256 {
        let mut key = Sha256::new();
        key.update(self.policy.base_secret().as_bytes());
        key.update(self.policy.device_salt().as_bytes());
        let key = key.finalize();

        // HMAC accepts any key length.
        #[allow(clippy::expect_used)]
        let mut mac = HmacSha256::new_from_slice(&key).expect("hmac accepts any key size");
        mac.update(ciphertext);
        mac.update(ts.to_string().as_bytes());
        mac.update(device_id.unwrap_or_default().as_bytes());
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    const NOW_MS: i64 = 1_700_000_000_000;

    fn policy() -> CryptoPolicy {
        CryptoPolicy::new(
            SecretString::from(
                "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
            ),
            SecretString::from("device-salt"),
        )
    }

    fn codec(policy: CryptoPolicy) -> EnvelopeCodec {
        EnvelopeCodec::new(Arc::new(policy))
    }

    #[test]
    fn encode_decode_round_trip() -> Result<(), EnvelopeError> {
        let codec = codec(policy());
        let envelope = codec.encode(b"hello", ClientType::Admin, Some("dev-1"), NOW_MS)?;
        let plaintext = codec.decode(&envelope, ClientType::Admin, NOW_MS)?;
        assert_eq!(plaintext, b"hello");
        Ok(())
    }

    #[test]
    fn freshness_budget_sums_window_and_drift() -> Result<(), EnvelopeError> {
        // 64-char secret, window 180000 ms, drift 60000 ms: 235 s in the past
        // is inside the summed budget, 245 s is not.
        let codec = codec(policy());
        let envelope = codec.encode(b"hello", ClientType::H5, None, NOW_MS - 235_000)?;
        assert!(codec.decode(&envelope, ClientType::H5, NOW_MS).is_ok());

        let envelope = codec.encode(b"hello", ClientType::H5, None, NOW_MS - 245_000)?;
        assert_eq!(
            codec.decode(&envelope, ClientType::H5, NOW_MS),
            Err(EnvelopeError::ReplayDetected)
        );
        Ok(())
    }

    #[test]
    fn stale_envelope_rejected_before_signature_check() -> Result<(), EnvelopeError> {
        // Replay wins over a bad signature: the window check comes first.
        let codec = codec(policy());
        let mut envelope = codec.encode(b"hello", ClientType::H5, None, NOW_MS - 500_000)?;
        envelope.sig = "not-a-signature".to_string();
        assert_eq!(
            codec.decode(&envelope, ClientType::H5, NOW_MS),
            Err(EnvelopeError::ReplayDetected)
        );
        Ok(())
    }

    #[test]
    fn tampered_ciphertext_fails_the_mac() -> Result<(), EnvelopeError> {
        let codec = codec(policy());
        let envelope = codec.encode(b"hello world", ClientType::Mobile, None, NOW_MS)?;

        let mut ciphertext = Base64::decode_vec(&envelope.payload).unwrap();
        ciphertext[0] ^= 0xFF;
        let tampered = Envelope {
            payload: Base64::encode_string(&ciphertext),
            ..envelope
        };

        assert_eq!(
            codec.decode(&tampered, ClientType::Mobile, NOW_MS),
            Err(EnvelopeError::SignatureMismatch)
        );
        Ok(())
    }

    #[test]
    fn tampered_timestamp_fails_the_mac() -> Result<(), EnvelopeError> {
        // The timestamp is a MAC input; shifting it inside the window still
        // invalidates the signature.
        let codec = codec(policy());
        let mut envelope = codec.encode(b"hello", ClientType::Admin, None, NOW_MS)?;
        envelope.ts += 1_000;
        assert_eq!(
            codec.decode(&envelope, ClientType::Admin, NOW_MS),
            Err(EnvelopeError::SignatureMismatch)
        );
        Ok(())
    }

    #[test]
    fn signature_check_skippable_by_policy() -> Result<(), EnvelopeError> {
        let codec = codec(policy().with_require_signature(false));
        let mut envelope = codec.encode(b"hello", ClientType::H5, None, NOW_MS)?;
        envelope.sig = String::new();
        assert_eq!(codec.decode(&envelope, ClientType::H5, NOW_MS)?, b"hello");
        Ok(())
    }

    #[test]
    fn disabled_client_passes_payload_through() -> Result<(), EnvelopeError> {
        let codec = codec(policy().with_client_enabled(ClientType::H5, false));
        let envelope = Envelope {
            payload: r#"{"username":"alice"}"#.to_string(),
            iv: String::new(),
            sig: String::new(),
            ts: 0,
            device_id: None,
        };
        assert_eq!(
            codec.decode(&envelope, ClientType::H5, NOW_MS)?,
            br#"{"username":"alice"}"#
        );
        Ok(())
    }

    #[test]
    fn encode_refuses_disabled_client() {
        let codec = codec(policy().with_client_enabled(ClientType::Mobile, false));
        assert_eq!(
            codec.encode(b"hello", ClientType::Mobile, None, NOW_MS),
            Err(EnvelopeError::ClientTypeDisabled("mobile"))
        );
    }

    #[test]
    fn bad_iv_is_a_decryption_failure() -> Result<(), EnvelopeError> {
        let codec = codec(policy());
        let mut envelope = codec.encode(b"hello", ClientType::Admin, None, NOW_MS)?;
        // Re-sign is not needed: shorten the IV, which is not a MAC input.
        envelope.iv = Base64::encode_string(&[0u8; 4]);
        assert_eq!(
            codec.decode(&envelope, ClientType::Admin, NOW_MS),
            Err(EnvelopeError::DecryptionFailure)
        );
        Ok(())
    }

    #[test]
    fn aes256_key_size_round_trips() -> Result<(), EnvelopeError> {
        let codec = codec(policy().with_aes_key_size(32));
        let envelope = codec.encode(b"wide key", ClientType::Admin, None, NOW_MS)?;
        assert_eq!(codec.decode(&envelope, ClientType::Admin, NOW_MS)?, b"wide key");
        Ok(())
    }

    #[test]
    fn strict_device_binding_rejects_mismatch() {
        let strict = codec(policy().with_strict_device_binding(true));
        assert!(strict.enforce_device_binding(Some("a"), Some("a")).is_ok());
        assert!(strict.enforce_device_binding(None, None).is_ok());
        assert_eq!(
            strict.enforce_device_binding(Some("a"), Some("b")),
            Err(EnvelopeError::SignatureMismatch)
        );
        assert_eq!(
            strict.enforce_device_binding(None, Some("b")),
            Err(EnvelopeError::SignatureMismatch)
        );

        let lax = codec(policy());
        assert!(lax.enforce_device_binding(Some("a"), Some("b")).is_ok());
    }
}
