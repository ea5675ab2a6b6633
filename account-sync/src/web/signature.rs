//! Webhook signature verification.
//!
//! The identity provider signs deliveries the Svix way: an HMAC-SHA256 over
//! `"{id}.{timestamp}.{body}"`, base64 encoded, sent as one or more
//! space-separated `v1,<signature>` entries in the `svix-signature` header.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the unique delivery id.
pub const ID_HEADER: &str = "svix-id";

/// Header carrying the Unix timestamp the delivery was signed at.
pub const TIMESTAMP_HEADER: &str = "svix-timestamp";

/// Header carrying the signature list.
pub const SIGNATURE_HEADER: &str = "svix-signature";

const SECRET_PREFIX: &str = "whsec_";
const SIGNATURE_VERSION: &str = "v1";

/// Error raised when a webhook secret cannot be decoded.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("secret decodes to an empty key")]
    Empty,
}

/// Reasons a delivery fails verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("timestamp `{0}` is not a Unix timestamp")]
    InvalidTimestamp(String),

    #[error("timestamp is {age_secs}s in the past")]
    TimestampTooOld { age_secs: u64 },

    #[error("timestamp is {skew_secs}s in the future")]
    TimestampTooNew { skew_secs: u64 },

    #[error("no v1 signatures present")]
    NoSignatures,

    #[error("no signature matched")]
    Mismatch,
}

/// Decoded webhook signing secret.
///
/// The raw key never appears in `Debug` output.
#[derive(Clone)]
pub struct WebhookSecret {
    key: Vec<u8>,
}

impl WebhookSecret {
    /// Decode a secret in `whsec_<base64>` form. The prefix is optional.
    pub fn new(secret: &str) -> Result<Self, SecretError> {
        let encoded = secret.strip_prefix(SECRET_PREFIX).unwrap_or(secret);
        let key = B64.decode(encoded)?;
        if key.is_empty() {
            return Err(SecretError::Empty);
        }
        Ok(Self { key })
    }

    /// Build a secret from raw key bytes.
    pub fn from_bytes(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length")
    }

    /// Compute the base64 signature for a delivery.
    pub fn sign(&self, msg_id: &str, timestamp: &str, payload: &[u8]) -> String {
        let mut mac = self.mac();
        update_signed_content(&mut mac, msg_id, timestamp, payload);
        B64.encode(mac.finalize().into_bytes())
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookSecret")
            .field("key", &"<redacted>")
            .finish()
    }
}

fn update_signed_content(mac: &mut HmacSha256, msg_id: &str, timestamp: &str, payload: &[u8]) {
    mac.update(msg_id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
}

/// Verify a delivery against the current wall clock.
pub fn verify_webhook_signature(
    secret: &WebhookSecret,
    msg_id: &str,
    timestamp: &str,
    signature_header: &str,
    payload: &[u8],
    tolerance_secs: u64,
) -> Result<(), SignatureError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    verify_webhook_signature_at(
        secret,
        msg_id,
        timestamp,
        signature_header,
        payload,
        tolerance_secs,
        now,
    )
}

/// Verify a delivery as of `now` (Unix seconds).
///
/// # Arguments
///
/// * `secret` - Decoded signing secret
/// * `msg_id` - The `svix-id` header
/// * `timestamp` - The `svix-timestamp` header
/// * `signature_header` - The `svix-signature` header
/// * `payload` - Raw request body, exactly as received
/// * `tolerance_secs` - Allowed distance between `timestamp` and `now`
/// * `now` - Current Unix time in seconds
pub fn verify_webhook_signature_at(
    secret: &WebhookSecret,
    msg_id: &str,
    timestamp: &str,
    signature_header: &str,
    payload: &[u8],
    tolerance_secs: u64,
    now: u64,
) -> Result<(), SignatureError> {
    let signed_at: u64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp(timestamp.to_string()))?;

    if now > signed_at && now - signed_at > tolerance_secs {
        let age_secs = now - signed_at;
        warn!(
            signed_at = signed_at,
            now = now,
            age_seconds = age_secs,
            "webhook_signature_stale"
        );
        return Err(SignatureError::TimestampTooOld { age_secs });
    }

    if signed_at > now && signed_at - now > tolerance_secs {
        let skew_secs = signed_at - now;
        warn!(
            signed_at = signed_at,
            now = now,
            skew_seconds = skew_secs,
            "webhook_signature_from_future"
        );
        return Err(SignatureError::TimestampTooNew { skew_secs });
    }

    let candidates: Vec<Vec<u8>> = signature_header
        .split_whitespace()
        .filter_map(|entry| entry.split_once(','))
        .filter(|(version, _)| *version == SIGNATURE_VERSION)
        .filter_map(|(_, sig)| B64.decode(sig).ok())
        .collect();

    if candidates.is_empty() {
        warn!(
            header_length = signature_header.len(),
            "webhook_signature_none_usable"
        );
        return Err(SignatureError::NoSignatures);
    }

    let mut mac = secret.mac();
    update_signed_content(&mut mac, msg_id, timestamp, payload);

    // `verify_slice` compares in constant time.
    let matched = candidates
        .iter()
        .any(|candidate| mac.clone().verify_slice(candidate).is_ok());

    if matched {
        Ok(())
    } else {
        warn!(
            candidates = candidates.len(),
            "webhook_signature_mismatch"
        );
        Err(SignatureError::Mismatch)
    }
}
