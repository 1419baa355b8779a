//! Clerk webhook signature verification.
//!
//! Clerk delivers webhooks through Svix, which signs every request using
//! HMAC-SHA256 over `"{svix-id}.{svix-timestamp}.{body}"`.
//! Reference: https://docs.svix.com/receiving/verifying-payloads/how-manual

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the unique delivery id.
pub const SVIX_ID_HEADER: &str = "svix-id";
/// Header carrying the unix timestamp the delivery was signed at.
pub const SVIX_TIMESTAMP_HEADER: &str = "svix-timestamp";
/// Header carrying one or more space-separated `v1,<base64>` signatures.
pub const SVIX_SIGNATURE_HEADER: &str = "svix-signature";

const SECRET_PREFIX: &str = "whsec_";
const SIGNATURE_VERSION: &str = "v1";

/// Reasons a delivery fails verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signing secret is not valid base64")]
    InvalidSecret,

    #[error("timestamp header is not a unix timestamp")]
    InvalidTimestamp,

    #[error("timestamp is outside the tolerance window")]
    TimestampOutOfTolerance,

    #[error("no matching signature found")]
    NoMatchingSignature,
}

/// The three transport headers a signed delivery must carry.
#[derive(Debug, Clone, Copy)]
pub struct SvixHeaders<'a> {
    pub id: &'a str,
    pub timestamp: &'a str,
    pub signature: &'a str,
}

impl<'a> SvixHeaders<'a> {
    /// Extract the headers, or `None` if any is absent, empty, or not ASCII.
    pub fn from_header_map(headers: &'a HeaderMap) -> Option<Self> {
        Some(Self {
            id: header_str(headers, SVIX_ID_HEADER)?,
            timestamp: header_str(headers, SVIX_TIMESTAMP_HEADER)?,
            signature: header_str(headers, SVIX_SIGNATURE_HEADER)?,
        })
    }
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Verifies Svix-signed deliveries against a shared secret.
///
/// Built once at startup and shared read-only across requests.
#[derive(Clone)]
pub struct WebhookVerifier {
    key: Vec<u8>,
    tolerance_secs: u64,
}

impl fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("key", &"<redacted>")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl WebhookVerifier {
    /// Create a verifier from a `whsec_`-prefixed (or bare) base64 secret.
    pub fn new(secret: &str, tolerance_secs: u64) -> Result<Self, SignatureError> {
        let encoded = secret.trim();
        let encoded = encoded.strip_prefix(SECRET_PREFIX).unwrap_or(encoded);

        let key = STANDARD
            .decode(encoded)
            .map_err(|_| SignatureError::InvalidSecret)?;
        if key.is_empty() {
            return Err(SignatureError::InvalidSecret);
        }

        Ok(Self {
            key,
            tolerance_secs,
        })
    }

    /// Verify a delivery against the current wall clock.
    pub fn verify(&self, headers: &SvixHeaders<'_>, body: &[u8]) -> Result<(), SignatureError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        self.verify_at(headers, body, now)
    }

    /// Verify a delivery as if the current time were `now` (unix seconds).
    pub fn verify_at(
        &self,
        headers: &SvixHeaders<'_>,
        body: &[u8],
        now: u64,
    ) -> Result<(), SignatureError> {
        let timestamp: u64 = headers.timestamp.trim().parse().map_err(|_| {
            warn!(svix_id = %headers.id, "webhook_signature_invalid_timestamp");
            SignatureError::InvalidTimestamp
        })?;

        let age = now.abs_diff(timestamp);
        if age > self.tolerance_secs {
            warn!(
                svix_id = %headers.id,
                webhook_time = timestamp,
                current_time = now,
                age_seconds = age,
                max_age_seconds = self.tolerance_secs,
                "webhook_signature_stale"
            );
            return Err(SignatureError::TimestampOutOfTolerance);
        }

        let mac = self.mac(headers.id, timestamp, body)?;

        // Several signatures are sent while a secret is being rotated; any
        // v1 match is enough.
        let matched = headers
            .signature
            .split_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .filter(|(version, _)| *version == SIGNATURE_VERSION)
            .filter_map(|(_, encoded)| STANDARD.decode(encoded).ok())
            .any(|expected| mac.clone().verify_slice(&expected).is_ok());

        if matched {
            Ok(())
        } else {
            warn!(
                svix_id = %headers.id,
                candidates = headers.signature.split_whitespace().count(),
                "webhook_signature_mismatch"
            );
            Err(SignatureError::NoMatchingSignature)
        }
    }

    /// Produce the `v1,<base64>` signature for a delivery.
    pub fn sign(&self, msg_id: &str, timestamp: u64, body: &[u8]) -> Result<String, SignatureError> {
        let mac = self.mac(msg_id, timestamp, body)?;
        Ok(format!(
            "{},{}",
            SIGNATURE_VERSION,
            STANDARD.encode(mac.finalize().into_bytes())
        ))
    }

    fn mac(&self, msg_id: &str, timestamp: u64, body: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|_| SignatureError::InvalidSecret)?;
        mac.update(msg_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(mac)
    }
}
