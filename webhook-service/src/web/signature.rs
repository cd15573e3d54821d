//! Stripe webhook signature verification.
//!
//! Stripe signs webhook requests using HMAC-SHA256 and sends the result in
//! the `Stripe-Signature` header.
//! Reference: https://docs.stripe.com/webhooks#verify-manually

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

use crate::event::StripeEvent;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Signature scheme Stripe currently uses.
const SCHEME_V1: &str = "v1";

/// Stripe's default timestamp tolerance.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Reasons a webhook is rejected before it reaches the event log.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("webhook secret not configured")]
    NotConfigured,

    #[error("unable to extract timestamp and signatures from header")]
    MalformedHeader,

    #[error("no signatures found matching the expected signature for payload")]
    SignatureMismatch,

    #[error("timestamp outside the tolerance zone ({age_seconds}s old)")]
    StaleTimestamp { age_seconds: i64 },

    #[error("invalid payload: {0}")]
    MalformedPayload(String),
}

/// Parsed `Stripe-Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    /// Hex digests under the `v1` scheme
    pub signatures: Vec<String>,
}

/// Parse a header of the form `t=<ts>,v1=<hex>[,v1=<hex>...]`.
///
/// Items with other schemes (e.g. `v0`) are ignored.
pub fn parse_header(header: &str) -> Result<SignatureHeader, VerifyError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for item in header.split(',') {
        let Some((key, value)) = item.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            SCHEME_V1 if !value.is_empty() => signatures.push(value.to_string()),
            _ => {}
        }
    }

    match timestamp {
        Some(timestamp) if !signatures.is_empty() => Ok(SignatureHeader {
            timestamp,
            signatures,
        }),
        _ => Err(VerifyError::MalformedHeader),
    }
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"` keyed with the secret.
///
/// The whole secret string is the key, `whsec_` prefix included.
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    // new_from_slice accepts keys of any length for HMAC
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Build a `Stripe-Signature` header value for a payload.
pub fn sign_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!(
        "t={},{}={}",
        timestamp,
        SCHEME_V1,
        compute_signature(secret, timestamp, payload)
    )
}

/// Check if signature verification can run with the given secret.
///
/// Blank secrets count as unset.
pub fn is_secret_configured(secret: &str) -> bool {
    !secret.trim().is_empty()
}

/// Verifies webhook requests against one signing secret.
#[derive(Debug, Clone)]
pub struct Verifier {
    secret: Option<String>,
    tolerance: Option<Duration>,
}

impl Verifier {
    /// `tolerance` of `None` disables the timestamp freshness check.
    pub fn new(secret: Option<String>, tolerance: Option<Duration>) -> Self {
        Self { secret, tolerance }
    }

    /// Verify against the current time.
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<StripeEvent, VerifyError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        self.verify_at(payload, header, now)
    }

    /// Verify the signature, then decode the payload.
    ///
    /// The payload is only parsed once the signature has been accepted.
    pub fn verify_at(
        &self,
        payload: &[u8],
        header: &str,
        now: i64,
    ) -> Result<StripeEvent, VerifyError> {
        let secret = match &self.secret {
            Some(s) if is_secret_configured(s) => s,
            _ => return Err(VerifyError::NotConfigured),
        };

        let parsed = parse_header(header).map_err(|e| {
            warn!(header_length = header.len(), "stripe_signature_header_malformed");
            e
        })?;

        let expected = compute_signature(secret, parsed.timestamp, payload);
        let matched = parsed
            .signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate));

        if !matched {
            warn!(
                candidates = parsed.signatures.len(),
                timestamp = parsed.timestamp,
                "stripe_signature_mismatch"
            );
            return Err(VerifyError::SignatureMismatch);
        }

        if let Some(tolerance) = self.tolerance {
            if now.abs_diff(parsed.timestamp) > tolerance.as_secs() {
                let age = now.saturating_sub(parsed.timestamp);
                warn!(
                    webhook_time = parsed.timestamp,
                    current_time = now,
                    age_seconds = age,
                    max_age_seconds = tolerance.as_secs(),
                    "stripe_signature_stale"
                );
                return Err(VerifyError::StaleTimestamp { age_seconds: age });
            }
        }

        serde_json::from_slice::<StripeEvent>(payload).map_err(|e| {
            warn!(error = %e, "stripe_payload_invalid");
            VerifyError::MalformedPayload(e.to_string())
        })
    }
}

/// Constant-time string comparison to prevent timing attacks.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
