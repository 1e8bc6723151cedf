//! Webhook signature verification.
//!
//! The gateway signs each webhook with HMAC-SHA256 over `"{timestamp}.{payload}"`
//! and sends the result in a header of the form:
//!
//! ```text
//! t=<unix timestamp>,v1=<hex signature>
//! ```

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::ports::PaymentError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook event (5 minutes).
pub const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

/// Tolerated clock skew for events stamped in the future.
pub const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureParseError {
    #[error("Missing signature header")]
    MissingHeader,

    #[error("Missing timestamp in signature header")]
    MissingTimestamp,

    #[error("Invalid timestamp in signature header")]
    InvalidTimestamp,

    #[error("Missing v1 signature")]
    MissingSignature,

    #[error("Signature is not valid hex")]
    InvalidSignatureFormat,
}

impl From<SignatureParseError> for PaymentError {
    fn from(err: SignatureParseError) -> Self {
        PaymentError::invalid_webhook(err.to_string())
    }
}

/// Parsed signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        if header.trim().is_empty() {
            return Err(SignatureParseError::MissingHeader);
        }

        let mut timestamp = None;
        let mut v1_signature = None;

        for part in header.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key.trim() {
                "t" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse::<i64>()
                            .map_err(|_| SignatureParseError::InvalidTimestamp)?,
                    );
                }
                "v1" => {
                    v1_signature = Some(
                        hex::decode(value.trim())
                            .map_err(|_| SignatureParseError::InvalidSignatureFormat)?,
                    );
                }
                // Unknown schemes are ignored.
                _ => {}
            }
        }

        Ok(Self {
            timestamp: timestamp.ok_or(SignatureParseError::MissingTimestamp)?,
            v1_signature: v1_signature.ok_or(SignatureParseError::MissingSignature)?,
        })
    }
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`.
pub fn compute_signature(secret: &[u8], timestamp: i64, payload: &[u8]) -> String {
    hex::encode(raw_signature(secret, timestamp, payload))
}

/// Builds a complete header value. Used by tests and local tooling.
pub fn signature_header(secret: &[u8], timestamp: i64, payload: &[u8]) -> String {
    format!("t={},v1={}", timestamp, compute_signature(secret, timestamp, payload))
}

fn raw_signature(secret: &[u8], timestamp: i64, payload: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so new_from_slice cannot fail here.
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Checks freshness and signature of a webhook delivery.
pub fn verify_signature(
    secret: &[u8],
    payload: &[u8],
    header: &str,
    now_unix: i64,
) -> Result<(), PaymentError> {
    let header = SignatureHeader::parse(header)?;

    let age = now_unix - header.timestamp;
    if age > MAX_TIMESTAMP_AGE_SECS {
        tracing::warn!(
            event_timestamp = header.timestamp,
            current_time = now_unix,
            age_seconds = age,
            "Webhook event too old - possible replay"
        );
        return Err(PaymentError::invalid_webhook(format!(
            "Event too old ({} seconds)",
            age
        )));
    }

    if age < -MAX_FUTURE_TOLERANCE_SECS {
        tracing::warn!(
            event_timestamp = header.timestamp,
            current_time = now_unix,
            "Webhook event from future - clock skew or manipulation"
        );
        return Err(PaymentError::invalid_webhook("Event timestamp in future"));
    }

    let expected = raw_signature(secret, header.timestamp, payload);
    if expected.is_empty() || expected.ct_eq(&header.v1_signature).unwrap_u8() != 1 {
        tracing::warn!(event_timestamp = header.timestamp, "Invalid webhook signature");
        return Err(PaymentError::invalid_webhook("Invalid signature"));
    }

    Ok(())
}
