//! Gateway webhook signature verification.
//!
//! The gateway signs `timestamp || raw_body` with HMAC-SHA256 keyed by
//! the environment's client secret and sends the MAC base64-encoded.
//! Verification always runs on the exact received bytes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::domain::foundation::Timestamp;

/// Maximum allowed clock skew for future timestamps (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Millisecond timestamps are above this value.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Missing signature header")]
    MissingSignature,

    #[error("Missing timestamp header")]
    MissingTimestamp,

    #[error("Signature is not valid base64")]
    MalformedSignature,

    #[error("Timestamp is not a unix epoch value")]
    MalformedTimestamp,

    #[error("Timestamp outside accepted window")]
    TimestampOutOfRange,

    #[error("Signature mismatch")]
    Mismatch,

    #[error("Signing key rejected")]
    InvalidKey,
}

/// Verifier for gateway webhook signatures.
#[derive(Debug, Clone, Default)]
pub struct WebhookSignatureVerifier {
    max_age_secs: Option<i64>,
}

impl WebhookSignatureVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects signatures whose timestamp is older than `secs`.
    pub fn with_max_age(mut self, secs: Option<i64>) -> Self {
        self.max_age_secs = secs;
        self
    }

    /// Verifies the claimed signature against the raw body.
    ///
    /// # Errors
    ///
    /// - `MissingSignature` / `MissingTimestamp` - header absent or blank
    /// - `MalformedSignature` - signature is not base64
    /// - `MalformedTimestamp` / `TimestampOutOfRange` - only with a max age
    /// - `Mismatch` - MAC differs
    pub fn verify(
        &self,
        raw_body: &[u8],
        timestamp: Option<&str>,
        signature: Option<&str>,
        secret: &[u8],
        now: Timestamp,
    ) -> Result<(), SignatureError> {
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(SignatureError::MissingSignature)?;
        let timestamp = timestamp
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(SignatureError::MissingTimestamp)?;

        if let Some(max_age) = self.max_age_secs {
            validate_timestamp(timestamp, max_age, now)?;
        }

        let claimed = STANDARD
            .decode(signature)
            .map_err(|_| SignatureError::MalformedSignature)?;
        let expected = compute_mac(secret, timestamp, raw_body)?;

        if constant_time_compare(&expected, &claimed) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Boolean form of [`verify`](Self::verify).
    pub fn is_authentic(
        &self,
        raw_body: &[u8],
        timestamp: Option<&str>,
        signature: Option<&str>,
        secret: &[u8],
        now: Timestamp,
    ) -> bool {
        self.verify(raw_body, timestamp, signature, secret, now).is_ok()
    }
}

/// Produces the base64 signature the gateway would send.
pub fn sign(secret: &[u8], timestamp: &str, raw_body: &[u8]) -> Result<String, SignatureError> {
    compute_mac(secret, timestamp, raw_body).map(|mac| STANDARD.encode(mac))
}

fn compute_mac(secret: &[u8], timestamp: &str, raw_body: &[u8]) -> Result<Vec<u8>, SignatureError> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(timestamp.as_bytes());
    mac.update(raw_body);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn validate_timestamp(raw: &str, max_age_secs: i64, now: Timestamp) -> Result<(), SignatureError> {
    let value: i64 = raw.parse().map_err(|_| SignatureError::MalformedTimestamp)?;
    let secs = if value > MILLIS_THRESHOLD { value / 1000 } else { value };
    let age = now.as_unix_secs() - secs;

    if age > max_age_secs || age < -MAX_CLOCK_SKEW_SECS {
        return Err(SignatureError::TimestampOutOfRange);
    }
    Ok(())
}

/// Performs constant-time comparison of two byte slices.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"cf_test_secret_12345";
    const TS: &str = "1717171717000";
    const BODY: &[u8] = br#"{"type":"PAYMENT_SUCCESS_WEBHOOK","data":{"order":{"order_id":"o1"}}}"#;

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_717_171_717).unwrap()
    }

    fn signed() -> String {
        sign(SECRET, TS, BODY).unwrap()
    }

    // ══════════════════════════════════════════════════════════════
    // Happy path
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn accepts_valid_signature() {
        let verifier = WebhookSignatureVerifier::new();
        let sig = signed();
        assert_eq!(verifier.verify(BODY, Some(TS), Some(&sig), SECRET, now()), Ok(()));
    }

    #[test]
    fn tolerates_surrounding_whitespace_in_headers() {
        let verifier = WebhookSignatureVerifier::new();
        let sig = format!(" {} ", signed());
        assert!(verifier.is_authentic(BODY, Some(" 1717171717000"), Some(&sig), SECRET, now()));
    }

    // ══════════════════════════════════════════════════════════════
    // Rejections
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn rejects_tampered_body() {
        let verifier = WebhookSignatureVerifier::new();
        let sig = signed();
        let mut tampered = BODY.to_vec();
        tampered[10] ^= 0x01;

        assert_eq!(
            verifier.verify(&tampered, Some(TS), Some(&sig), SECRET, now()),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_reserialized_body() {
        let verifier = WebhookSignatureVerifier::new();
        let sig = signed();
        let value: serde_json::Value = serde_json::from_slice(BODY).unwrap();
        let pretty = serde_json::to_vec_pretty(&value).unwrap();

        assert!(!verifier.is_authentic(&pretty, Some(TS), Some(&sig), SECRET, now()));
    }

    #[test]
    fn rejects_other_timestamp() {
        let verifier = WebhookSignatureVerifier::new();
        let sig = signed();
        assert!(!verifier.is_authentic(BODY, Some("1717171718000"), Some(&sig), SECRET, now()));
    }

    #[test]
    fn rejects_wrong_secret() {
        let verifier = WebhookSignatureVerifier::new();
        let sig = signed();
        assert!(!verifier.is_authentic(BODY, Some(TS), Some(&sig), b"other_secret", now()));
    }

    #[test]
    fn rejects_missing_headers() {
        let verifier = WebhookSignatureVerifier::new();
        let sig = signed();
        assert_eq!(
            verifier.verify(BODY, Some(TS), None, SECRET, now()),
            Err(SignatureError::MissingSignature)
        );
        assert_eq!(
            verifier.verify(BODY, None, Some(&sig), SECRET, now()),
            Err(SignatureError::MissingTimestamp)
        );
    }

    #[test]
    fn rejects_non_base64_signature() {
        let verifier = WebhookSignatureVerifier::new();
        assert_eq!(
            verifier.verify(BODY, Some(TS), Some("%%%not base64%%%"), SECRET, now()),
            Err(SignatureError::MalformedSignature)
        );
    }

    // ══════════════════════════════════════════════════════════════
    // Replay window
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn old_timestamp_accepted_without_max_age() {
        let verifier = WebhookSignatureVerifier::new();
        let sig = signed();
        let later = now().add_days(3);
        assert!(verifier.is_authentic(BODY, Some(TS), Some(&sig), SECRET, later));
    }

    #[test]
    fn old_timestamp_rejected_with_max_age() {
        let verifier = WebhookSignatureVerifier::new().with_max_age(Some(300));
        let sig = signed();
        let later = now().add_days(1);
        assert_eq!(
            verifier.verify(BODY, Some(TS), Some(&sig), SECRET, later),
            Err(SignatureError::TimestampOutOfRange)
        );
    }

    #[test]
    fn future_timestamp_rejected_with_max_age() {
        let verifier = WebhookSignatureVerifier::new().with_max_age(Some(300));
        let sig = signed();
        let earlier = now().add_days(-1);
        assert!(!verifier.is_authentic(BODY, Some(TS), Some(&sig), SECRET, earlier));
    }

    #[test]
    fn seconds_timestamps_are_understood() {
        let verifier = WebhookSignatureVerifier::new().with_max_age(Some(300));
        let sig = sign(SECRET, "1717171700", BODY).unwrap();
        assert!(verifier.is_authentic(BODY, Some("1717171700"), Some(&sig), SECRET, now()));
    }

    #[test]
    fn constant_time_compare_handles_length_mismatch() {
        assert!(!constant_time_compare(b"abc", b"abcd"));
        assert!(constant_time_compare(b"abc", b"abc"));
    }
}
