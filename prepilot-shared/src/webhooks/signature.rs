//! Svix webhook signature verification
//!
//! Clerk delivers webhooks through Svix. Every delivery carries three
//! headers:
//!
//! - `svix-id`: unique message ID
//! - `svix-timestamp`: Unix seconds when the message was signed
//! - `svix-signature`: one or more space-separated `v1,<base64>` entries
//!
//! The signature is `base64(HMAC-SHA256(key, "<id>.<timestamp>.<body>"))`.
//! The key is the configured secret with its `whsec_` prefix stripped and
//! base64-decoded; a secret that does not decode is used as raw bytes.
//!
//! # Example
//!
//! ```
//! use prepilot_shared::webhooks::signature::{WebhookHeaders, WebhookVerifier};
//!
//! let verifier = WebhookVerifier::new("whsec_c2VjcmV0", false);
//! let body = br#"{"type":"user.created"}"#;
//! let now = 1_700_000_000;
//!
//! let signature = format!("v1,{}", verifier.sign("msg_1", now, body).unwrap());
//! let headers = WebhookHeaders {
//!     id: Some("msg_1"),
//!     timestamp: Some("1700000000"),
//!     signature: Some(&signature),
//! };
//!
//! assert!(verifier.verify_at(&headers, body, now).is_ok());
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_ID: &str = "svix-id";
pub const HEADER_TIMESTAMP: &str = "svix-timestamp";
pub const HEADER_SIGNATURE: &str = "svix-signature";

/// Maximum allowed distance between the signed timestamp and now
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

const SECRET_PREFIX: &str = "whsec_";
const SIGNATURE_VERSION: &str = "v1";

/// Why a delivery was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebhookError {
    #[error("No webhook secret configured")]
    MissingSecret,

    #[error("Missing {0} header")]
    MissingHeader(&'static str),

    #[error("Invalid timestamp header")]
    InvalidTimestamp,

    #[error("Timestamp is outside the tolerance window")]
    TimestampOutOfRange,

    #[error("No v1 signature in header")]
    NoSignature,

    #[error("Signature does not match")]
    SignatureMismatch,
}

/// The Svix headers of one delivery, as received
#[derive(Debug, Clone, Copy, Default)]
pub struct WebhookHeaders<'a> {
    pub id: Option<&'a str>,
    pub timestamp: Option<&'a str>,
    pub signature: Option<&'a str>,
}

/// Verifies Svix signatures with a shared secret
#[derive(Clone)]
pub struct WebhookVerifier {
    key: Option<Vec<u8>>,
    allow_unsigned: bool,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret_configured", &self.key.is_some())
            .field("allow_unsigned", &self.allow_unsigned)
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

/// Turns the configured secret into HMAC key bytes
///
/// `whsec_<base64>` decodes to its payload. Anything else, including a
/// `whsec_` value that is not valid base64, is used verbatim.
pub fn decode_secret(secret: &str) -> Vec<u8> {
    if let Some(encoded) = secret.strip_prefix(SECRET_PREFIX) {
        if let Ok(decoded) = STANDARD.decode(encoded) {
            return decoded;
        }
        debug!("Webhook secret has whsec_ prefix but is not base64, using raw bytes");
    }
    secret.as_bytes().to_vec()
}

/// Extracts every `v1` signature from a `svix-signature` header
fn v1_signatures(header: &str) -> impl Iterator<Item = &str> {
    header.split_whitespace().filter_map(|entry| {
        let (version, value) = entry.split_once(',')?;
        (version.trim() == SIGNATURE_VERSION && !value.trim().is_empty()).then(|| value.trim())
    })
}

impl WebhookVerifier {
    /// Creates a verifier
    ///
    /// An empty `secret` means no secret is configured: every delivery is
    /// then accepted when `allow_unsigned` is set (development) and rejected
    /// otherwise.
    pub fn new(secret: &str, allow_unsigned: bool) -> Self {
        let key = (!secret.is_empty()).then(|| decode_secret(secret));

        if key.is_none() {
            if allow_unsigned {
                warn!("No webhook secret configured; accepting unsigned webhooks");
            } else {
                warn!("No webhook secret configured; all webhooks will be rejected");
            }
        }

        Self {
            key,
            allow_unsigned,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    pub fn has_secret(&self) -> bool {
        self.key.is_some()
    }

    /// Computes the base64 signature for a message
    ///
    /// Returns None when no secret is configured.
    pub fn sign(&self, id: &str, timestamp: i64, body: &[u8]) -> Option<String> {
        self.signature_for(id, &timestamp.to_string(), body)
    }

    fn signature_for(&self, id: &str, timestamp: &str, body: &[u8]) -> Option<String> {
        let key = self.key.as_deref()?;
        let mut mac = HmacSha256::new_from_slice(key).ok()?;
        mac.update(id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        Some(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Verifies a delivery against the current time
    pub fn verify(&self, headers: &WebhookHeaders<'_>, body: &[u8]) -> Result<(), WebhookError> {
        self.verify_at(headers, body, chrono::Utc::now().timestamp())
    }

    /// Verifies a delivery as if the current Unix time were `now`
    ///
    /// # Errors
    ///
    /// Returns the first check that failed: configuration, headers,
    /// timestamp window, then signature.
    pub fn verify_at(&self, headers: &WebhookHeaders<'_>, body: &[u8], now: i64) -> Result<(), WebhookError> {
        if self.key.is_none() {
            return if self.allow_unsigned {
                Ok(())
            } else {
                Err(WebhookError::MissingSecret)
            };
        }

        let id = headers.id.ok_or(WebhookError::MissingHeader(HEADER_ID))?;
        let timestamp = headers
            .timestamp
            .ok_or(WebhookError::MissingHeader(HEADER_TIMESTAMP))?;
        let signature = headers
            .signature
            .ok_or(WebhookError::MissingHeader(HEADER_SIGNATURE))?;

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| WebhookError::InvalidTimestamp)?;
        if now.abs_diff(ts) > self.tolerance_secs.max(0) as u64 {
            return Err(WebhookError::TimestampOutOfRange);
        }

        // Signed over the header text exactly as received
        let expected = self
            .signature_for(id, timestamp, body)
            .ok_or(WebhookError::SignatureMismatch)?;

        let mut saw_v1 = false;
        for candidate in v1_signatures(signature) {
            saw_v1 = true;
            if bool::from(candidate.as_bytes().ct_eq(expected.as_bytes())) {
                return Ok(());
            }
        }

        if saw_v1 {
            Err(WebhookError::SignatureMismatch)
        } else {
            Err(WebhookError::NoSignature)
        }
    }
}
