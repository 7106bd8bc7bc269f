//! File access capability tokens.
//!
//! A capability is a short-lived HMAC-SHA256 signed assertion that one
//! subject may read one blob. It is minted at a point where the caller has
//! already passed the project permission check, and redeemed at the blob
//! read endpoint without re-running that check.
//!
//! Tokens are stateless: nothing is persisted, expiry is the only
//! deactivation path. Wire format is `base64url(claims).base64url(mac)`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use atelier_state::ContentDigest;

use crate::domain::{Result, VcsError};
use crate::metrics::METRICS;
use crate::obs;

type HmacSha256 = Hmac<Sha256>;

/// Sentinel subject admitting any requester; used for public projects.
pub const ANY_SUBJECT: &str = "*";

/// The only action capabilities are minted for.
const READ_ACTION: &str = "read";

/// Default validity window in seconds.
const DEFAULT_VALIDITY_SECS: i64 = 300;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    content_hash: String,
    subject: String,
    action: String,
    /// Unix seconds; the token is invalid from this instant on.
    expires_at: i64,
}

/// Mints and verifies read capabilities over an externally provisioned
/// signing key. The key is rotatable: verification only succeeds for tokens
/// minted under the current key, which bounds rotation fallout to one
/// validity window.
pub struct CapabilityIssuer {
    key: Vec<u8>,
    validity: Duration,
}

impl CapabilityIssuer {
    /// Create an issuer with the default 5-minute validity window.
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            validity: Duration::seconds(DEFAULT_VALIDITY_SECS),
        }
    }

    /// Set a custom validity window.
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Mint a read capability for `subject` on `content_hash`.
    pub fn issue(&self, content_hash: &ContentDigest, subject: &str) -> String {
        self.issue_at(content_hash, subject, Utc::now())
    }

    /// Mint with a specific clock value (for testing).
    pub fn issue_at(
        &self,
        content_hash: &ContentDigest,
        subject: &str,
        now: DateTime<Utc>,
    ) -> String {
        let claims = Claims {
            content_hash: content_hash.as_str().to_string(),
            subject: subject.to_string(),
            action: READ_ACTION.to_string(),
            expires_at: (now + self.validity).timestamp(),
        };
        let body = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&claims).expect("claims struct serializes to JSON"),
        );
        let tag = self.mac(body.as_bytes());
        format!("{body}.{tag}")
    }

    /// Redeem a token, returning the blob digest it grants access to.
    pub fn verify(&self, token: &str, requesting_user_id: &str) -> Result<ContentDigest> {
        self.verify_at(token, requesting_user_id, Utc::now())
    }

    /// Verify against a specific clock value (for testing).
    ///
    /// Every rejection cause — bad signature, expiry, wrong action, subject
    /// mismatch, malformed token — collapses into the same opaque
    /// `VcsError::InvalidCapability`.
    pub fn verify_at(
        &self,
        token: &str,
        requesting_user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ContentDigest> {
        let (body, tag) = match token.split_once('.') {
            Some(parts) => parts,
            None => return Err(self.reject()),
        };

        let tag_bytes = match URL_SAFE_NO_PAD.decode(tag) {
            Ok(bytes) => bytes,
            Err(_) => return Err(self.reject()),
        };
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(body.as_bytes());
        if mac.verify_slice(&tag_bytes).is_err() {
            return Err(self.reject());
        }

        // Signature is valid; the claims are ours, but may no longer hold.
        let claims: Claims = match URL_SAFE_NO_PAD
            .decode(body)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        {
            Some(claims) => claims,
            None => return Err(self.reject()),
        };

        if claims.action != READ_ACTION {
            return Err(self.reject());
        }
        if now.timestamp() >= claims.expires_at {
            return Err(self.reject());
        }
        if claims.subject != ANY_SUBJECT && claims.subject != requesting_user_id {
            return Err(self.reject());
        }

        ContentDigest::try_from(claims.content_hash).map_err(|_| self.reject())
    }

    fn mac(&self, data: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(data);
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    fn reject(&self) -> VcsError {
        METRICS.inc_capability_rejections();
        obs::emit_capability_rejected();
        VcsError::InvalidCapability
    }
}
