//! VAPID (RFC 8292) application server authentication.

use base64::Engine;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use reqwest::Url;
use serde_json::json;

use super::PushError;
use super::ece::BASE64_URL;

/// Lifetime of a signed token. RFC 8292 caps it at 24 hours.
pub const TOKEN_LIFETIME_SECS: i64 = 12 * 60 * 60;

/// Default `sub` claim.
pub const DEFAULT_SUBJECT: &str = "mailto:admin@linky.app";

/// Signs VAPID tokens with the application server's P-256 key pair.
#[derive(Clone)]
pub struct VapidSigner {
    signing_key: SigningKey,
    public_key: String,
    subject: String,
}

impl std::fmt::Debug for VapidSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidSigner")
            .field("public_key", &self.public_key)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl VapidSigner {
    /// Build a signer from base64url keys as produced by common VAPID key
    /// generators: a 65-byte uncompressed public key and a 32-byte private
    /// scalar. The public key must belong to the private key.
    pub fn from_base64(
        public_key: &str,
        private_key: &str,
        subject: impl Into<String>,
    ) -> Result<Self, PushError> {
        let private = BASE64_URL
            .decode(private_key.trim())
            .map_err(|e| PushError::Crypto(format!("VAPID private key: {e}")))?;
        let signing_key = SigningKey::from_slice(&private)
            .map_err(|e| PushError::Crypto(format!("VAPID private key: {e}")))?;

        let signer = Self::from_signing_key(signing_key, subject);
        let given = BASE64_URL
            .decode(public_key.trim())
            .map_err(|e| PushError::Crypto(format!("VAPID public key: {e}")))?;
        let derived = BASE64_URL
            .decode(&signer.public_key)
            .map_err(|e| PushError::Crypto(e.to_string()))?;
        if given != derived {
            return Err(PushError::Crypto(
                "VAPID public key does not match private key".into(),
            ));
        }
        Ok(signer)
    }

    pub fn from_signing_key(signing_key: SigningKey, subject: impl Into<String>) -> Self {
        let public_key = BASE64_URL.encode(
            signing_key
                .verifying_key()
                .to_encoded_point(false)
                .as_bytes(),
        );
        Self {
            signing_key,
            public_key,
            subject: subject.into(),
        }
    }

    /// Base64url application server key (the browser's `applicationServerKey`).
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Signed ES256 JWT for pushing to `endpoint`, valid until `now` plus
    /// [`TOKEN_LIFETIME_SECS`].
    pub fn token(&self, endpoint: &Url, now: i64) -> Result<String, PushError> {
        let audience = endpoint.origin();
        if !audience.is_tuple() {
            return Err(PushError::InvalidSubscription(format!(
                "endpoint has no origin: {endpoint}"
            )));
        }

        let header = json!({ "typ": "JWT", "alg": "ES256" });
        let claims = json!({
            "aud": audience.ascii_serialization(),
            "exp": now + TOKEN_LIFETIME_SECS,
            "sub": self.subject,
        });
        let signing_input = format!(
            "{}.{}",
            BASE64_URL.encode(header.to_string()),
            BASE64_URL.encode(claims.to_string())
        );
        let signature: Signature = self.signing_key.sign(signing_input.as_bytes());
        Ok(format!(
            "{signing_input}.{}",
            BASE64_URL.encode(signature.to_bytes())
        ))
    }

    /// `Authorization` header value for pushing to `endpoint`.
    pub fn authorization(&self, endpoint: &Url, now: i64) -> Result<String, PushError> {
        Ok(format!(
            "vapid t={}, k={}",
            self.token(endpoint, now)?,
            self.public_key
        ))
    }
}
