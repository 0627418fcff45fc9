//! Bearer tokens.
//!
//! Compact HS256 JWS: `base64url(header).base64url(claims).base64url(mac)`.
//! The pipeline only needs "verify token → subject" and "issue token for
//! subject"; both live behind [`TokenAuthority`].

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Token errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is not a three-part compact JWS")]
    Malformed,
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("token signature does not verify")]
    BadSignature,
    #[error("token encoding error: {0}")]
    Encoding(String),
    #[error("invalid signing key")]
    InvalidKey,
}

/// Token claims. Only `sub` identifies a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default)]
    pub iat: i64,
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

/// Verifies and issues client tokens.
pub trait TokenAuthority: Send + Sync {
    /// Check the signature and return the claims.
    fn verify(&self, token: &str) -> Result<Claims, TokenError>;

    /// Issue a token whose subject is `subject`.
    fn issue(&self, subject: &str) -> Result<String, TokenError>;
}

/// HMAC-SHA256 token authority with a shared secret.
#[derive(Clone)]
pub struct Hs256Tokens {
    secret: Vec<u8>,
}

impl Hs256Tokens {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::InvalidKey)
    }

    fn encode_part<T: Serialize>(value: &T) -> Result<String, TokenError> {
        let json = serde_json::to_vec(value).map_err(|e| TokenError::Encoding(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    fn decode_part<T: for<'de> Deserialize<'de>>(part: &str) -> Result<T, TokenError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(part)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| TokenError::Encoding(e.to_string()))
    }
}

impl std::fmt::Debug for Hs256Tokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hs256Tokens").finish_non_exhaustive()
    }
}

impl TokenAuthority for Hs256Tokens {
    fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut parts = token.trim().split('.');
        let (Some(header), Some(claims), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let parsed: Header = Self::decode_part(header)?;
        if parsed.alg != "HS256" {
            return Err(TokenError::UnsupportedAlgorithm(parsed.alg));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        let mut mac = self.mac()?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(claims.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        Self::decode_part(claims)
    }

    fn issue(&self, subject: &str) -> Result<String, TokenError> {
        let header = Self::encode_part(&Header {
            alg: "HS256".into(),
            typ: Some("JWT".into()),
        })?;
        let claims = Self::encode_part(&Claims {
            sub: Some(subject.to_string()),
            iat: chrono::Utc::now().timestamp(),
        })?;

        let mut mac = self.mac()?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(claims.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}.{}", header, claims, signature))
    }
}
