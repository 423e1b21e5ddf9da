//! Token signing/verification over HS256.
//!
//! The traits keep the rest of the system honest about what it needs: the
//! gate verifies, the issuance route signs, nothing else touches key
//! material.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use crate::claims::AccessClaims;

/// Token verification failure.
///
/// The split between `Expired` and the rest matters downstream: expiry is
/// recoverable via refresh, the others are not.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Signature checked out but the token is past its expiry.
    #[error("token has expired")]
    Expired {
        /// Expiry read back from the claims, for machine-readable detail.
        expired_at: Option<DateTime<Utc>>,
    },

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("token payload has no subject")]
    MissingSubject,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Verifies an opaque bearer token into claims.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<AccessClaims, TokenError>;
}

/// Signs claims into an opaque bearer token.
pub trait TokenSigner: Send + Sync {
    fn sign(&self, claims: &AccessClaims) -> Result<String, TokenError>;
}

/// Symmetric HS256 key pair for signing and verifying.
pub struct Hs256TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Hs256TokenKeys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Verify the signature but tolerate an expired `exp`, up to `grace`.
    ///
    /// Used by the refresh endpoint: a token just past expiry is still an
    /// acceptable proof of identity for a short window.
    pub fn verify_allow_expired(
        &self,
        token: &str,
        grace: Duration,
        now: DateTime<Utc>,
    ) -> Result<AccessClaims, TokenError> {
        let claims = self.decode(token, false)?;
        let expires_at = claims.expires_at();
        if now >= expires_at + grace {
            return Err(TokenError::Expired {
                expired_at: Some(expires_at),
            });
        }
        if now < claims.issued_at() {
            return Err(TokenError::NotYetValid);
        }
        Ok(claims)
    }

    fn decode(&self, token: &str, validate_exp: bool) -> Result<AccessClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Zero leeway: an expiry one second in the past is expired.
        validation.leeway = 0;
        validation.validate_exp = validate_exp;

        match decode::<AccessClaims>(token, &self.decoding, &validation) {
            Ok(data) => Ok(data.claims),
            Err(err) => Err(self.map_decode_error(token, err)),
        }
    }

    fn map_decode_error(&self, token: &str, err: jsonwebtoken::errors::Error) -> TokenError {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired {
                // Re-decode with expiry checking off to surface *when* it
                // expired; the signature has already been verified.
                expired_at: self.decode(token, false).ok().map(|c| c.expires_at()),
            },
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ImmatureSignature => TokenError::NotYetValid,
            other => TokenError::Malformed(format!("{other:?}")),
        }
    }
}

impl TokenVerifier for Hs256TokenKeys {
    fn verify(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let claims = self.decode(token, true)?;
        if claims.sub.trim().is_empty() {
            return Err(TokenError::MissingSubject);
        }
        Ok(claims)
    }
}

impl TokenSigner for Hs256TokenKeys {
    fn sign(&self, claims: &AccessClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}
