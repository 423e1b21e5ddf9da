use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use masthead_core::{DepartmentId, Role, UserId, UserRecord};

use crate::verifier::TokenError;

/// JWT claims model (transport-agnostic).
///
/// This is the minimal set of claims Masthead expects once a token has been
/// decoded by whatever security layer is in use. `sub` stays a string at this
/// layer; whether it parses to a [`UserId`] is the gate's concern, and the
/// distinction matters for error reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject / user identifier.
    #[serde(default)]
    pub sub: String,

    /// Username at issuance time (display convenience, not authoritative).
    pub username: String,

    /// RBAC role granted by the token.
    pub role: Role,

    /// Department scope, when the account has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<DepartmentId>,

    /// Issued-at, seconds since epoch.
    pub iat: i64,

    /// Expiry, seconds since epoch.
    pub exp: i64,
}

impl AccessClaims {
    /// Build claims for a user with the given validity window.
    pub fn for_user(user: &UserRecord, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role,
            department_id: user.department_id,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
        }
    }

    /// Parse the subject into a typed user id.
    pub fn subject(&self) -> Result<UserId, TokenError> {
        let trimmed = self.sub.trim();
        if trimmed.is_empty() {
            return Err(TokenError::MissingSubject);
        }
        trimmed
            .parse()
            .map_err(|_| TokenError::Malformed("subject is not a valid user id".into()))
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.iat, 0).single().unwrap_or_default()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_default()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Deterministically validate the claim time window.
///
/// Note: this validates the *claims* only. Signature verification is the
/// verifier's job.
pub fn validate_claims(claims: &AccessClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at() {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at() {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
