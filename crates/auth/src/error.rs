//! Error taxonomy shared by the verification gate and the client session core.
//!
//! The codes are wire-stable: the server serializes them into error bodies
//! and the client switches its recovery behavior on them, so both sides
//! depend on this one enumeration staying in sync.

use serde::{Deserialize, Serialize};

/// Machine-readable auth failure code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthErrorCode {
    /// No credential was presented (or it was empty after trimming).
    TokenMissing,
    /// The Authorization header is not of the form `Bearer <token>`.
    TokenMalformed,
    /// Bad signature, undecodable payload, missing subject, or not yet valid.
    TokenInvalid,
    /// Signature checked out but the token is past expiry.
    TokenExpired,
    /// Subject did not resolve to an account.
    UserNotFound,
    /// Account exists but is deactivated.
    UserInactive,
    /// Authenticated but not allowed to perform this action.
    PermissionDenied,
    /// We failed to check the credential (infrastructure fault), as opposed
    /// to the credential being bad.
    AuthenticationError,
    /// Client-side only: the request never reached the gate.
    NetworkError,
}

/// Coarse category, used for the `type` field of error bodies.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AuthErrorKind {
    Authentication,
    Authorization,
    Internal,
}

impl AuthErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorKind::Authentication => "authentication",
            AuthErrorKind::Authorization => "authorization",
            AuthErrorKind::Internal => "internal",
        }
    }
}

/// What the client should do about a failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// Attempt one token refresh before surfacing anything.
    RefreshThenRetry,
    /// The credential is bad for good: clear the session, go to login.
    ClearSession,
    /// The user stays authenticated; render the denial inline.
    KeepSession,
    /// Transient fault: retry with backoff, do not tear the session down.
    RetryWithBackoff,
}

impl AuthErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorCode::TokenMissing => "TOKEN_MISSING",
            AuthErrorCode::TokenMalformed => "TOKEN_MALFORMED",
            AuthErrorCode::TokenInvalid => "TOKEN_INVALID",
            AuthErrorCode::TokenExpired => "TOKEN_EXPIRED",
            AuthErrorCode::UserNotFound => "USER_NOT_FOUND",
            AuthErrorCode::UserInactive => "USER_INACTIVE",
            AuthErrorCode::PermissionDenied => "PERMISSION_DENIED",
            AuthErrorCode::AuthenticationError => "AUTHENTICATION_ERROR",
            AuthErrorCode::NetworkError => "NETWORK_ERROR",
        }
    }

    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthErrorCode::PermissionDenied => AuthErrorKind::Authorization,
            AuthErrorCode::AuthenticationError | AuthErrorCode::NetworkError => {
                AuthErrorKind::Internal
            }
            _ => AuthErrorKind::Authentication,
        }
    }

    /// HTTP status the server responds with. `None` for client-only codes.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            AuthErrorCode::PermissionDenied => Some(403),
            AuthErrorCode::AuthenticationError => Some(500),
            AuthErrorCode::NetworkError => None,
            _ => Some(401),
        }
    }

    pub fn recovery(&self) -> RecoveryPolicy {
        match self {
            AuthErrorCode::TokenExpired => RecoveryPolicy::RefreshThenRetry,
            AuthErrorCode::TokenMissing
            | AuthErrorCode::TokenMalformed
            | AuthErrorCode::TokenInvalid
            | AuthErrorCode::UserNotFound
            | AuthErrorCode::UserInactive => RecoveryPolicy::ClearSession,
            AuthErrorCode::PermissionDenied => RecoveryPolicy::KeepSession,
            AuthErrorCode::AuthenticationError | AuthErrorCode::NetworkError => {
                RecoveryPolicy::RetryWithBackoff
            }
        }
    }

    /// Default human-readable message.
    pub fn message(&self) -> &'static str {
        match self {
            AuthErrorCode::TokenMissing => "Authentication token is required",
            AuthErrorCode::TokenMalformed => {
                "Invalid authorization header format (expected 'Bearer <token>')"
            }
            AuthErrorCode::TokenInvalid => "Authentication token is invalid",
            AuthErrorCode::TokenExpired => "Authentication token has expired",
            AuthErrorCode::UserNotFound => "User account no longer exists",
            AuthErrorCode::UserInactive => "User account is deactivated",
            AuthErrorCode::PermissionDenied => "Insufficient permissions for this operation",
            AuthErrorCode::AuthenticationError => "Failed to verify authentication",
            AuthErrorCode::NetworkError => "Network error before the request reached the server",
        }
    }
}

impl core::fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
