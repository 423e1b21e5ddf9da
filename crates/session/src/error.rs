//! Client-side error model.

use thiserror::Error;

use masthead_auth::AuthErrorCode;

/// Failure of a session operation.
///
/// Cloneable on purpose: deduplicated requests fan one result out to every
/// waiting caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The server answered with a structured auth error.
    #[error("{code}: {message}")]
    Api { code: AuthErrorCode, message: String },

    /// The request never reached the verification gate.
    #[error("network error: {0}")]
    Network(String),

    /// The caller-imposed deadline elapsed. Treated exactly like a network
    /// failure: the attempt is over, nothing lingers in flight.
    #[error("request timed out")]
    Timeout,

    /// No local session to operate on.
    #[error("no active session")]
    NoSession,
}

impl SessionError {
    pub fn api(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    /// The taxonomy code driving recovery behavior.
    pub fn code(&self) -> AuthErrorCode {
        match self {
            SessionError::Api { code, .. } => *code,
            SessionError::Network(_) | SessionError::Timeout => AuthErrorCode::NetworkError,
            SessionError::NoSession => AuthErrorCode::TokenMissing,
        }
    }
}
