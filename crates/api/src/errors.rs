//! Structured JSON error responses.
//!
//! Every auth failure serializes to the same body shape:
//! `{success, error, code, type, timestamp, details}`. Clients switch on
//! `code`; humans read `error`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::{Value, json};

use masthead_auth::{AuthErrorCode, TokenError};

#[derive(Debug)]
pub struct GateError {
    code: AuthErrorCode,
    message: String,
    details: Value,
}

impl GateError {
    pub fn new(code: AuthErrorCode) -> Self {
        Self {
            code,
            message: code.message().to_string(),
            details: json!({}),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn code(&self) -> AuthErrorCode {
        self.code
    }

    /// Map a verification failure into the gate taxonomy.
    ///
    /// Everything except expiry collapses into `TOKEN_INVALID` (the header
    /// was well-formed, the credential itself is bad), with the concrete
    /// reason preserved in the details.
    pub fn from_token_error(err: TokenError) -> Self {
        match err {
            TokenError::Expired { expired_at } => Self::new(AuthErrorCode::TokenExpired)
                .with_details(json!({
                    "expiry": expired_at.map(|at| at.to_rfc3339()),
                })),
            TokenError::InvalidSignature => Self::new(AuthErrorCode::TokenInvalid)
                .with_details(json!({"reason": "invalid_signature"})),
            TokenError::NotYetValid => Self::new(AuthErrorCode::TokenInvalid)
                .with_details(json!({"reason": "not_yet_valid"})),
            TokenError::MissingSubject => Self::new(AuthErrorCode::TokenInvalid)
                .with_details(json!({"reason": "missing_subject"})),
            TokenError::Malformed(detail) => Self::new(AuthErrorCode::TokenInvalid)
                .with_details(json!({"reason": "malformed", "detail": detail})),
            TokenError::Signing(detail) => {
                Self::new(AuthErrorCode::AuthenticationError).with_message(detail)
            }
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self
            .code
            .http_status()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        (
            status,
            Json(json!({
                "success": false,
                "error": self.message,
                "code": self.code.as_str(),
                "type": self.code.kind().as_str(),
                "timestamp": Utc::now().to_rfc3339(),
                "details": self.details,
            })),
        )
            .into_response()
    }
}

/// One-off error body for codes outside the gate taxonomy (e.g. rejected
/// credentials on the issuance route).
pub fn json_error(
    status: StatusCode,
    code: &'static str,
    kind: &'static str,
    message: impl Into<String>,
) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": message.into(),
            "code": code,
            "type": kind,
            "timestamp": Utc::now().to_rfc3339(),
            "details": {},
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_token_error_carries_expiry_detail() {
        let at = Utc::now();
        let err = GateError::from_token_error(TokenError::Expired {
            expired_at: Some(at),
        });
        assert_eq!(err.code(), AuthErrorCode::TokenExpired);
        assert_eq!(err.details["expiry"], json!(at.to_rfc3339()));
    }

    #[test]
    fn signature_and_shape_failures_are_token_invalid() {
        for err in [
            TokenError::InvalidSignature,
            TokenError::NotYetValid,
            TokenError::MissingSubject,
            TokenError::Malformed("bad".into()),
        ] {
            assert_eq!(
                GateError::from_token_error(err).code(),
                AuthErrorCode::TokenInvalid
            );
        }
    }
}
