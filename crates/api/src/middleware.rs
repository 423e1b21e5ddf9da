//! The token verification gate.
//!
//! One state machine per inbound request, terminal on the first failure:
//! header shape, signature/expiry, subject, account lookup, account state.
//! A fault while *checking* is `AUTHENTICATION_ERROR` (5xx), never a
//! `TOKEN_*` code (4xx): "your credential is bad" and "we failed to check
//! it" must stay distinguishable.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use serde_json::json;

use masthead_auth::{AuthErrorCode, TokenVerifier};

use crate::app::AppState;
use crate::context::AuthContext;
use crate::errors::GateError;

pub async fn verification_gate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, GateError> {
    let token = extract_bearer(req.headers())?;

    let claims = state
        .keys
        .verify(token)
        .map_err(GateError::from_token_error)?;

    let user_id = claims.subject().map_err(GateError::from_token_error)?;

    // I/O-bound lookup; no lock is held across it.
    let account = state.directory.find_by_id(user_id).await.map_err(|err| {
        tracing::error!("account lookup failed during authentication: {err}");
        GateError::new(AuthErrorCode::AuthenticationError)
    })?;

    let Some(user) = account else {
        return Err(GateError::new(AuthErrorCode::UserNotFound));
    };
    if !user.is_active {
        return Err(GateError::new(AuthErrorCode::UserInactive)
            .with_details(json!({"userId": user.id.to_string()})));
    }

    req.extensions_mut().insert(AuthContext { user, claims });
    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, GateError> {
    let Some(header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Err(GateError::new(AuthErrorCode::TokenMissing));
    };

    let header = header
        .to_str()
        .map_err(|_| GateError::new(AuthErrorCode::TokenMalformed))?;

    let Some(rest) = header.strip_prefix("Bearer ") else {
        return Err(GateError::new(AuthErrorCode::TokenMalformed));
    };

    let token = rest.trim();
    if token.is_empty() {
        // `Bearer ` with nothing after it: the scheme was right, the
        // credential is absent.
        return Err(GateError::new(AuthErrorCode::TokenMissing));
    }

    Ok(token)
}
