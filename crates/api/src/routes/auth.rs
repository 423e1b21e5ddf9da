//! Credential issuance and session verification endpoints.

use axum::Json;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use masthead_auth::{AccessClaims, AuthErrorCode, TokenSigner};
use masthead_core::UserRecord;

use crate::app::AppState;
use crate::context::AuthContext;
use crate::errors::{GateError, json_error};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub token: String,
}

/// `POST /auth/login` — exchange username/password for a token.
pub async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Response {
    let account = match state.credentials.authenticate(&req.username, &req.password).await {
        Ok(account) => account,
        Err(err) => {
            tracing::error!("credential check failed: {err}");
            return GateError::new(AuthErrorCode::AuthenticationError).into_response();
        }
    };

    let Some(user) = account else {
        tracing::info!(username = %req.username, "rejected login attempt");
        return json_error(
            StatusCode::UNAUTHORIZED,
            "INVALID_CREDENTIALS",
            "authentication",
            "Invalid username or password",
        );
    };
    if !user.is_active {
        return GateError::new(AuthErrorCode::UserInactive).into_response();
    }

    match issue_token(&state, &user) {
        Ok((token, expires_at)) => {
            tracing::info!(user = %user.username, "issued session token");
            Json(session_body(&user, &token, expires_at)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

/// `POST /auth/refresh` — trade a token with a valid signature (expired at
/// most the configured grace window ago) for a fresh one. Account state is
/// re-checked: deactivation cuts refresh off too.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<Value>, GateError> {
    let grace = Duration::seconds(state.config.refresh_grace_secs);
    let claims = state
        .keys
        .verify_allow_expired(&req.token, grace, Utc::now())
        .map_err(GateError::from_token_error)?;
    let user_id = claims.subject().map_err(GateError::from_token_error)?;

    let account = state.directory.find_by_id(user_id).await.map_err(|err| {
        tracing::error!("account lookup failed during refresh: {err}");
        GateError::new(AuthErrorCode::AuthenticationError)
    })?;
    let Some(user) = account else {
        return Err(GateError::new(AuthErrorCode::UserNotFound));
    };
    if !user.is_active {
        return Err(GateError::new(AuthErrorCode::UserInactive));
    }

    let (token, expires_at) = issue_token(&state, &user)?;
    tracing::debug!(user = %user.username, "refreshed session token");
    Ok(Json(session_body(&user, &token, expires_at)))
}

/// `GET /auth/validate` — gate-protected; confirms the token and returns the
/// freshened profile.
pub async fn validate(Extension(ctx): Extension<AuthContext>) -> Json<Value> {
    Json(json!({
        "success": true,
        "user": ctx.user,
    }))
}

/// `POST /auth/logout` — acknowledgement only; session teardown is the
/// client's local operation.
pub async fn logout(Extension(ctx): Extension<AuthContext>) -> Json<Value> {
    tracing::info!(user = %ctx.user.username, "logout acknowledged");
    Json(json!({"success": true}))
}

/// `GET /auth/me` — current account.
pub async fn me(Extension(ctx): Extension<AuthContext>) -> Json<Value> {
    Json(json!({
        "success": true,
        "user": ctx.user,
    }))
}

fn issue_token(
    state: &AppState,
    user: &UserRecord,
) -> Result<(String, DateTime<Utc>), GateError> {
    let ttl = Duration::seconds(state.config.token_ttl_secs);
    let issued_at = Utc::now();
    let claims = AccessClaims::for_user(user, issued_at, ttl);
    let token = state
        .keys
        .sign(&claims)
        .map_err(GateError::from_token_error)?;
    Ok((token, claims.expires_at()))
}

fn session_body(user: &UserRecord, token: &str, expires_at: DateTime<Utc>) -> Value {
    json!({
        "success": true,
        "token": token,
        "expires_at": expires_at.to_rfc3339(),
        "user": user,
    })
}
