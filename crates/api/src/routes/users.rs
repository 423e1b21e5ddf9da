//! Account management surface (auth-domain only: registration and listing;
//! credentials are provisioned by the issuance collaborator).

use axum::Json;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use masthead_auth::AuthErrorCode;
use masthead_core::{DepartmentId, Role, UserRecord};

use crate::app::AppState;
use crate::authz;
use crate::context::AuthContext;
use crate::errors::GateError;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub role: Role,
    pub department_id: Option<DepartmentId>,
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, GateError> {
    authz::require_permission(&ctx, "users", "read")?;

    let users = state.directory.list().await.map_err(|err| {
        tracing::error!("listing accounts failed: {err}");
        GateError::new(AuthErrorCode::AuthenticationError)
    })?;
    Ok(Json(json!({"success": true, "users": users})))
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<Value>), GateError> {
    authz::require_permission(&ctx, "users", "create")?;

    let mut user = UserRecord::new(req.username, req.role);
    if let Some(department_id) = req.department_id {
        user = user.with_department(department_id);
    }

    let user = state.directory.create(user).await.map_err(|err| {
        tracing::error!("account creation failed: {err}");
        GateError::new(AuthErrorCode::AuthenticationError)
    })?;

    tracing::info!(username = %user.username, role = %user.role, "account registered");
    Ok((StatusCode::CREATED, Json(json!({"success": true, "user": user}))))
}
