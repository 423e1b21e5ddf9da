//! Role/resource authorization guards, composed on top of the gate.
//!
//! These run after authentication, so a denial is `PERMISSION_DENIED` (403)
//! and never tears a session down. Each denial reports what was required
//! against what the caller actually has.

use serde_json::json;

use masthead_auth::{AuthErrorCode, role_allows};
use masthead_core::Role;

use crate::context::AuthContext;
use crate::errors::GateError;

/// Require an exact role (admins always pass).
pub fn require_role(ctx: &AuthContext, required: Role) -> Result<(), GateError> {
    if ctx.user.role == required || ctx.user.role == Role::Admin {
        return Ok(());
    }

    Err(GateError::new(AuthErrorCode::PermissionDenied).with_details(json!({
        "requiredRole": required.as_str(),
        "currentRole": ctx.user.role.as_str(),
    })))
}

/// Require a `resource:action` permission derived from the role table.
pub fn require_permission(
    ctx: &AuthContext,
    resource: &str,
    action: &str,
) -> Result<(), GateError> {
    if role_allows(ctx.user.role, resource, action) {
        return Ok(());
    }

    Err(GateError::new(AuthErrorCode::PermissionDenied).with_details(json!({
        "required": format!("{resource}:{action}"),
        "currentRole": ctx.user.role.as_str(),
    })))
}
