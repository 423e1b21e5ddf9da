//! Routing tree: public issuance surface + gate-protected auth surface.

use axum::Router;
use axum::routing::{get, post};

use crate::app::AppState;
use crate::middleware;

pub mod auth;
pub mod system;
pub mod users;

pub fn router(state: AppState) -> Router {
    // Protected routes: every request passes the verification gate.
    let protected = Router::new()
        .route("/auth/validate", get(auth::validate))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/users", get(users::list_users).post(users::create_user))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::verification_gate,
        ))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(system::health))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .with_state(state)
        .merge(protected)
}
