//! Application wiring: state construction + router assembly.

use std::sync::Arc;

use axum::Router;

use masthead_auth::Hs256TokenKeys;
use masthead_core::{Role, UserRecord};

use crate::config::AppConfig;
use crate::directory::{CredentialSource, InMemoryUserDirectory, UserDirectory};
use crate::routes;

/// Shared request state. Everything is an `Arc`: cloning per request is
/// pointer-cheap, and the traits keep the account store swappable.
#[derive(Clone)]
pub struct AppState {
    pub keys: Arc<Hs256TokenKeys>,
    pub directory: Arc<dyn UserDirectory>,
    pub credentials: Arc<dyn CredentialSource>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wire state over a single in-memory account store, seeding the
    /// bootstrap admin when one is configured.
    pub fn in_memory(config: AppConfig) -> Self {
        let directory = Arc::new(InMemoryUserDirectory::new());

        if let Some(admin) = &config.bootstrap_admin {
            tracing::info!(username = %admin.username, "seeding bootstrap admin account");
            directory.seed(
                UserRecord::new(admin.username.clone(), Role::Admin),
                &admin.password,
            );
        }

        Self {
            keys: Arc::new(Hs256TokenKeys::new(config.jwt_secret.as_bytes())),
            directory: directory.clone(),
            credentials: directory,
            config: Arc::new(config),
        }
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
pub fn build_app(state: AppState) -> Router {
    routes::router(state)
}
