//! `masthead-session` — the client-side session/authentication core.
//!
//! One logical session per execution context (tab, window), any number of
//! contexts sharing one persisted [`store::SessionStore`] and one
//! change-notification channel. The pieces, leaves first:
//!
//! - [`store::TokenStore`] — persisted token/user record and derived expiry
//! - [`cache::ValidationCache`] — TTL-bounded memo of verification results
//! - [`dedup::RequestDeduplicator`] — collapses concurrent identical calls
//! - [`sync::CrossContextSync`] — propagates auth events between contexts
//!   without feedback loops
//! - [`state::AuthStateMachine`] — the single source of truth for auth state
//! - [`permissions::PermissionEvaluator`] — memoized RBAC checks, invalidated
//!   on every auth transition
//! - [`manager::SessionManager`] — async orchestration over an injected
//!   [`api::AuthApi`]
//!
//! Everything is constructed explicitly and passed by reference; there are no
//! ambient singletons. Consistency across contexts is eventual (last write to
//! the shared store wins); that is a documented property of the protocol,
//! not a defect to lock away.

pub mod api;
pub mod cache;
pub mod dedup;
pub mod error;
pub mod manager;
pub mod permissions;
pub mod state;
pub mod store;
pub mod sync;

pub use api::{AuthApi, LoginSuccess, TokenGrant};
pub use cache::ValidationCache;
pub use dedup::RequestDeduplicator;
pub use error::SessionError;
pub use manager::{DemoIdentity, SessionConfig, SessionManager, ValidationOutcome};
pub use permissions::PermissionEvaluator;
pub use state::{AuthAction, AuthPhase, AuthSnapshot, AuthStateMachine};
pub use store::{InMemorySessionStore, SessionStore, TokenStore};
pub use sync::{
    ContextId, CrossContextEvent, CrossContextEventKind, CrossContextSync, EventSource,
    ListenerId, SyncEnvelope,
};
