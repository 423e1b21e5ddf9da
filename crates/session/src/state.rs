//! The client auth state machine — single source of truth for
//! `{user, token, is_authenticated, expiry, last_validated}`.
//!
//! Driven by explicit actions from the login/logout/refresh/validate flows
//! and by cross-context events. Every dispatch is synchronous; asynchronous
//! work happens elsewhere and lands here as exactly one terminal action.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};

use masthead_core::{Role, UserRecord};

use crate::permissions::PermissionEvaluator;
use crate::store::TokenStore;
use crate::sync::{
    CrossContextEvent, CrossContextEventKind, CrossContextSync, EventSource, ListenerId,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AuthPhase {
    Anonymous,
    /// Establishing a session: a login is in flight, or a persisted token was
    /// found at startup and awaits its background validation.
    Authenticating,
    Authenticated,
    /// Authenticated, with a validation round-trip in flight.
    Revalidating,
}

/// Immutable view of the machine's state at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub phase: AuthPhase,
    pub user: Option<UserRecord>,
    pub token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub last_validated: Option<DateTime<Utc>>,
}

impl AuthSnapshot {
    fn anonymous() -> Self {
        Self {
            phase: AuthPhase::Anonymous,
            user: None,
            token: None,
            expiry: None,
            last_validated: None,
        }
    }

    /// Derived, never stored: authenticated iff the last non-superseded
    /// transition established a session and the token is still inside its
    /// expiry window.
    pub fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.phase, AuthPhase::Authenticated | AuthPhase::Revalidating)
            && self.token.is_some()
            && self.expiry.is_some_and(|expiry| now < expiry)
    }
}

/// Explicit state transitions.
///
/// Actions carrying a `token` are terminal completions of async work; the
/// machine compares that token against the store before applying, so a
/// result superseded by logout (or by a competing refresh) is ignored rather
/// than resurrecting a dead session.
#[derive(Debug, Clone)]
pub enum AuthAction {
    LoginStarted,
    LoginSucceeded {
        user: UserRecord,
        token: String,
        expiry: DateTime<Utc>,
    },
    LoginFailed,
    Logout,
    TokenExpired,
    RefreshSucceeded {
        token: String,
        expiry: DateTime<Utc>,
    },
    ValidateStarted,
    ValidateSucceeded {
        token: String,
        user: UserRecord,
    },
    /// Validation could not be completed (transient fault); leave the
    /// session alone but come out of `Revalidating`.
    ValidateDeferred {
        token: String,
    },
    ValidateFailed {
        token: String,
    },
    /// A profile for the current token became known without a server round
    /// trip (cross-context adoption).
    ProfileAdopted {
        token: String,
        user: UserRecord,
    },
}

struct MachineInner {
    snapshot: AuthSnapshot,
    permissions: PermissionEvaluator,
}

pub struct AuthStateMachine {
    inner: Arc<Mutex<MachineInner>>,
    store: TokenStore,
    sync: Arc<CrossContextSync>,
    listener: ListenerId,
}

impl AuthStateMachine {
    /// Derive the initial state synchronously from the store: a persisted,
    /// unexpired token starts the machine `Authenticating` pending a
    /// background validation; anything else starts `Anonymous`.
    pub fn new(store: TokenStore, sync: Arc<CrossContextSync>) -> Self {
        let now = Utc::now();
        let snapshot = if store.is_valid_at(now) {
            AuthSnapshot {
                phase: AuthPhase::Authenticating,
                user: store.user(),
                token: store.get(),
                expiry: store.expiry(),
                last_validated: None,
            }
        } else {
            AuthSnapshot::anonymous()
        };

        let permissions = PermissionEvaluator::new(snapshot.user.clone());
        let inner = Arc::new(Mutex::new(MachineInner {
            snapshot,
            permissions,
        }));

        let weak = Arc::downgrade(&inner);
        let listener_store = store.clone();
        let listener = sync.add_listener(move |event| {
            Self::on_sync_event(&weak, &listener_store, event);
        });

        Self {
            inner,
            store,
            sync,
            listener,
        }
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.lock().snapshot.clone()
    }

    pub fn phase(&self) -> AuthPhase {
        self.lock().snapshot.phase
    }

    pub fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        self.lock().snapshot.is_authenticated_at(now)
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated_at(Utc::now())
    }

    pub fn has_permission(&self, resource: &str, action: &str) -> bool {
        self.lock().permissions.has_permission(resource, action)
    }

    pub fn has_role(&self, roles: &[Role]) -> bool {
        self.lock().permissions.has_role(roles)
    }

    pub fn dispatch(&self, action: AuthAction) {
        self.dispatch_at(action, Utc::now());
    }

    pub fn dispatch_at(&self, action: AuthAction, now: DateTime<Utc>) {
        tracing::debug!(action = ?std::mem::discriminant(&action), "auth dispatch");
        let mut inner = self.lock();

        match action {
            AuthAction::LoginStarted => {
                inner.snapshot.phase = AuthPhase::Authenticating;
            }

            AuthAction::LoginSucceeded { user, token, expiry } => {
                self.store.set(&token, expiry);
                self.store.set_user(&user);
                inner.permissions.set_user(Some(user.clone()));
                inner.snapshot = AuthSnapshot {
                    phase: AuthPhase::Authenticated,
                    user: Some(user.clone()),
                    token: Some(token.clone()),
                    expiry: Some(expiry),
                    last_validated: Some(now),
                };
                drop(inner);
                self.sync
                    .announce(CrossContextEvent::token_updated(&token, expiry, Some(user)));
            }

            AuthAction::LoginFailed => {
                let had_session = self.store.get().is_some();
                if had_session {
                    self.store.remove();
                }
                Self::to_anonymous(&mut inner);
                drop(inner);
                if had_session {
                    self.sync.announce(CrossContextEvent::token_removed());
                }
            }

            AuthAction::Logout => {
                // Idempotent: logging out of nothing is a no-op, not an error.
                let had_session =
                    self.store.get().is_some() || inner.snapshot.phase != AuthPhase::Anonymous;
                if !had_session {
                    return;
                }
                self.store.remove();
                Self::to_anonymous(&mut inner);
                drop(inner);
                self.sync.announce(CrossContextEvent::token_removed());
            }

            AuthAction::TokenExpired => {
                self.store.remove();
                Self::to_anonymous(&mut inner);
                drop(inner);
                self.sync.announce(CrossContextEvent::token_expired());
            }

            AuthAction::RefreshSucceeded { token, expiry } => {
                // A refresh that lands after logout has nothing to refresh.
                if inner.snapshot.token.is_none() && self.store.get().is_none() {
                    return;
                }
                self.store.set(&token, expiry);
                inner.snapshot.token = Some(token.clone());
                inner.snapshot.expiry = Some(expiry);
                inner.snapshot.phase = AuthPhase::Authenticated;
                inner.snapshot.last_validated = Some(now);
                let user = inner.snapshot.user.clone();
                drop(inner);
                self.sync
                    .announce(CrossContextEvent::token_updated(&token, expiry, user));
            }

            AuthAction::ValidateStarted => {
                if inner.snapshot.phase == AuthPhase::Authenticated {
                    inner.snapshot.phase = AuthPhase::Revalidating;
                }
            }

            AuthAction::ValidateSucceeded { token, user } => {
                if self.store.get().as_deref() != Some(token.as_str()) {
                    tracing::debug!("ignoring validation result for a superseded token");
                    return;
                }
                self.store.set_user(&user);
                inner.permissions.set_user(Some(user.clone()));
                inner.snapshot.user = Some(user.clone());
                inner.snapshot.token = Some(token);
                inner.snapshot.expiry = self.store.expiry();
                inner.snapshot.phase = AuthPhase::Authenticated;
                inner.snapshot.last_validated = Some(now);
                drop(inner);
                self.sync.announce(CrossContextEvent::user_updated(user));
            }

            AuthAction::ValidateDeferred { token } => {
                if self.store.get().as_deref() != Some(token.as_str()) {
                    return;
                }
                if inner.snapshot.phase == AuthPhase::Revalidating {
                    inner.snapshot.phase = AuthPhase::Authenticated;
                }
            }

            AuthAction::ValidateFailed { token } => {
                if self.store.get().as_deref() != Some(token.as_str()) {
                    tracing::debug!("ignoring validation failure for a superseded token");
                    return;
                }
                self.store.remove();
                Self::to_anonymous(&mut inner);
                drop(inner);
                self.sync.announce(CrossContextEvent::token_removed());
            }

            AuthAction::ProfileAdopted { token, user } => {
                if self.store.get().as_deref() != Some(token.as_str()) {
                    return;
                }
                inner.permissions.set_user(Some(user.clone()));
                inner.snapshot.user = Some(user);
                inner.snapshot.token = Some(token);
                inner.snapshot.expiry = self.store.expiry();
                inner.snapshot.phase = AuthPhase::Authenticated;
                // last_validated untouched: adoption is not a server check.
            }
        }
    }

    /// Apply an event observed from another context.
    fn on_sync_event(
        inner: &Weak<Mutex<MachineInner>>,
        store: &TokenStore,
        event: &CrossContextEvent,
    ) {
        if event.source != EventSource::CrossTab {
            // Local events were applied by the dispatch that announced them.
            return;
        }
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);

        match event.kind {
            CrossContextEventKind::TokenUpdated => {
                let Some(token) = event.token.clone().or_else(|| store.get()) else {
                    return;
                };
                let expiry = event.expiry.or_else(|| store.expiry());
                // Adopt the broadcast profile, else whatever the writing
                // context persisted; a missing profile leaves the session
                // pending validation rather than trusting a blank.
                let user = event.user.clone().or_else(|| store.user());

                inner.snapshot.token = Some(token);
                inner.snapshot.expiry = expiry;
                match user {
                    Some(user) => {
                        inner.permissions.set_user(Some(user.clone()));
                        inner.snapshot.user = Some(user);
                        inner.snapshot.phase = AuthPhase::Authenticated;
                    }
                    None => {
                        inner.permissions.set_user(None);
                        inner.snapshot.user = None;
                        inner.snapshot.phase = AuthPhase::Authenticating;
                    }
                }
            }

            CrossContextEventKind::TokenRemoved | CrossContextEventKind::TokenExpired => {
                // The originating context already cleared the shared store.
                Self::to_anonymous(&mut inner);
            }

            CrossContextEventKind::UserUpdated => {
                if let Some(user) = &event.user {
                    inner.permissions.set_user(Some(user.clone()));
                    if inner.snapshot.token.is_some() {
                        inner.snapshot.user = Some(user.clone());
                    }
                }
            }
        }
    }

    fn to_anonymous(inner: &mut MutexGuard<'_, MachineInner>) {
        inner.snapshot = AuthSnapshot::anonymous();
        // Every transition into Anonymous invalidates the permission memo.
        inner.permissions.set_user(None);
        inner.permissions.invalidate();
    }

    fn lock(&self) -> MutexGuard<'_, MachineInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for AuthStateMachine {
    fn drop(&mut self) {
        self.sync.remove_listener(self.listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;

    use masthead_events::InMemoryChangeChannel;

    use crate::store::InMemorySessionStore;
    use crate::sync::SyncEnvelope;

    fn machine() -> AuthStateMachine {
        let store = TokenStore::new(Arc::new(InMemorySessionStore::new()));
        let channel: Arc<InMemoryChangeChannel<SyncEnvelope>> =
            Arc::new(InMemoryChangeChannel::new());
        let sync = Arc::new(CrossContextSync::new(channel));
        AuthStateMachine::new(store.clone(), sync)
    }

    fn alice() -> UserRecord {
        UserRecord::new("alice", Role::User)
    }

    fn login(machine: &AuthStateMachine, token: &str, now: DateTime<Utc>) {
        machine.dispatch_at(
            AuthAction::LoginSucceeded {
                user: alice(),
                token: token.to_string(),
                expiry: now + Duration::hours(1),
            },
            now,
        );
    }

    #[test]
    fn starts_anonymous_with_an_empty_store() {
        let m = machine();
        assert_eq!(m.phase(), AuthPhase::Anonymous);
        assert!(!m.is_authenticated());
    }

    #[test]
    fn starts_authenticating_with_a_persisted_unexpired_token() {
        let raw = Arc::new(InMemorySessionStore::new());
        let store = TokenStore::new(raw.clone());
        store.set("persisted", Utc::now() + Duration::hours(1));
        store.set_user(&alice());

        let channel: Arc<InMemoryChangeChannel<SyncEnvelope>> =
            Arc::new(InMemoryChangeChannel::new());
        let sync = Arc::new(CrossContextSync::new(channel));
        let m = AuthStateMachine::new(store, sync);

        assert_eq!(m.phase(), AuthPhase::Authenticating);
        // Pending validation: not authenticated yet.
        assert!(!m.is_authenticated());
        assert_eq!(m.snapshot().user.unwrap().username, "alice");
    }

    #[test]
    fn login_success_establishes_the_session() {
        let m = machine();
        let now = Utc::now();
        login(&m, "tok-1", now);

        let snap = m.snapshot();
        assert_eq!(snap.phase, AuthPhase::Authenticated);
        assert!(snap.is_authenticated_at(now));
        assert_eq!(snap.last_validated, Some(now));
        assert_eq!(m.store.get().as_deref(), Some("tok-1"));
        assert!(m.has_permission("publications", "read"));
    }

    #[test]
    fn login_failure_from_authenticated_tears_down() {
        let m = machine();
        let now = Utc::now();
        login(&m, "tok-1", now);

        m.dispatch_at(AuthAction::LoginFailed, now);
        assert_eq!(m.phase(), AuthPhase::Anonymous);
        assert_eq!(m.store.get(), None);
        assert!(!m.has_permission("publications", "read"));
    }

    #[test]
    fn logout_is_idempotent() {
        let m = machine();
        let now = Utc::now();
        login(&m, "tok-1", now);

        m.dispatch_at(AuthAction::Logout, now);
        let after_once = m.snapshot();
        m.dispatch_at(AuthAction::Logout, now);
        assert_eq!(m.snapshot(), after_once);
        assert_eq!(m.phase(), AuthPhase::Anonymous);
    }

    #[test]
    fn refresh_replaces_token_and_keeps_user() {
        let m = machine();
        let now = Utc::now();
        login(&m, "tok-1", now);

        m.dispatch_at(
            AuthAction::RefreshSucceeded {
                token: "tok-2".into(),
                expiry: now + Duration::hours(2),
            },
            now,
        );

        let snap = m.snapshot();
        assert_eq!(snap.token.as_deref(), Some("tok-2"));
        assert_eq!(snap.user.unwrap().username, "alice");
        assert_eq!(m.store.get().as_deref(), Some("tok-2"));
    }

    #[test]
    fn refresh_after_logout_is_ignored() {
        let m = machine();
        let now = Utc::now();
        login(&m, "tok-1", now);
        m.dispatch_at(AuthAction::Logout, now);

        m.dispatch_at(
            AuthAction::RefreshSucceeded {
                token: "tok-2".into(),
                expiry: now + Duration::hours(2),
            },
            now,
        );
        assert_eq!(m.phase(), AuthPhase::Anonymous);
        assert_eq!(m.store.get(), None);
    }

    #[test]
    fn stale_validation_results_are_ignored() {
        let m = machine();
        let now = Utc::now();
        login(&m, "tok-1", now);
        m.dispatch_at(AuthAction::Logout, now);

        // A validation of the old token resolves after logout.
        m.dispatch_at(
            AuthAction::ValidateSucceeded {
                token: "tok-1".into(),
                user: alice(),
            },
            now,
        );
        assert_eq!(m.phase(), AuthPhase::Anonymous);

        m.dispatch_at(AuthAction::ValidateFailed { token: "tok-1".into() }, now);
        assert_eq!(m.phase(), AuthPhase::Anonymous);
    }

    #[test]
    fn validate_failure_tears_down() {
        let m = machine();
        let now = Utc::now();
        login(&m, "tok-1", now);

        m.dispatch_at(AuthAction::ValidateStarted, now);
        assert_eq!(m.phase(), AuthPhase::Revalidating);
        // Still authenticated while revalidating.
        assert!(m.is_authenticated_at(now));

        m.dispatch_at(AuthAction::ValidateFailed { token: "tok-1".into() }, now);
        assert_eq!(m.phase(), AuthPhase::Anonymous);
        assert_eq!(m.store.get(), None);
    }

    #[test]
    fn deferred_validation_keeps_the_session() {
        let m = machine();
        let now = Utc::now();
        login(&m, "tok-1", now);

        m.dispatch_at(AuthAction::ValidateStarted, now);
        m.dispatch_at(AuthAction::ValidateDeferred { token: "tok-1".into() }, now);
        assert_eq!(m.phase(), AuthPhase::Authenticated);
        assert!(m.is_authenticated_at(now));
    }

    #[test]
    fn expiry_makes_is_authenticated_false_even_before_any_dispatch() {
        let m = machine();
        let now = Utc::now();
        login(&m, "tok-1", now);

        assert!(m.is_authenticated_at(now + Duration::minutes(59)));
        assert!(!m.is_authenticated_at(now + Duration::minutes(61)));
    }
}
