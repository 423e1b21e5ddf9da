//! Cross-context propagation of auth events.
//!
//! Every context that mutates the shared session state announces it here.
//! The announcement is delivered twice, deliberately:
//!
//! 1. immediately, to this context's own listeners, tagged [`EventSource::Local`],
//!    so the mutating context updates without waiting for the shared-store
//!    notification (and without racing it);
//! 2. over the [`ChangeChannel`], wrapped in a [`SyncEnvelope`] carrying the
//!    origin context id. Receiving contexts drop envelopes from themselves
//!    and dispatch the rest re-tagged [`EventSource::CrossTab`].
//!
//! The origin filter is the load-bearing piece: without it a context would
//! re-process its own writes and feed the loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use masthead_core::UserRecord;
use masthead_events::{ChangeChannel, Subscription};

/// Identity of one execution context (one tab, one window).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ContextId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Where an event came from, as seen by the consuming listener.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// This context performed the mutation itself.
    Local,
    /// Another context performed it; we observed the notification.
    CrossTab,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossContextEventKind {
    TokenUpdated,
    TokenRemoved,
    TokenExpired,
    UserUpdated,
}

/// One normalized auth event.
///
/// Payload fields are optional: a `TokenUpdated` usually carries the token,
/// expiry, and the confirmed profile so a receiving context can adopt the
/// session without a network round trip; consumers fall back to the shared
/// store for anything missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossContextEvent {
    pub kind: CrossContextEventKind,
    pub source: EventSource,
    pub timestamp: DateTime<Utc>,
    pub token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub user: Option<UserRecord>,
}

impl CrossContextEvent {
    fn local(kind: CrossContextEventKind) -> Self {
        Self {
            kind,
            source: EventSource::Local,
            timestamp: Utc::now(),
            token: None,
            expiry: None,
            user: None,
        }
    }

    pub fn token_updated(
        token: &str,
        expiry: DateTime<Utc>,
        user: Option<UserRecord>,
    ) -> Self {
        Self {
            token: Some(token.to_string()),
            expiry: Some(expiry),
            user,
            ..Self::local(CrossContextEventKind::TokenUpdated)
        }
    }

    pub fn token_removed() -> Self {
        Self::local(CrossContextEventKind::TokenRemoved)
    }

    pub fn token_expired() -> Self {
        Self::local(CrossContextEventKind::TokenExpired)
    }

    pub fn user_updated(user: UserRecord) -> Self {
        Self {
            user: Some(user),
            ..Self::local(CrossContextEventKind::UserUpdated)
        }
    }

    fn retagged(mut self, source: EventSource) -> Self {
        self.source = source;
        self
    }
}

/// Envelope on the change channel: the event plus who wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEnvelope {
    pub origin: ContextId,
    pub event: CrossContextEvent,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ListenerFn = Box<dyn Fn(&CrossContextEvent) + Send + Sync>;

/// One context's endpoint of the cross-context protocol.
///
/// Listener callbacks run synchronously on the announcing/pumping thread and
/// must not call back into `add_listener`/`remove_listener`/`pump`.
pub struct CrossContextSync {
    context_id: ContextId,
    channel: Arc<dyn ChangeChannel<SyncEnvelope>>,
    inbox: Mutex<Subscription<SyncEnvelope>>,
    listeners: Mutex<Vec<(ListenerId, ListenerFn)>>,
    next_listener_id: AtomicU64,
}

impl CrossContextSync {
    pub fn new(channel: Arc<dyn ChangeChannel<SyncEnvelope>>) -> Self {
        let inbox = Mutex::new(channel.subscribe());
        Self {
            context_id: ContextId::new(),
            channel,
            inbox,
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    /// Register a listener for normalized events (both sources). Consumers
    /// must remove their listener on teardown to avoid leaking across
    /// remounts.
    pub fn add_listener(
        &self,
        listener: impl Fn(&CrossContextEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.lock_listeners().retain(|(lid, _)| *lid != id);
    }

    /// Announce a local mutation: local listeners first, then the channel.
    pub fn announce(&self, event: CrossContextEvent) {
        debug_assert_eq!(event.source, EventSource::Local);
        tracing::debug!(kind = ?event.kind, "announcing session event");
        self.notify(&event);

        let envelope = SyncEnvelope {
            origin: self.context_id,
            event,
        };
        if let Err(err) = self.channel.publish(envelope) {
            tracing::warn!("failed to broadcast session event: {err}");
        }
    }

    /// Drain pending envelopes from other contexts, dispatching each to the
    /// listeners re-tagged `CrossTab`. Returns the number dispatched.
    ///
    /// On the web target this runs from the storage-event handler; in tests
    /// and non-browser hosts it is driven explicitly.
    pub fn pump(&self) -> usize {
        let inbox = self
            .inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut dispatched = 0;
        while let Ok(envelope) = inbox.try_recv() {
            if envelope.origin == self.context_id {
                // Self-originated echo; already applied via announce().
                continue;
            }
            let event = envelope.event.retagged(EventSource::CrossTab);
            tracing::debug!(kind = ?event.kind, origin = %envelope.origin, "adopting cross-context event");
            self.notify(&event);
            dispatched += 1;
        }
        dispatched
    }

    fn notify(&self, event: &CrossContextEvent) {
        let listeners = self.lock_listeners();
        for (_, listener) in listeners.iter() {
            listener(event);
        }
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, ListenerFn)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
