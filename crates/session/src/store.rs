//! Persisted session store and the token record living in it.
//!
//! The store is a flat string-to-string mapping so the web target can back
//! it with browser local storage unchanged. Structured values are
//! JSON-encoded. The store is injected explicitly, constructed once at
//! application start and passed down, never reached through an ambient
//! global.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, TimeZone, Utc};

use masthead_core::UserRecord;

/// Well-known keys of the persisted record.
pub mod keys {
    pub const TOKEN: &str = "token";
    /// Epoch milliseconds, stringified.
    pub const EXPIRY: &str = "expiry";
    /// JSON-encoded [`masthead_core::UserRecord`].
    pub const USER: &str = "user";
    /// Last protected path visited while unauthenticated, for post-login
    /// restoration.
    pub const REDIRECT_PATH: &str = "redirect_path";
    /// Monotonically increasing write marker; lets contexts detect that the
    /// token record changed underneath them.
    pub const WRITE_SEQ: &str = "write_seq";
}

/// Minimal persistent key-value contract.
///
/// One implementation per target runtime: local storage on the web, a file or
/// embedded db on desktop, [`InMemorySessionStore`] in tests. All values are
/// strings; last write wins; no locking across contexts.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// HashMap-backed store. Shared across simulated contexts in tests by
/// cloning the `Arc` it is held through.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .ok()
            .and_then(|map| map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut map) = self.entries.write() {
            map.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut map) = self.entries.write() {
            map.remove(key);
        }
    }
}

/// Typed view over the persisted token record.
///
/// All session writes go through here; every other component re-derives from
/// a fresh read instead of caching authentication state of its own.
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn SessionStore>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub fn get(&self) -> Option<String> {
        self.store.get(keys::TOKEN)
    }

    /// Persist a token and its absolute expiry, bumping the write marker.
    /// Returns the new marker value.
    pub fn set(&self, token: &str, expiry: DateTime<Utc>) -> u64 {
        self.store.set(keys::TOKEN, token);
        self.store
            .set(keys::EXPIRY, &expiry.timestamp_millis().to_string());
        self.bump_write_seq()
    }

    /// Clear the token record (token, expiry, cached user). The redirect
    /// path survives: it is owned by the login-restoration flow, not by the
    /// session itself. Returns the new write marker value.
    pub fn remove(&self) -> u64 {
        self.store.remove(keys::TOKEN);
        self.store.remove(keys::EXPIRY);
        self.store.remove(keys::USER);
        self.bump_write_seq()
    }

    pub fn user(&self) -> Option<UserRecord> {
        let raw = self.store.get(keys::USER)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(err) => {
                tracing::warn!("discarding unreadable cached user record: {err}");
                None
            }
        }
    }

    /// Cache the server-confirmed profile so other contexts can adopt it
    /// without a network round trip.
    pub fn set_user(&self, user: &UserRecord) {
        match serde_json::to_string(user) {
            Ok(json) => self.store.set(keys::USER, &json),
            Err(err) => tracing::error!("failed to serialize user record: {err}"),
        }
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        let raw = self.store.get(keys::EXPIRY)?;
        let millis: i64 = raw.parse().ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }

    pub fn write_seq(&self) -> u64 {
        self.store
            .get(keys::WRITE_SEQ)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0)
    }

    /// A token is valid iff it exists and its expiry is in the future.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match (self.get(), self.expiry()) {
            (Some(_), Some(expiry)) => now < expiry,
            _ => false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// True when the token is still valid but will expire within `threshold`.
    pub fn is_expiring_soon(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        match self.expiry() {
            Some(expiry) if self.get().is_some() => now < expiry && expiry - now <= threshold,
            _ => false,
        }
    }

    pub fn redirect_path(&self) -> Option<String> {
        self.store.get(keys::REDIRECT_PATH)
    }

    pub fn set_redirect_path(&self, path: &str) {
        self.store.set(keys::REDIRECT_PATH, path);
    }

    /// Read and clear the stored redirect path.
    pub fn take_redirect_path(&self) -> Option<String> {
        let path = self.redirect_path();
        if path.is_some() {
            self.store.remove(keys::REDIRECT_PATH);
        }
        path
    }

    fn bump_write_seq(&self) -> u64 {
        let next = self.write_seq() + 1;
        self.store.set(keys::WRITE_SEQ, &next.to_string());
        next
    }
}
