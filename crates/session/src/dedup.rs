//! Collapsing of concurrent identical in-flight requests.
//!
//! Several UI surfaces can independently decide "I should check the token"
//! within the same tick; only one network call should result. The first
//! caller for a key becomes the producer, later callers subscribe to its
//! outcome. Entries leave the in-flight set the moment the producer
//! completes (success *or* failure) so the next call starts fresh instead
//! of receiving a stale pending result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;

use crate::error::SessionError;

type Outcome<T> = Result<T, SessionError>;

pub struct RequestDeduplicator<T> {
    in_flight: Mutex<HashMap<String, broadcast::Sender<Outcome<T>>>>,
}

impl<T> Default for RequestDeduplicator<T> {
    fn default() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `producer` for `key`, unless a call for the same key is already in
    /// flight; then await that call's outcome instead.
    pub async fn dedup<F, Fut>(&self, key: &str, producer: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        let waiting = {
            let mut in_flight = self.lock();
            match in_flight.get(key) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(4);
                    in_flight.insert(key.to_string(), tx);
                    None
                }
            }
        };

        if let Some(mut rx) = waiting {
            return match rx.recv().await {
                Ok(outcome) => outcome,
                // The producer was dropped before resolving (caller
                // cancelled). Surface a transient failure; the next call
                // will re-trigger a fresh attempt.
                Err(_) => Err(SessionError::Network(
                    "deduplicated request was abandoned".into(),
                )),
            };
        }

        let guard = InFlightGuard {
            dedup: self,
            key,
            armed: true,
        };
        let outcome = producer().await;
        if let Some(tx) = guard.finish() {
            let _ = tx.send(outcome.clone());
        }
        outcome
    }

    /// Number of keys currently in flight (diagnostics/tests).
    pub fn in_flight_len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, broadcast::Sender<Outcome<T>>>> {
        // Short critical sections only; a poisoned map is still usable.
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes the in-flight entry even if the producer future is dropped
/// mid-flight, so waiters error out instead of hanging forever.
struct InFlightGuard<'a, T> {
    dedup: &'a RequestDeduplicator<T>,
    key: &'a str,
    armed: bool,
}

impl<'a, T> InFlightGuard<'a, T> {
    fn finish(mut self) -> Option<broadcast::Sender<Outcome<T>>> {
        self.armed = false;
        self.remove()
    }

    fn remove(&self) -> Option<broadcast::Sender<Outcome<T>>> {
        self.dedup
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.key)
    }
}

impl<'a, T> Drop for InFlightGuard<'a, T> {
    fn drop(&mut self) {
        if self.armed {
            self.remove();
        }
    }
}
