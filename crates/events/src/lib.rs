//! `masthead-events` — change-notification channel abstraction.
//!
//! A [`ChangeChannel`] is the mechanism by which concurrently open execution
//! contexts (browser tabs, desktop windows, test harness "tabs") observe each
//! other's writes to shared session state. It is deliberately generic: the
//! web target implements it over the native storage-change notification, a
//! server-hosted multi-client target over a pub/sub broker keyed by session
//! id, and tests over the in-memory broadcast in [`memory`].

pub mod channel;
pub mod memory;

pub use channel::{ChangeChannel, ChannelError, Subscription};
pub use memory::InMemoryChangeChannel;
