//! Publish/subscribe contract for cross-context change notifications.
//!
//! The channel makes minimal assumptions on purpose:
//!
//! - **Transport-agnostic**: in-memory channels, browser storage events, a
//!   broker — anything that can fan a message out to same-session peers.
//! - **At-least-once**: a message may be observed more than once; consumers
//!   must be idempotent.
//! - **No persistence**: the persisted session store is the source of truth;
//!   the channel only tells peers that it changed.
//!
//! Delivery to the publishing context itself is implementation-defined, which
//! is why every message carries an origin tag the consumer filters on.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Publish failed due to internal lock poisoning.
    #[error("change channel is poisoned")]
    Poisoned,
}

/// A subscription to a change stream.
///
/// Each subscription gets a copy of every message published to the channel
/// (broadcast semantics). Subscriptions are designed for single-threaded
/// consumption: one context, one subscription, drained cooperatively.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Change-notification channel (pub/sub abstraction).
///
/// The error type is fixed rather than associated so the channel stays
/// object-safe behind `Arc<dyn ChangeChannel<M>>`; consumers are wired by
/// injection, not by generics.
pub trait ChangeChannel<M>: Send + Sync {
    fn publish(&self, message: M) -> Result<(), ChannelError>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, C> ChangeChannel<M> for Arc<C>
where
    C: ChangeChannel<M> + ?Sized,
{
    fn publish(&self, message: M) -> Result<(), ChannelError> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
