//! In-memory change channel for tests/dev.

use std::sync::{Mutex, mpsc};

use crate::channel::{ChangeChannel, ChannelError, Subscription};

/// In-memory broadcast channel.
///
/// - No IO / no async
/// - Best-effort fan-out to every live subscription, the publisher's own
///   subscription included (origin filtering is the consumer's job, exactly
///   as with browser storage events arriving in the writing tab's frame)
#[derive(Debug)]
pub struct InMemoryChangeChannel<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryChangeChannel<M> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M> Default for InMemoryChangeChannel<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> ChangeChannel<M> for InMemoryChangeChannel<M>
where
    M: Clone + Send + 'static,
{
    fn publish(&self, message: M) -> Result<(), ChannelError> {
        let mut subs = self
            .subscribers
            .lock()
            .map_err(|_| ChannelError::Poisoned)?;

        // Drop any dead subscribers while publishing.
        subs.retain(|tx| tx.send(message.clone()).is_ok());

        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        // If the lock is poisoned we still return a subscription; it just
        // won't receive messages until the process restarts.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_every_message() {
        let channel = InMemoryChangeChannel::new();
        let a = channel.subscribe();
        let b = channel.subscribe();

        channel.publish(1u32).unwrap();
        channel.publish(2u32).unwrap();

        assert_eq!(a.try_recv(), Ok(1));
        assert_eq!(a.try_recv(), Ok(2));
        assert_eq!(b.try_recv(), Ok(1));
        assert_eq!(b.try_recv(), Ok(2));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let channel = InMemoryChangeChannel::new();
        let keep = channel.subscribe();
        drop(channel.subscribe());

        channel.publish("x").unwrap();
        assert_eq!(keep.try_recv(), Ok("x"));
    }
}
