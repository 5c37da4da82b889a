//! Event fan-out bus.
//!
//! The [`EventBus`] delivers serialized event notifications to an arbitrary
//! number of subscribers over bounded mpsc channels. Delivery is best-effort:
//! a subscriber whose channel is full loses that notification without
//! affecting the others, and subscribers that dropped their receiver are
//! pruned on the next publish.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use watchpost_core::metrics as m;

/// Fan-out bus for serialized event notifications.
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::Sender<String>>>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus whose subscriber channels hold `capacity` notifications.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Register a new subscriber and return its receiving end.
    ///
    /// Subscribers receive notifications published after this call;
    /// there is no replay of earlier events.
    pub fn subscribe(&self) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.lock().push(tx);
        rx
    }

    /// Deliver `payload` to every live subscriber in registration order.
    ///
    /// Returns the number of subscribers that received the notification.
    /// Full channels drop the notification for that subscriber only;
    /// closed channels are removed from the subscriber list.
    pub fn publish(&self, payload: &str) -> usize {
        let mut subscribers = self.lock();
        let mut delivered = 0usize;
        let mut dropped = 0usize;

        subscribers.retain(|tx| match tx.try_send(payload.to_owned()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });

        if delivered > 0 {
            metrics::counter!(m::BUS_PUBLISHED_TOTAL).increment(delivered as u64);
        }
        if dropped > 0 {
            tracing::debug!(dropped, "subscriber channels full, notifications dropped");
            metrics::counter!(m::BUS_DROPPED_TOTAL).increment(dropped as u64);
        }

        delivered
    }

    /// Current number of registered subscribers (live or not yet pruned).
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<mpsc::Sender<String>>> {
        // A poisoned lock still holds a usable subscriber list.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_all_subscribers_in_order() {
        let bus = EventBus::new(8);
        let mut rx_a = bus.subscribe();
        let mut rx_b = bus.subscribe();

        let delivered = bus.publish("first");
        assert_eq!(delivered, 2);

        assert_eq!(rx_a.recv().await.as_deref(), Some("first"));
        assert_eq!(rx_b.recv().await.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new(8);
        assert_eq!(bus.publish("nobody home"), 0);
    }

    #[tokio::test]
    async fn full_subscriber_does_not_block_others() {
        let bus = EventBus::new(1);
        let _rx_slow = bus.subscribe(); // never drained
        let mut rx_fast = bus.subscribe();

        assert_eq!(bus.publish("one"), 2);
        // slow subscriber's channel is now full
        assert_eq!(bus.publish("two"), 1);

        assert_eq!(rx_fast.recv().await.as_deref(), Some("one"));
        assert_eq!(rx_fast.recv().await.as_deref(), Some("two"));
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn closed_subscribers_are_pruned_on_publish() {
        let bus = EventBus::new(8);
        let rx_gone = bus.subscribe();
        let mut rx_live = bus.subscribe();
        drop(rx_gone);

        assert_eq!(bus.publish("still here"), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(rx_live.recv().await.as_deref(), Some("still here"));
    }
}
