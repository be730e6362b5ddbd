//! A live viewer's binding to one topic.

use tokio::sync::mpsc;

use crate::domains::conversations::events::{Event, Topic};

/// Receiving end of one topic, backed by a bounded channel.
///
/// Closing releases the binding in the bus that created it. Close is
/// idempotent, runs on drop, and never touches other subscriptions on the
/// same topic. Events already buffered can still be drained after close.
pub struct Subscription {
    topic: Topic,
    receiver: mpsc::Receiver<Event>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        topic: Topic,
        receiver: mpsc::Receiver<Event>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            topic,
            receiver,
            release: Some(Box::new(release)),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Next event, or `None` once the bus has closed the channel.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    pub fn close(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
        self.receiver.close();
    }

    pub fn is_closed(&self) -> bool {
        self.release.is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Outcome of offering one event to one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    /// Channel full; the event is lost for this subscriber.
    Dropped,
    /// Subscriber is gone and can be forgotten.
    Closed,
}

/// Non-blocking hand-off into a subscription channel.
pub(crate) fn offer(sender: &mpsc::Sender<Event>, event: Event) -> Delivery {
    match sender.try_send(event) {
        Ok(()) => Delivery::Delivered,
        Err(mpsc::error::TrySendError::Full(_)) => Delivery::Dropped,
        Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ConversationId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn topic() -> Topic {
        Topic::conversation(ConversationId::new())
    }

    #[tokio::test]
    async fn close_runs_release_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let (_tx, rx) = mpsc::channel(4);
        let mut sub = Subscription::new(topic(), rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        sub.close();
        sub.close();
        drop(sub);

        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn buffered_events_drain_after_close() {
        let (tx, rx) = mpsc::channel(4);
        let mut sub = Subscription::new(topic(), rx, || {});
        assert_eq!(offer(&tx, Event::ping()), Delivery::Delivered);

        sub.close();

        assert!(matches!(sub.recv().await, Some(Event::Ping { .. })));
        assert!(sub.recv().await.is_none());
        assert_eq!(offer(&tx, Event::ping()), Delivery::Closed);
    }

    #[test]
    fn full_channel_drops() {
        let (tx, _rx) = mpsc::channel(1);
        assert_eq!(offer(&tx, Event::ping()), Delivery::Delivered);
        assert_eq!(offer(&tx, Event::ping()), Delivery::Dropped);
    }
}
