//! In-process pub/sub hub for conversation events.
//!
//! Topic-keyed fan-out used when no external broker is configured. Each
//! subscription owns a bounded channel; `publish` offers the event to every
//! channel with `try_send` and moves on, so one stalled viewer can never hold
//! up the scheduler that produced the event.
//!
//! # Usage
//!
//! Producers (orchestration actions):
//!   hub.publish(&Topic::conversation(id), Event::message_created(&msg, "Ada")).await?;
//!
//! Consumers (live bridge):
//!   let mut sub = hub.subscribe(&Topic::conversation(id)).await?;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::common::BusError;
use crate::domains::conversations::events::{Event, Topic};
use crate::kernel::subscription::{offer, Delivery, Subscription};
use crate::kernel::traits::BaseEventBus;

/// Default per-subscription buffer.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 256;

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<Event>,
}

type Channels = Arc<RwLock<HashMap<Topic, Vec<Subscriber>>>>;

/// Thread-safe, cloneable. Clones share the same topics.
#[derive(Clone)]
pub struct StreamHub {
    channels: Channels,
    capacity: usize,
    next_id: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl StreamHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIPTION_CAPACITY)
    }

    /// `capacity` is the per-subscription buffer, clamped to at least 1.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
            next_id: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
            .map_or(0, Vec::len)
    }

    pub fn topic_count(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Events lost to full subscriber channels since startup.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn fan_out(&self, topic: &Topic, event: Event) {
        let mut closed = Vec::new();
        {
            let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
            let Some(subscribers) = channels.get(topic) else {
                return;
            };
            for subscriber in subscribers {
                match offer(&subscriber.sender, event.clone()) {
                    Delivery::Delivered => {}
                    Delivery::Dropped => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        debug!(topic = %topic, subscriber = subscriber.id, kind = event.kind(), "subscriber full, event dropped");
                    }
                    Delivery::Closed => closed.push(subscriber.id),
                }
            }
        }

        if !closed.is_empty() {
            for id in closed {
                remove_subscriber(&self.channels, topic, id);
            }
        }
    }
}

fn remove_subscriber(channels: &Channels, topic: &Topic, id: u64) {
    let mut channels = channels.write().unwrap_or_else(|e| e.into_inner());
    if let Some(subscribers) = channels.get_mut(topic) {
        subscribers.retain(|s| s.id != id);
        if subscribers.is_empty() {
            channels.remove(topic);
        }
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StreamHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHub")
            .field("topics", &self.topic_count())
            .field("capacity", &self.capacity)
            .field("dropped", &self.dropped_count())
            .finish()
    }
}

#[async_trait]
impl BaseEventBus for StreamHub {
    async fn publish(&self, topic: &Topic, event: Event) -> Result<(), BusError> {
        event.validate()?;
        self.fan_out(topic, event);
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic) -> Result<Subscription, BusError> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.channels
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(topic.clone())
            .or_default()
            .push(Subscriber { id, sender });

        let channels = Arc::downgrade(&self.channels);
        let release_topic = topic.clone();
        Ok(Subscription::new(topic.clone(), receiver, move || {
            if let Some(channels) = channels.upgrade() {
                remove_subscriber(&channels, &release_topic, id);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ConversationId;

    fn topic() -> Topic {
        Topic::conversation(ConversationId::new())
    }

    fn created(title: &str) -> Event {
        Event::ConversationCreated {
            id: ConversationId::new(),
            title: title.to_string(),
        }
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber_in_order() {
        let hub = StreamHub::new();
        let topic = topic();
        let mut first = hub.subscribe(&topic).await.unwrap();
        let mut second = hub.subscribe(&topic).await.unwrap();

        hub.publish(&topic, created("a")).await.unwrap();
        hub.publish(&topic, created("b")).await.unwrap();

        for sub in [&mut first, &mut second] {
            assert!(matches!(sub.recv().await, Some(Event::ConversationCreated { title, .. }) if title == "a"));
            assert!(matches!(sub.recv().await, Some(Event::ConversationCreated { title, .. }) if title == "b"));
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let hub = StreamHub::new();
        hub.publish(&topic(), Event::ping()).await.unwrap();
        assert_eq!(hub.topic_count(), 0);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let hub = StreamHub::new();
        let (a, b) = (topic(), topic());
        let mut sub_a = hub.subscribe(&a).await.unwrap();

        hub.publish(&b, Event::ping()).await.unwrap();
        hub.publish(&a, created("mine")).await.unwrap();

        assert!(matches!(sub_a.recv().await, Some(Event::ConversationCreated { .. })));
    }

    #[tokio::test]
    async fn full_subscriber_drops_newer_events_without_blocking() {
        let hub = StreamHub::with_capacity(2);
        let topic = topic();
        let mut slow = hub.subscribe(&topic).await.unwrap();

        for i in 0..10 {
            hub.publish(&topic, created(&i.to_string())).await.unwrap();
        }

        assert_eq!(hub.dropped_count(), 8);
        assert!(matches!(slow.recv().await, Some(Event::ConversationCreated { title, .. }) if title == "0"));
        assert!(matches!(slow.recv().await, Some(Event::ConversationCreated { title, .. }) if title == "1"));
    }

    #[tokio::test]
    async fn closing_one_subscription_leaves_others() {
        let hub = StreamHub::new();
        let topic = topic();
        let mut leaving = hub.subscribe(&topic).await.unwrap();
        let mut staying = hub.subscribe(&topic).await.unwrap();

        leaving.close();
        leaving.close();
        assert_eq!(hub.subscriber_count(&topic), 1);

        hub.publish(&topic, Event::ping()).await.unwrap();
        assert!(matches!(staying.recv().await, Some(Event::Ping { .. })));
    }

    #[tokio::test]
    async fn dropping_last_subscription_removes_topic() {
        let hub = StreamHub::new();
        let topic = topic();
        let sub = hub.subscribe(&topic).await.unwrap();
        assert_eq!(hub.topic_count(), 1);

        drop(sub);

        assert_eq!(hub.topic_count(), 0);
    }

    #[tokio::test]
    async fn invalid_event_is_rejected() {
        let hub = StreamHub::new();
        let result = hub.publish(&topic(), created("  ")).await;
        assert!(matches!(result, Err(BusError::InvalidEvent(_))));
    }
}
