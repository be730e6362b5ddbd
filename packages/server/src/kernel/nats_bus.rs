//! NATS-backed event bus.
//!
//! Lets several server processes share one event stream per conversation.
//! Topics map onto subjects by swapping `:` for `.`, so
//! `conversation:{id}` becomes `conversation.{id}`.
//!
//! Each subscription runs a forwarder task that decodes payloads into
//! [`Event`]s and feeds the subscription's bounded channel with the same
//! drop-when-full policy as [`StreamHub`](super::StreamHub). Closing the
//! subscription cancels the forwarder, which then unsubscribes from NATS.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::common::BusError;
use crate::domains::conversations::events::{Event, Topic};
use crate::kernel::subscription::{offer, Delivery, Subscription};
use crate::kernel::traits::BaseEventBus;

pub struct NatsEventBus {
    client: async_nats::Client,
    capacity: usize,
}

impl NatsEventBus {
    /// `capacity` is the per-subscription buffer, clamped to at least 1.
    pub fn with_capacity(client: async_nats::Client, capacity: usize) -> Self {
        Self {
            client,
            capacity: capacity.max(1),
        }
    }

    /// Connects to `url` and wraps the client.
    pub async fn connect(url: &str, capacity: usize) -> Result<Self, BusError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))?;
        Ok(Self::with_capacity(client, capacity))
    }
}

pub(crate) fn subject_for(topic: &Topic) -> String {
    topic.as_str().replace(':', ".")
}

/// Decodes one NATS payload. Invalid payloads are rejected the same way
/// publishing rejects them.
pub(crate) fn decode_event(payload: &[u8]) -> Result<Event, BusError> {
    let event: Event = serde_json::from_slice(payload)
        .map_err(|e| BusError::InvalidEvent(e.to_string()))?;
    event.validate()?;
    Ok(event)
}

#[async_trait]
impl BaseEventBus for NatsEventBus {
    async fn publish(&self, topic: &Topic, event: Event) -> Result<(), BusError> {
        event.validate()?;
        let payload = serde_json::to_vec(&event)?;

        self.client
            .publish(subject_for(topic), Bytes::from(payload))
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))
    }

    async fn subscribe(&self, topic: &Topic) -> Result<Subscription, BusError> {
        let subject = subject_for(topic);
        let mut subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))?;

        let (sender, receiver) = mpsc::channel(self.capacity);
        let cancel = CancellationToken::new();
        let forwarder_cancel = cancel.clone();

        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = forwarder_cancel.cancelled() => break,
                    message = subscriber.next() => message,
                };

                let Some(message) = message else {
                    debug!(subject = %subject, "nats subscription ended");
                    break;
                };

                let event = match decode_event(&message.payload) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(subject = %subject, error = %e, "skipping undecodable event");
                        continue;
                    }
                };

                match offer(&sender, event) {
                    Delivery::Delivered => {}
                    Delivery::Dropped => {
                        debug!(subject = %subject, "subscriber full, event dropped")
                    }
                    Delivery::Closed => break,
                }
            }

            if let Err(e) = subscriber.unsubscribe().await {
                debug!(subject = %subject, error = %e, "nats unsubscribe failed");
            }
        });

        Ok(Subscription::new(topic.clone(), receiver, move || {
            cancel.cancel()
        }))
    }
}
