//! Conversation events.
//!
//! Events are what live viewers see. They exist only on the bus and on the
//! wire; the persisted [`Message`] is the durable record. Every variant
//! carries the fields its kind requires, and [`Event::validate`] is run at
//! the bus boundary so half-built events never reach a subscriber.
//!
//! Wire format (JSON, `event` tag):
//!
//! ```text
//! {"event":"message.created","message_id":"…","sender_kind":"agent","sender_id":"…","sender":"Ada","content":"…"}
//! {"event":"history","message_id":"…","sender_kind":"user","sender_id":"u1","content":"…","created_at":"…"}
//! {"event":"ping","ts":"…"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{BusError, ConversationId, MessageId};
use crate::domains::conversations::models::{Message, SenderKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum Event {
    #[serde(rename = "conversation.created")]
    ConversationCreated { id: ConversationId, title: String },

    /// A message was persisted. Published only after the write commits.
    #[serde(rename = "message.created")]
    MessageCreated {
        message_id: MessageId,
        sender_kind: SenderKind,
        sender_id: String,
        /// Display name: the user id for users, the agent's name for agents.
        sender: String,
        content: String,
    },

    /// Replayed message, sent to a viewer before any live event.
    #[serde(rename = "history")]
    History {
        message_id: MessageId,
        sender_kind: SenderKind,
        sender_id: String,
        content: String,
        created_at: DateTime<Utc>,
    },

    /// Liveness signal, independent of bus traffic.
    #[serde(rename = "ping")]
    Ping { ts: DateTime<Utc> },
}

impl Event {
    pub fn message_created(message: &Message, sender: impl Into<String>) -> Self {
        Event::MessageCreated {
            message_id: message.id,
            sender_kind: message.sender_kind,
            sender_id: message.sender_id.clone(),
            sender: sender.into(),
            content: message.content.clone(),
        }
    }

    pub fn history(message: &Message) -> Self {
        Event::History {
            message_id: message.id,
            sender_kind: message.sender_kind,
            sender_id: message.sender_id.clone(),
            content: message.content.clone(),
            created_at: message.created_at,
        }
    }

    pub fn ping() -> Self {
        Event::Ping { ts: Utc::now() }
    }

    /// The wire tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ConversationCreated { .. } => "conversation.created",
            Event::MessageCreated { .. } => "message.created",
            Event::History { .. } => "history",
            Event::Ping { .. } => "ping",
        }
    }

    /// Checks per-kind required fields.
    pub fn validate(&self) -> Result<(), BusError> {
        let missing = match self {
            Event::ConversationCreated { title, .. } if title.trim().is_empty() => Some("title"),
            Event::MessageCreated { sender_id, .. } if sender_id.is_empty() => Some("sender_id"),
            Event::MessageCreated { sender, .. } if sender.is_empty() => Some("sender"),
            Event::History { sender_id, .. } if sender_id.is_empty() => Some("sender_id"),
            _ => None,
        };

        match missing {
            Some(field) => Err(BusError::InvalidEvent(format!(
                "{} event is missing {}",
                self.kind(),
                field
            ))),
            None => Ok(()),
        }
    }
}

/// Routing key for one conversation's event stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(String);

impl Topic {
    pub fn conversation(id: ConversationId) -> Self {
        Topic(format!("conversation:{}", id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
