// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no scheduling logic.
// The orchestration actions in domains/conversations talk to these traits so
// tests can swap in the in-memory store and the recording bus.
//
// Naming convention: Base* for trait names (e.g., BaseEventBus)

use async_trait::async_trait;

use crate::common::{BusError, ConversationId, StoreError};
use crate::domains::agents::Agent;
use crate::domains::conversations::events::{Event, Topic};
use crate::domains::conversations::models::{Conversation, Message, NewMessage};
use crate::kernel::subscription::Subscription;

// =============================================================================
// Persistence Trait
// =============================================================================

/// Durable storage for conversations, messages and the agent roster.
///
/// Implementations must give read-your-writes consistency: a message
/// returned by `insert_message` is visible to the next
/// `conversation_messages` call from the same process.
#[async_trait]
pub trait BaseConversationStore: Send + Sync {
    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError>;

    async fn find_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Most recent first, at most `limit`.
    async fn list_conversations(&self, limit: i64) -> Result<Vec<Conversation>, StoreError>;

    /// Returns once the write has committed.
    async fn insert_message(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// Oldest first.
    async fn conversation_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, StoreError>;

    /// Roster order.
    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError>;

    async fn create_agent(
        &self,
        name: &str,
        persona: &str,
        behavior_profile: serde_json::Value,
    ) -> Result<Agent, StoreError>;
}

// =============================================================================
// Event Bus Trait
// =============================================================================

/// Topic-keyed publish/subscribe.
///
/// Within a topic, subscribers see events in publish order. Publishing never
/// waits on a slow subscriber: each subscription has a bounded channel and
/// an event that does not fit is dropped for that subscriber only.
#[async_trait]
pub trait BaseEventBus: Send + Sync {
    /// Fails with `BusError::Unavailable` when the backend cannot be reached.
    async fn publish(&self, topic: &Topic, event: Event) -> Result<(), BusError>;

    async fn subscribe(&self, topic: &Topic) -> Result<Subscription, BusError>;
}
