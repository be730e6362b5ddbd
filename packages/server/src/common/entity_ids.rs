//! Typed ids for the entities this service owns or observes.

pub use super::id::Id;

/// Marker type for conversations.
pub struct Conversation;

/// Marker type for persisted messages.
pub struct Message;

/// Marker type for agent personas.
pub struct Agent;

pub type ConversationId = Id<Conversation>;

pub type MessageId = Id<Message>;

pub type AgentId = Id<Agent>;
