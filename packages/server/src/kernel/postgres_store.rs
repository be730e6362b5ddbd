//! PostgreSQL conversation store.
//!
//! Thin adapter from [`BaseConversationStore`] onto the model-level query
//! functions, so SQL stays next to the types it loads.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::common::{ConversationId, StoreError};
use crate::domains::agents::Agent;
use crate::domains::conversations::models::{Conversation, Message, NewMessage};
use crate::kernel::traits::BaseConversationStore;

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseConversationStore for PostgresStore {
    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError> {
        Conversation::create(title, &self.pool).await
    }

    async fn find_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        Conversation::find_by_id(id, &self.pool).await
    }

    async fn list_conversations(&self, limit: i64) -> Result<Vec<Conversation>, StoreError> {
        Conversation::find_recent(limit, &self.pool).await
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        match Message::create(&message, &self.pool).await {
            // messages.conversation_id is a foreign key
            Err(StoreError::Database(sqlx::Error::Database(e))) if e.is_foreign_key_violation() => {
                Err(StoreError::ConversationNotFound(message.conversation_id))
            }
            other => other,
        }
    }

    async fn conversation_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        Message::find_by_conversation(conversation_id, &self.pool).await
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError> {
        Agent::find_all(&self.pool).await
    }

    async fn create_agent(
        &self,
        name: &str,
        persona: &str,
        behavior_profile: serde_json::Value,
    ) -> Result<Agent, StoreError> {
        Agent::create(name, persona, behavior_profile, &self.pool).await
    }
}
