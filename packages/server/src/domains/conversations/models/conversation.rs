use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::{ConversationId, MessageId, StoreError};

/// Conversation - an ordered log of messages between a user and agents.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Message - immutable once persisted. Ordering is creation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_kind: SenderKind,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SenderKind {
    User,
    Agent,
}

impl SenderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderKind::User => "user",
            SenderKind::Agent => "agent",
        }
    }
}

impl std::fmt::Display for SenderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SenderKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(SenderKind::User),
            "agent" => Ok(SenderKind::Agent),
            other => Err(StoreError::InvalidRow(format!(
                "unknown sender kind: {}",
                other
            ))),
        }
    }
}

/// Message as the scheduler hands it to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender_kind: SenderKind,
    pub sender_id: String,
    pub content: String,
}

impl NewMessage {
    pub fn from_user(
        conversation_id: ConversationId,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id,
            sender_kind: SenderKind::User,
            sender_id: user_id.into(),
            content: content.into(),
        }
    }

    pub fn from_agent(
        conversation_id: ConversationId,
        agent_id: impl ToString,
        content: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id,
            sender_kind: SenderKind::Agent,
            sender_id: agent_id.to_string(),
            content: content.into(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: MessageId,
    conversation_id: ConversationId,
    sender_kind: String,
    sender_id: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_kind: row.sender_kind.parse()?,
            sender_id: row.sender_id,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// Conversation Queries
// =============================================================================

impl Conversation {
    pub async fn create(title: &str, pool: &PgPool) -> Result<Self, StoreError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (id, title)
            VALUES ($1, $2)
            RETURNING id, title, created_at
            "#,
        )
        .bind(ConversationId::new())
        .bind(title)
        .fetch_one(pool)
        .await?;
        Ok(conversation)
    }

    pub async fn find_by_id(
        id: ConversationId,
        pool: &PgPool,
    ) -> Result<Option<Self>, StoreError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT id, title, created_at FROM conversations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(conversation)
    }

    /// Most recent conversations first.
    pub async fn find_recent(limit: i64, pool: &PgPool) -> Result<Vec<Self>, StoreError> {
        let conversations = sqlx::query_as::<_, Conversation>(
            "SELECT id, title, created_at FROM conversations ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(conversations)
    }
}

// =============================================================================
// Message Queries
// =============================================================================

impl Message {
    pub async fn create(new: &NewMessage, pool: &PgPool) -> Result<Self, StoreError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO messages (id, conversation_id, sender_kind, sender_id, content)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, conversation_id, sender_kind, sender_id, content, created_at
            "#,
        )
        .bind(MessageId::new())
        .bind(new.conversation_id)
        .bind(new.sender_kind.as_str())
        .bind(&new.sender_id)
        .bind(&new.content)
        .fetch_one(pool)
        .await?;
        row.try_into()
    }

    /// All messages in a conversation, oldest first.
    ///
    /// Ids are v7 so they break ties between rows written in the same
    /// clock tick.
    pub async fn find_by_conversation(
        conversation_id: ConversationId,
        pool: &PgPool,
    ) -> Result<Vec<Self>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, sender_kind, sender_id, content, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(pool)
        .await?;
        rows.into_iter().map(Message::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_kind_parses_its_own_display() {
        for kind in [SenderKind::User, SenderKind::Agent] {
            assert_eq!(kind.to_string().parse::<SenderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_sender_kind_is_an_invalid_row() {
        let err = "assistant".parse::<SenderKind>().unwrap_err();
        assert!(matches!(err, StoreError::InvalidRow(_)));
    }

    #[test]
    fn agent_messages_record_the_agent_id() {
        let conversation_id = ConversationId::new();
        let agent_id = crate::common::AgentId::new();
        let new = NewMessage::from_agent(conversation_id, agent_id, "hi");
        assert_eq!(new.sender_kind, SenderKind::Agent);
        assert_eq!(new.sender_id, agent_id.to_string());
    }
}
