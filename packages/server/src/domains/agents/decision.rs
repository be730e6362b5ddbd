//! Decision policy: given a conversation snapshot, what does an agent do?
//!
//! The orchestrator only cares about *whether* an agent acts and what text it
//! produces. How that text is generated belongs to the policy, so the
//! scheduler talks to a [`DecisionPolicy`] trait object. [`SimpleDecider`]
//! is the placeholder policy the service ships with.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::{ConversationId, DecisionError};
use crate::domains::agents::models::Agent;

/// Ephemeral view of a conversation handed to a policy.
///
/// Rebuilt for every scheduling step; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSnapshot {
    pub conversation_id: ConversationId,
    pub messages: Vec<String>,
}

impl ConversationSnapshot {
    pub fn new(conversation_id: ConversationId, messages: Vec<String>) -> Self {
        Self {
            conversation_id,
            messages,
        }
    }

    pub fn last_message(&self) -> Option<&str> {
        self.messages.last().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Speak,
    Ask,
    Challenge,
}

/// What an agent decided to do this turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub kind: ActionKind,
    pub payload: String,
}

impl Action {
    pub fn speak(payload: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Speak,
            payload: payload.into(),
        }
    }
}

#[async_trait]
pub trait DecisionPolicy: Send + Sync {
    /// `Ok(None)` means the agent stays quiet this turn.
    async fn decide_action(
        &self,
        agent: &Agent,
        snapshot: &ConversationSnapshot,
    ) -> Result<Option<Action>, DecisionError>;
}

/// Replies to the most recent message, or introduces itself in an empty
/// conversation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleDecider;

#[async_trait]
impl DecisionPolicy for SimpleDecider {
    async fn decide_action(
        &self,
        agent: &Agent,
        snapshot: &ConversationSnapshot,
    ) -> Result<Option<Action>, DecisionError> {
        if agent.name.trim().is_empty() {
            return Err(DecisionError("agent has no name".to_string()));
        }

        let payload = match snapshot.last_message() {
            Some(last) => format!("{} replies: {}", agent.name, last),
            None => format!("{} here, happy to talk about {}", agent.name, agent.persona),
        };
        Ok(Some(Action::speak(payload)))
    }
}
