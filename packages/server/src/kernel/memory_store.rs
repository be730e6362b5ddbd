//! In-memory conversation store.
//!
//! Backs the server when no `DATABASE_URL` is configured and every test that
//! does not need Postgres. State belongs to the instance, so two stores
//! never see each other's data.
//!
//! Failures can be injected per insert (by content or by sender) or for the
//! whole store, which is how the scheduler's skip-and-continue paths are
//! exercised.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use crate::common::{ConversationId, MessageId, StoreError};
use crate::domains::agents::Agent;
use crate::domains::conversations::models::{Conversation, Message, NewMessage};
use crate::kernel::traits::BaseConversationStore;

type CommitHook = Box<dyn Fn(&Message) + Send + Sync>;

#[derive(Default)]
struct State {
    conversations: Vec<Conversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
    agents: Vec<Agent>,
}

#[derive(Default)]
struct FailurePlan {
    unavailable: bool,
    reject_content: Vec<String>,
    reject_senders: Vec<String>,
}

impl FailurePlan {
    fn rejects(&self, message: &NewMessage) -> bool {
        self.reject_content
            .iter()
            .any(|needle| message.content.contains(needle.as_str()))
            || self.reject_senders.iter().any(|s| *s == message.sender_id)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    failures: RwLock<FailurePlan>,
    attempts: Mutex<Vec<NewMessage>>,
    commit_hook: Option<CommitHook>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `hook` after every committed message insert.
    pub fn on_commit(mut self, hook: impl Fn(&Message) + Send + Sync + 'static) -> Self {
        self.commit_hook = Some(Box::new(hook));
        self
    }

    /// Adds an already-built agent to the end of the roster.
    pub fn add_agent(&self, agent: Agent) {
        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .agents
            .push(agent);
    }

    /// Every subsequent call fails with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.failures
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .unavailable = unavailable;
    }

    /// Rejects inserts whose content contains `needle`.
    pub fn fail_inserts_containing(&self, needle: &str) {
        self.failures
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .reject_content
            .push(needle.to_string());
    }

    /// Rejects inserts authored by `sender_id`.
    pub fn fail_inserts_from(&self, sender_id: &str) {
        self.failures
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .reject_senders
            .push(sender_id.to_string());
    }

    /// Every insert ever attempted, including rejected ones, in call order.
    pub fn insert_attempts(&self) -> Vec<NewMessage> {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self
            .failures
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .unavailable
        {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BaseConversationStore for InMemoryStore {
    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError> {
        self.check_available()?;

        let conversation = Conversation {
            id: ConversationId::new(),
            title: title.to_string(),
            created_at: Utc::now(),
        };
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.conversations.push(conversation.clone());
        state.messages.insert(conversation.id, Vec::new());
        Ok(conversation)
    }

    async fn find_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        self.check_available()?;

        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn list_conversations(&self, limit: i64) -> Result<Vec<Conversation>, StoreError> {
        self.check_available()?;

        let limit = usize::try_from(limit).unwrap_or(0);
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .conversations
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.clone());
        self.check_available()?;

        if self
            .failures
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .rejects(&message)
        {
            return Err(StoreError::Unavailable("insert rejected".to_string()));
        }

        let stored = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            let log = state
                .messages
                .get_mut(&message.conversation_id)
                .ok_or(StoreError::ConversationNotFound(message.conversation_id))?;

            // Creation order is log order; keep timestamps from going backwards.
            let now = Utc::now();
            let created_at = log.last().map_or(now, |last| last.created_at.max(now));

            let stored = Message {
                id: MessageId::new(),
                conversation_id: message.conversation_id,
                sender_kind: message.sender_kind,
                sender_id: message.sender_id,
                content: message.content,
                created_at,
            };
            log.push(stored.clone());
            stored
        };

        if let Some(hook) = &self.commit_hook {
            hook(&stored);
        }
        Ok(stored)
    }

    async fn conversation_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        self.check_available()?;

        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError> {
        self.check_available()?;

        Ok(self
            .state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .agents
            .clone())
    }

    async fn create_agent(
        &self,
        name: &str,
        persona: &str,
        behavior_profile: serde_json::Value,
    ) -> Result<Agent, StoreError> {
        self.check_available()?;

        let agent = Agent::new(name, persona).with_behavior_profile(behavior_profile);
        self.add_agent(agent.clone());
        Ok(agent)
    }
}
