//! Entry-point actions called from the HTTP routes.
//!
//! Each one does its direct write synchronously and returns; anything that
//! follows (broadcast, agent replies) is best effort and never fails the
//! caller once the write has committed.

use tokio::task::JoinHandle;
use tracing::info;

use super::turn_round::{conversation_gate, play_turn_round, publish_message, RoundReport};
use crate::common::{BestEffort, ConversationId, OrchestratorError};
use crate::domains::conversations::events::{Event, Topic};
use crate::domains::conversations::models::{Conversation, Message, NewMessage};
use crate::kernel::ServerDeps;

/// Sender id used when a caller does not identify the user.
pub const DEFAULT_USER_ID: &str = "user-mvp";

/// Default title for conversations created without one.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New conversation";

// ============================================================================
// Action: Create Conversation
// ============================================================================

/// Creates a conversation and announces it on its topic.
pub async fn create_conversation(
    title: &str,
    deps: &ServerDeps,
) -> Result<Conversation, OrchestratorError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(OrchestratorError::EmptyTitle);
    }

    let conversation = deps.store.create_conversation(title).await?;
    info!(conversation_id = %conversation.id, "conversation created");

    deps.bus
        .publish(
            &Topic::conversation(conversation.id),
            Event::ConversationCreated {
                id: conversation.id,
                title: conversation.title.clone(),
            },
        )
        .await
        .best_effort("publish.conversation_created");

    Ok(conversation)
}

// ============================================================================
// Action: Handle User Message
// ============================================================================

/// A user message that was accepted.
#[derive(Debug)]
pub struct AcceptedMessage {
    pub message: Message,
    /// The turn round it triggered. Resolves to `None` if the server shut
    /// down before the round started.
    pub round: JoinHandle<Option<RoundReport>>,
}

/// Persists a user message, broadcasts it and schedules a turn round.
///
/// Returns as soon as the message is committed; agent replies follow in
/// the background.
pub async fn handle_user_message(
    conversation_id: ConversationId,
    user_id: &str,
    content: &str,
    deps: &ServerDeps,
) -> Result<AcceptedMessage, OrchestratorError> {
    if content.trim().is_empty() {
        return Err(OrchestratorError::EmptyMessage);
    }
    let user_id = match user_id.trim() {
        "" => DEFAULT_USER_ID,
        id => id,
    };

    let message = deps
        .store
        .insert_message(NewMessage::from_user(conversation_id, user_id, content))
        .await?;
    info!(conversation_id = %conversation_id, message_id = %message.id, "user message stored");

    publish_message(&Topic::conversation(conversation_id), &message, user_id, deps).await;

    let round_deps = deps.clone();
    let gate = conversation_gate(conversation_id, deps);
    let round = deps
        .supervisor
        .spawn_gated("turn_round", gate, move |guard, cancel| async move {
            let report = play_turn_round(conversation_id, cancel, &round_deps).await;
            drop(guard);
            round_deps.locks.prune();
            report
        });

    Ok(AcceptedMessage { message, round })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::TestDependencies;

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let deps = TestDependencies::new().into_server_deps();
        let result = create_conversation("   ", &deps).await;
        assert!(matches!(result, Err(OrchestratorError::EmptyTitle)));
    }

    #[tokio::test]
    async fn created_conversation_is_announced() {
        let test = TestDependencies::new();
        let deps = test.server_deps();

        let conversation = create_conversation("Tea", &deps).await.unwrap();

        let created = test.bus.published_of_kind("conversation.created");
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].topic, Topic::conversation(conversation.id));
    }

    #[tokio::test]
    async fn blank_message_is_rejected_without_writing() {
        let test = TestDependencies::new();
        let deps = test.server_deps();
        let conversation = create_conversation("Tea", &deps).await.unwrap();

        let result = handle_user_message(conversation.id, "u1", " \n", &deps).await;

        assert!(matches!(result, Err(OrchestratorError::EmptyMessage)));
        assert!(test.store.insert_attempts().is_empty());
    }

    #[tokio::test]
    async fn missing_user_id_falls_back_to_default() {
        let test = TestDependencies::new();
        let deps = test.server_deps();
        let conversation = create_conversation("Tea", &deps).await.unwrap();

        let accepted = handle_user_message(conversation.id, "", "hi", &deps)
            .await
            .unwrap();

        assert_eq!(accepted.message.sender_id, DEFAULT_USER_ID);
    }

    #[tokio::test]
    async fn store_outage_fails_the_caller() {
        let test = TestDependencies::new();
        let deps = test.server_deps();
        let conversation = create_conversation("Tea", &deps).await.unwrap();
        test.store.set_unavailable(true);

        let result = handle_user_message(conversation.id, "u1", "hi", &deps).await;

        assert!(matches!(result, Err(OrchestratorError::Persistence(_))));
        assert!(test.bus.message_contents().is_empty());
    }
}
