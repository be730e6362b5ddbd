//! Turn round and debate scheduling, end to end over the in-memory store
//! and the recording bus.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::common::{settings_with_delay, Scenario};
use social_core::common::{DecisionError, OrchestratorError, StoreError};
use social_core::config::OrchestrationSettings;
use social_core::domains::agents::{Action, Agent, ConversationSnapshot, DecisionPolicy};
use social_core::domains::conversations::actions::{
    handle_user_message, prepare_debate, start_debate, DEFAULT_DEBATE_ROUNDS, MAX_DEBATE_ROUNDS,
};
use social_core::domains::conversations::{NewMessage, SenderKind};
use social_core::kernel::{BaseConversationStore, TestDependencies};

// ============================================================================
// Turn rounds
// ============================================================================

#[tokio::test(start_paused = true)]
async fn user_message_is_answered_by_the_first_three_agents_in_roster_order() {
    let s = Scenario::with_agents(&["Ada", "Brook", "Cy", "Dee"]).await;

    let accepted = handle_user_message(s.conversation.id, "u1", "hello", &s.deps)
        .await
        .unwrap();
    let report = accepted.round.await.unwrap().expect("round ran");

    assert_eq!(report.responders, 3);
    assert_eq!(report.spoken.len(), 3);
    assert_eq!(s.published_senders(), ["u1", "Ada", "Brook", "Cy"]);

    let stored = s.deps.store.conversation_messages(s.conversation.id).await.unwrap();
    assert_eq!(stored.len(), 4);
    assert_eq!(stored[0].sender_kind, SenderKind::User);
    assert!(stored[1..].iter().all(|m| m.sender_kind == SenderKind::Agent));
}

#[tokio::test(start_paused = true)]
async fn every_message_is_committed_before_it_is_published() {
    let s = Scenario::with_agents(&["Ada", "Brook"]).await;

    let accepted = handle_user_message(s.conversation.id, "u1", "hello", &s.deps)
        .await
        .unwrap();
    accepted.round.await.unwrap();

    let stored = s.deps.store.conversation_messages(s.conversation.id).await.unwrap();
    assert_eq!(stored.len(), 3);
    for message in stored {
        let committed = s.test.journal.commit_position(message.id).expect("committed");
        let published = s.test.journal.publish_position(message.id).expect("published");
        assert!(
            committed < published,
            "message {} published before commit",
            message.id
        );
    }
}

#[tokio::test(start_paused = true)]
async fn agent_messages_are_spaced_by_the_response_delay() {
    let s = Scenario::build(
        TestDependencies::new()
            .with_agents(&["Ada", "Brook", "Cy"])
            .with_settings(settings_with_delay(Duration::from_millis(500))),
    )
    .await;

    let accepted = handle_user_message(s.conversation.id, "u1", "hello", &s.deps)
        .await
        .unwrap();
    accepted.round.await.unwrap();

    let agent_times: Vec<_> = s
        .test
        .bus
        .published_of_kind("message.created")
        .into_iter()
        .skip(1)
        .map(|p| p.at)
        .collect();
    assert_eq!(agent_times.len(), 3);
    for pair in agent_times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(500));
    }
}

#[tokio::test(start_paused = true)]
async fn rounds_on_one_conversation_do_not_interleave() {
    let s = Scenario::with_agents(&["Ada", "Brook", "Cy"]).await;

    let first = handle_user_message(s.conversation.id, "u1", "first", &s.deps)
        .await
        .unwrap();
    let second = handle_user_message(s.conversation.id, "u1", "second", &s.deps)
        .await
        .unwrap();
    first.round.await.unwrap();
    second.round.await.unwrap();

    assert_eq!(
        s.published_senders(),
        ["u1", "u1", "Ada", "Brook", "Cy", "Ada", "Brook", "Cy"]
    );
}

#[tokio::test(start_paused = true)]
async fn bus_outage_does_not_stop_the_round() {
    let s = Scenario::with_agents(&["Ada", "Brook"]).await;
    s.test.bus.set_unavailable(true);

    let accepted = handle_user_message(s.conversation.id, "u1", "hello", &s.deps)
        .await
        .unwrap();
    let report = accepted.round.await.unwrap().expect("round ran");

    assert_eq!(report.spoken.len(), 2);
    assert!(s.test.bus.published().is_empty());
    let stored = s.deps.store.conversation_messages(s.conversation.id).await.unwrap();
    assert_eq!(stored.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn failed_agent_insert_is_skipped_and_the_round_continues() {
    let s = Scenario::with_agents(&["Ada", "Brook", "Cy"]).await;
    let brook = s.agent_id("Brook").await;
    s.test.store.fail_inserts_from(&brook.to_string());

    let accepted = handle_user_message(s.conversation.id, "u1", "hello", &s.deps)
        .await
        .unwrap();
    let report = accepted.round.await.unwrap().expect("round ran");

    assert_eq!(report.failed, 1);
    assert_eq!(s.published_senders(), ["u1", "Ada", "Cy"]);
}

/// Only Ada has anything to say; Cy's policy errors out.
struct PickyDecider;

#[async_trait]
impl DecisionPolicy for PickyDecider {
    async fn decide_action(
        &self,
        agent: &Agent,
        _snapshot: &ConversationSnapshot,
    ) -> Result<Option<Action>, DecisionError> {
        match agent.name.as_str() {
            "Ada" => Ok(Some(Action::speak("Ada speaks"))),
            "Cy" => Err(DecisionError("policy offline".to_string())),
            _ => Ok(None),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn quiet_and_failing_agents_are_skipped_without_pacing() {
    let s = Scenario::build(
        TestDependencies::new()
            .with_agents(&["Brook", "Cy", "Ada"])
            .with_decider(Arc::new(PickyDecider)),
    )
    .await;

    let started = tokio::time::Instant::now();
    let accepted = handle_user_message(s.conversation.id, "u1", "hello", &s.deps)
        .await
        .unwrap();
    let report = accepted.round.await.unwrap().expect("round ran");

    assert_eq!(report.abstained, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(s.published_senders(), ["u1", "Ada"]);
    // One pause, after Ada.
    let elapsed = started.elapsed();
    assert!(elapsed >= s.deps.settings.response_delay);
    assert!(elapsed < s.deps.settings.response_delay * 2);
    assert_eq!(s.test.store.insert_attempts().len(), 2);
}

#[tokio::test]
async fn message_to_unknown_conversation_is_rejected() {
    let s = Scenario::with_agents(&["Ada"]).await;

    let result = handle_user_message(
        social_core::common::ConversationId::new(),
        "u1",
        "hello",
        &s.deps,
    )
    .await;

    assert!(matches!(
        result,
        Err(OrchestratorError::Persistence(StoreError::ConversationNotFound(_)))
    ));
    assert!(s.test.bus.published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_a_round_between_turns() {
    let s = Scenario::with_agents(&["Ada", "Brook", "Cy"]).await;

    let accepted = handle_user_message(s.conversation.id, "u1", "hello", &s.deps)
        .await
        .unwrap();
    // First agent has spoken and the round is pacing.
    tokio::time::sleep(Duration::from_millis(100)).await;
    s.deps.supervisor.shutdown().await;

    let report = accepted.round.await.unwrap().expect("round had started");
    assert!(report.cancelled);
    assert_eq!(report.spoken.len(), 1);
    assert_eq!(s.published_senders(), ["u1", "Ada"]);

    let late = handle_user_message(s.conversation.id, "u1", "again", &s.deps)
        .await
        .unwrap();
    assert!(late.round.await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn busy_conversation_does_not_hold_back_an_idle_one() {
    let s = Scenario::build(
        TestDependencies::new()
            .with_agents(&["Ada", "Brook", "Cy"])
            .with_settings(OrchestrationSettings {
                max_background_rounds: 2,
                ..settings_with_delay(Duration::from_millis(500))
            }),
    )
    .await;
    let idle = s.deps.store.create_conversation("idle").await.unwrap();

    let mut busy_rounds = Vec::new();
    for n in 0..4 {
        let content = format!("busy {}", n);
        let accepted = handle_user_message(s.conversation.id, "u1", &content, &s.deps)
            .await
            .unwrap();
        busy_rounds.push(accepted.round);
    }

    let started = tokio::time::Instant::now();
    let accepted = handle_user_message(idle.id, "u2", "anyone there?", &s.deps)
        .await
        .unwrap();
    let report = accepted.round.await.unwrap().expect("round ran");

    // Three agents, three pauses: nothing else in the way.
    assert_eq!(report.spoken.len(), 3);
    assert!(started.elapsed() < Duration::from_secs(2));

    for round in busy_rounds {
        assert!(round.await.unwrap().is_some());
    }
}

// ============================================================================
// Debates
// ============================================================================

#[tokio::test(start_paused = true)]
async fn debate_attempts_every_turn_and_skips_failures() {
    let s = Scenario::with_agents(&["Ada", "Brook", "Cy"]).await;
    let ids = vec![
        s.agent_id("Ada").await.to_string(),
        s.agent_id("Brook").await.to_string(),
        s.agent_id("Cy").await.to_string(),
    ];
    s.test.store.fail_inserts_from(&ids[1]);

    let debate = start_debate(s.conversation.id, &ids, 2, &s.deps).await.unwrap();
    let report = debate.await.unwrap().expect("debate ran");

    assert_eq!(report.attempted, 6);
    assert_eq!(report.failed, 2);
    assert_eq!(report.spoken.len(), 4);
    assert_eq!(s.test.store.insert_attempts().len(), 6);
    assert_eq!(s.published_senders(), ["Ada", "Cy", "Ada", "Cy"]);
}

#[tokio::test(start_paused = true)]
async fn debate_turns_follow_round_then_participant_order() {
    let s = Scenario::with_agents(&["Ada", "Brook"]).await;
    s.deps
        .store
        .insert_message(NewMessage::from_user(s.conversation.id, "u1", "tabs or spaces"))
        .await
        .unwrap();
    // Supplied order wins over roster order.
    let ids = vec![
        s.agent_id("Brook").await.to_string(),
        s.agent_id("Ada").await.to_string(),
    ];

    let debate = start_debate(s.conversation.id, &ids, 2, &s.deps).await.unwrap();
    debate.await.unwrap();

    let contents = s.test.bus.message_contents();
    assert_eq!(contents.len(), 4);
    assert!(contents[0].starts_with("Brook (round 1)"));
    assert!(contents[1].starts_with("Ada (round 1)"));
    assert!(contents[2].starts_with("Brook (round 2)"));
    assert!(contents[3].starts_with("Ada (round 2)"));
    assert!(contents.iter().all(|c| c.contains("\"tabs or spaces\"")));
}

#[tokio::test]
async fn debate_needs_two_known_participants() {
    let s = Scenario::with_agents(&["Ada", "Brook"]).await;
    let ids = vec![
        s.agent_id("Ada").await.to_string(),
        "not-an-id".to_string(),
        social_core::common::AgentId::new().to_string(),
    ];

    let result = start_debate(s.conversation.id, &ids, 3, &s.deps).await;

    assert!(matches!(
        result,
        Err(OrchestratorError::InsufficientParticipants { resolved: 1 })
    ));
    assert!(s.test.store.insert_attempts().is_empty());
    assert_eq!(s.deps.supervisor.active(), 0);
}

#[tokio::test]
async fn debate_on_unknown_conversation_is_rejected() {
    let s = Scenario::with_agents(&["Ada", "Brook"]).await;
    let ids = vec![
        s.agent_id("Ada").await.to_string(),
        s.agent_id("Brook").await.to_string(),
    ];

    let result = start_debate(social_core::common::ConversationId::new(), &ids, 1, &s.deps).await;

    assert!(matches!(
        result,
        Err(OrchestratorError::Persistence(StoreError::ConversationNotFound(_)))
    ));
}

#[tokio::test]
async fn non_positive_rounds_fall_back_to_the_default() {
    let s = Scenario::with_agents(&["Ada", "Brook"]).await;
    let ids = vec![
        s.agent_id("Ada").await.to_string(),
        s.agent_id("Brook").await.to_string(),
    ];

    for rounds in [0, -4] {
        let plan = prepare_debate(s.conversation.id, &ids, rounds, &s.deps)
            .await
            .unwrap();
        assert_eq!(plan.rounds, DEFAULT_DEBATE_ROUNDS);
        assert_eq!(plan.turns(), 6);
    }
}

#[tokio::test]
async fn oversized_round_counts_are_clamped() {
    let s = Scenario::with_agents(&["Ada", "Brook"]).await;
    let ids = vec![
        s.agent_id("Ada").await.to_string(),
        s.agent_id("Brook").await.to_string(),
    ];

    for rounds in [i64::from(MAX_DEBATE_ROUNDS) + 1, i64::from(u32::MAX) + 1, i64::MAX] {
        let plan = prepare_debate(s.conversation.id, &ids, rounds, &s.deps)
            .await
            .unwrap();
        assert_eq!(plan.rounds, MAX_DEBATE_ROUNDS);
    }
    let plan = prepare_debate(s.conversation.id, &ids, 7, &s.deps)
        .await
        .unwrap();
    assert_eq!(plan.rounds, 7);
}

#[tokio::test(start_paused = true)]
async fn repeated_participant_speaks_once_per_mention() {
    let s = Scenario::with_agents(&["Ada"]).await;
    let ada = s.agent_id("Ada").await.to_string();

    let debate = start_debate(s.conversation.id, &[ada.clone(), ada], 1, &s.deps)
        .await
        .unwrap();
    let report = debate.await.unwrap().expect("debate ran");

    assert_eq!(report.attempted, 2);
    assert_eq!(s.published_senders(), ["Ada", "Ada"]);
}

#[tokio::test(start_paused = true)]
async fn debate_waits_for_a_running_round_on_the_same_conversation() {
    let s = Scenario::build(
        TestDependencies::new()
            .with_agents(&["Ada", "Brook"])
            .with_settings(OrchestrationSettings {
                max_responders: 1,
                ..OrchestrationSettings::default()
            }),
    )
    .await;
    let ids = vec![
        s.agent_id("Ada").await.to_string(),
        s.agent_id("Brook").await.to_string(),
    ];

    let accepted = handle_user_message(s.conversation.id, "u1", "hello", &s.deps)
        .await
        .unwrap();
    let debate = start_debate(s.conversation.id, &ids, 1, &s.deps).await.unwrap();
    accepted.round.await.unwrap();
    debate.await.unwrap();

    assert_eq!(s.published_senders(), ["u1", "Ada", "Ada", "Brook"]);
    let contents = s.test.bus.message_contents();
    assert_eq!(contents[1], "Ada replies: hello");
}
