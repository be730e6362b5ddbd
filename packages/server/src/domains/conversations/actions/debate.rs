//! Debate - fixed rounds over an explicit participant list.
//!
//! Unlike a turn round, nobody decides whether to speak: every participant
//! speaks once per round, in the order the caller gave, and the line comes
//! from a [`DebateScript`]. Validation happens up front so callers get
//! `InsufficientParticipants` synchronously; the rounds themselves run in the
//! background under the task supervisor.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::turn_round::{conversation_gate, exclusive, pace, publish_message};
use crate::common::{AgentId, BestEffort, ConversationId, MessageId, OrchestratorError, StoreError};
use crate::domains::agents::Agent;
use crate::domains::conversations::events::Topic;
use crate::domains::conversations::models::NewMessage;
use crate::kernel::ServerDeps;

/// Rounds used when the caller asks for zero or fewer.
pub const DEFAULT_DEBATE_ROUNDS: u32 = 3;

/// Larger requests are clamped to this.
pub const MAX_DEBATE_ROUNDS: u32 = 100;

/// Debate topic for a conversation with no messages yet.
pub const DEFAULT_DEBATE_TOPIC: &str = "the open question";

/// Produces one participant's line for one round.
pub trait DebateScript: Send + Sync {
    /// `round` starts at 1.
    fn line(&self, participant: &Agent, round: u32, topic: &str) -> String;
}

/// Fixed template built from the participant's name and persona.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplatedDebateScript;

impl DebateScript for TemplatedDebateScript {
    fn line(&self, participant: &Agent, round: u32, topic: &str) -> String {
        format!(
            "{} (round {}): my view on \"{}\" comes from who I am [{}]. I think...",
            participant.name, round, topic, participant.persona
        )
    }
}

/// A validated debate, ready to run.
#[derive(Debug, Clone)]
pub struct DebatePlan {
    pub conversation_id: ConversationId,
    /// Resolved participants, in the caller's order.
    pub participants: Vec<Agent>,
    pub rounds: u32,
    pub topic: String,
}

impl DebatePlan {
    /// Number of message inserts the debate will attempt.
    pub fn turns(&self) -> usize {
        self.participants.len() * self.rounds as usize
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebateReport {
    pub attempted: usize,
    pub spoken: Vec<MessageId>,
    pub failed: usize,
    pub cancelled: bool,
}

/// Resolves participants and the topic.
///
/// Ids that do not parse or do not match a roster agent are dropped; fewer
/// than two survivors is a validation error. Nothing is written. `rounds`
/// is clamped to [`MAX_DEBATE_ROUNDS`].
pub async fn prepare_debate(
    conversation_id: ConversationId,
    participant_ids: &[String],
    rounds: i64,
    deps: &ServerDeps,
) -> Result<DebatePlan, OrchestratorError> {
    let rounds = match rounds {
        r if r <= 0 => DEFAULT_DEBATE_ROUNDS,
        r => u32::try_from(r).map_or(MAX_DEBATE_ROUNDS, |r| r.min(MAX_DEBATE_ROUNDS)),
    };

    if deps.store.find_conversation(conversation_id).await?.is_none() {
        return Err(StoreError::ConversationNotFound(conversation_id).into());
    }

    let roster = deps.store.list_agents().await?;
    let participants: Vec<Agent> = participant_ids
        .iter()
        .filter_map(|raw| AgentId::parse(raw.trim()).ok())
        .filter_map(|id| roster.iter().find(|agent| agent.id == id).cloned())
        .collect();

    if participants.len() < 2 {
        return Err(OrchestratorError::InsufficientParticipants {
            resolved: participants.len(),
        });
    }

    let topic = deps
        .store
        .conversation_messages(conversation_id)
        .await?
        .pop()
        .map(|m| m.content)
        .unwrap_or_else(|| DEFAULT_DEBATE_TOPIC.to_string());

    Ok(DebatePlan {
        conversation_id,
        participants,
        rounds,
        topic,
    })
}

/// Runs every round of `plan`: round-major, participant-minor.
///
/// A failed insert is logged and skipped; the schedule always attempts
/// `plan.turns()` inserts unless cancelled.
pub async fn run_debate(
    plan: &DebatePlan,
    script: &dyn DebateScript,
    cancel: CancellationToken,
    deps: &ServerDeps,
) -> DebateReport {
    let Some(_guard) = exclusive(plan.conversation_id, &cancel, deps).await else {
        return DebateReport {
            cancelled: true,
            ..DebateReport::default()
        };
    };
    play_debate(plan, script, cancel, deps).await
}

/// The rounds themselves. The caller already holds the conversation's
/// guard when rounds are serialized.
async fn play_debate(
    plan: &DebatePlan,
    script: &dyn DebateScript,
    cancel: CancellationToken,
    deps: &ServerDeps,
) -> DebateReport {
    let mut report = DebateReport::default();
    let conversation_id = plan.conversation_id;
    let topic = Topic::conversation(conversation_id);
    info!(
        conversation_id = %conversation_id,
        participants = plan.participants.len(),
        rounds = plan.rounds,
        "debate started"
    );

    'rounds: for round in 1..=plan.rounds {
        for participant in &plan.participants {
            let line = script.line(participant, round, &plan.topic);
            report.attempted += 1;

            let inserted = tokio::select! {
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break 'rounds;
                }
                inserted = deps.store.insert_message(NewMessage::from_agent(conversation_id, participant.id, line)) => inserted,
            };

            let Some(message) = inserted.best_effort("debate.insert_message") else {
                debug!(conversation_id = %conversation_id, round, agent = %participant.name, "debate turn skipped");
                report.failed += 1;
                continue;
            };

            publish_message(&topic, &message, &participant.name, deps).await;
            report.spoken.push(message.id);

            if !pace(deps.settings.response_delay, &cancel).await {
                report.cancelled = true;
                break 'rounds;
            }
        }
    }

    info!(
        conversation_id = %conversation_id,
        attempted = report.attempted,
        spoken = report.spoken.len(),
        failed = report.failed,
        cancelled = report.cancelled,
        "debate finished"
    );
    report
}

/// Validates the debate, then runs it in the background with the templated
/// script.
pub async fn start_debate(
    conversation_id: ConversationId,
    participant_ids: &[String],
    rounds: i64,
    deps: &ServerDeps,
) -> Result<JoinHandle<Option<DebateReport>>, OrchestratorError> {
    let plan = prepare_debate(conversation_id, participant_ids, rounds, deps).await?;
    info!(
        conversation_id = %conversation_id,
        turns = plan.turns(),
        "debate accepted"
    );

    let gate = conversation_gate(conversation_id, deps);
    let deps = deps.clone();
    Ok(deps
        .supervisor
        .clone()
        .spawn_gated("debate", gate, move |guard, cancel| async move {
            let report = play_debate(&plan, &TemplatedDebateScript, cancel, &deps).await;
            drop(guard);
            deps.locks.prune();
            report
        }))
}
