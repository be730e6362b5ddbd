//! Turn round - one pass of agent replies after a user message.
//!
//! The responders are the first `max_responders` agents of the roster, in
//! roster order. Each one sees the conversation as it stands, including what
//! the agents before it said in the same round:
//!
//! ```text
//! for agent in roster[..max_responders]:
//!     decide(agent, snapshot)   ─ none / error → abstain
//!     persist                   ─ error → skip, round continues
//!     publish message.created   ─ best effort
//!     snapshot.push(reply)
//!     sleep(response_delay)     ─ cancellable
//! ```
//!
//! A message is always committed before its event is published, and each
//! agent's message commits after the previous one's.

use std::future::Future;
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::common::{BestEffort, ConversationId, MessageId};
use crate::domains::agents::{Agent, ConversationSnapshot};
use crate::domains::conversations::events::{Event, Topic};
use crate::domains::conversations::models::{Message, NewMessage};
use crate::kernel::ServerDeps;

/// What one round did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub responders: usize,
    /// Persisted agent messages, in the order they were written.
    pub spoken: Vec<MessageId>,
    pub abstained: usize,
    /// Replies lost to persistence failures.
    pub failed: usize,
    pub cancelled: bool,
}

enum TurnOutcome {
    Spoke(Message),
    Abstained,
    Failed,
}

/// Runs one turn round for `conversation_id`.
///
/// Never fails: every problem after the triggering message is committed is
/// logged and reflected in the report.
pub async fn run_turn_round(
    conversation_id: ConversationId,
    cancel: CancellationToken,
    deps: &ServerDeps,
) -> RoundReport {
    let Some(_guard) = exclusive(conversation_id, &cancel, deps).await else {
        return RoundReport {
            cancelled: true,
            ..RoundReport::default()
        };
    };
    play_turn_round(conversation_id, cancel, deps).await
}

/// The round itself. The caller already holds the conversation's guard
/// when rounds are serialized.
pub(crate) async fn play_turn_round(
    conversation_id: ConversationId,
    cancel: CancellationToken,
    deps: &ServerDeps,
) -> RoundReport {
    let mut report = RoundReport::default();

    let Some(agents) = deps
        .store
        .list_agents()
        .await
        .best_effort("turn_round.list_agents")
    else {
        return report;
    };
    let responders: Vec<Agent> = agents
        .into_iter()
        .take(deps.settings.max_responders)
        .collect();
    report.responders = responders.len();
    if responders.is_empty() {
        debug!(conversation_id = %conversation_id, "no agents to respond");
        return report;
    }

    let Some(history) = deps
        .store
        .conversation_messages(conversation_id)
        .await
        .best_effort("turn_round.load_history")
    else {
        return report;
    };
    let mut tail: Vec<String> = history.into_iter().map(|m| m.content).collect();
    let topic = Topic::conversation(conversation_id);

    for agent in &responders {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                report.cancelled = true;
                break;
            }
            outcome = take_turn(conversation_id, agent, &tail, deps) => outcome,
        };

        match outcome {
            TurnOutcome::Spoke(message) => {
                publish_message(&topic, &message, &agent.name, deps).await;
                report.spoken.push(message.id);
                tail.push(message.content);
            }
            TurnOutcome::Abstained => {
                report.abstained += 1;
                continue;
            }
            TurnOutcome::Failed => {
                report.failed += 1;
                continue;
            }
        }

        if !pace(deps.settings.response_delay, &cancel).await {
            report.cancelled = true;
            break;
        }
    }

    info!(
        conversation_id = %conversation_id,
        responders = report.responders,
        spoken = report.spoken.len(),
        abstained = report.abstained,
        failed = report.failed,
        cancelled = report.cancelled,
        "turn round finished"
    );
    report
}

async fn take_turn(
    conversation_id: ConversationId,
    agent: &Agent,
    tail: &[String],
    deps: &ServerDeps,
) -> TurnOutcome {
    let snapshot = ConversationSnapshot::new(conversation_id, tail.to_vec());

    let action = match deps.decider.decide_action(agent, &snapshot).await {
        Ok(Some(action)) => action,
        Ok(None) => {
            debug!(conversation_id = %conversation_id, agent = %agent.name, "agent stays quiet");
            return TurnOutcome::Abstained;
        }
        Err(e) => {
            debug!(conversation_id = %conversation_id, agent = %agent.name, error = %e, "decision failed, abstaining");
            return TurnOutcome::Abstained;
        }
    };

    match deps
        .store
        .insert_message(NewMessage::from_agent(conversation_id, agent.id, action.payload))
        .await
        .best_effort("turn_round.insert_message")
    {
        Some(message) => TurnOutcome::Spoke(message),
        None => TurnOutcome::Failed,
    }
}

/// Resolves to the conversation's exclusive guard, or to `None` at once
/// when rounds are not serialized. Owns everything it needs, so it can gate
/// a background task.
pub(crate) fn conversation_gate(
    conversation_id: ConversationId,
    deps: &ServerDeps,
) -> impl Future<Output = Option<OwnedMutexGuard<()>>> + Send + 'static {
    let locks = deps.settings.serialize_rounds.then(|| deps.locks.clone());
    async move {
        match locks {
            Some(locks) => Some(locks.acquire(conversation_id).await),
            None => None,
        }
    }
}

/// Waits on [`conversation_gate`] unless cancelled first.
///
/// `None` means cancellation won the wait. `Some(None)` means no guard is
/// needed.
pub(crate) async fn exclusive(
    conversation_id: ConversationId,
    cancel: &CancellationToken,
    deps: &ServerDeps,
) -> Option<Option<OwnedMutexGuard<()>>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        guard = conversation_gate(conversation_id, deps) => Some(guard),
    }
}

/// Publishes `message.created` for a committed message. Best effort.
pub(crate) async fn publish_message(
    topic: &Topic,
    message: &Message,
    sender: &str,
    deps: &ServerDeps,
) {
    deps.bus
        .publish(topic, Event::message_created(message, sender))
        .await
        .best_effort("publish.message_created");
}

/// Sleeps for `delay`. Returns `false` if cancelled first.
pub(crate) async fn pace(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{BaseConversationStore, TestDependencies};

    #[tokio::test(start_paused = true)]
    async fn responders_are_the_roster_prefix() {
        let test = TestDependencies::new().with_agents(&["Ada", "Brook", "Cy", "Dee"]);
        let deps = test.server_deps();
        let conversation = deps.store.create_conversation("t").await.unwrap();

        let report = run_turn_round(conversation.id, CancellationToken::new(), &deps).await;

        assert_eq!(report.responders, 3);
        assert_eq!(report.spoken.len(), 3);
        let senders: Vec<_> = test
            .bus
            .published()
            .into_iter()
            .filter_map(|p| match p.event {
                Event::MessageCreated { sender, .. } => Some(sender),
                _ => None,
            })
            .collect();
        assert_eq!(senders, ["Ada", "Brook", "Cy"]);
    }

    #[tokio::test(start_paused = true)]
    async fn later_agents_see_earlier_replies() {
        let test = TestDependencies::new().with_agents(&["Ada", "Brook"]);
        let deps = test.server_deps();
        let conversation = deps.store.create_conversation("t").await.unwrap();
        deps.store
            .insert_message(NewMessage::from_user(conversation.id, "u1", "hello"))
            .await
            .unwrap();

        run_turn_round(conversation.id, CancellationToken::new(), &deps).await;

        assert_eq!(
            test.bus.message_contents(),
            ["Ada replies: hello", "Brook replies: Ada replies: hello"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_roster_does_nothing() {
        let test = TestDependencies::new();
        let deps = test.server_deps();
        let conversation = deps.store.create_conversation("t").await.unwrap();

        let report = run_turn_round(conversation.id, CancellationToken::new(), &deps).await;

        assert_eq!(report, RoundReport::default());
        assert!(test.bus.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_round_stops_during_pause() {
        let test = TestDependencies::new().with_agents(&["Ada", "Brook"]);
        let deps = test.server_deps();
        let conversation = deps.store.create_conversation("t").await.unwrap();
        let cancel = CancellationToken::new();

        let round = {
            let deps = deps.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { run_turn_round(conversation.id, cancel, &deps).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let report = round.await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.spoken.len(), 1);
    }

    #[tokio::test]
    async fn pace_without_delay_returns_immediately() {
        assert!(pace(Duration::ZERO, &CancellationToken::new()).await);
    }
}
