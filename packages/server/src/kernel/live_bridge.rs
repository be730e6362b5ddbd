//! Live Bridge - binds one viewer connection to one conversation stream.
//!
//! The bridge is transport-agnostic: the WebSocket route adapts its socket
//! halves to [`TransportSink`] / [`TransportSource`], tests use in-memory
//! channels.
//!
//! # Lifecycle
//!
//! ```text
//! authorize ──► subscribe(topic) ──► replay history ──► stream
//!                                                         │
//!                   ┌─────────────────────────────────────┤
//!                   │ ping task    every ping_interval     │
//!                   │ read task    drains viewer frames    │
//!                   │ main loop    forwards bus events     │
//!                   └─────────────────────────────────────┘
//! ```
//!
//! Subscribing happens before the history read so nothing published in
//! between is lost. A message can then show up both in history and live;
//! live copies of replayed messages are skipped.
//!
//! The bridge stops on the first of: owner cancellation, viewer disconnect
//! or read error, failed write, or the bus closing the subscription. All
//! three tasks stop together and the subscription is released before
//! [`LiveBridge::run`] returns. Cancellation also interrupts the history
//! replay, and close frames are bounded by a timeout.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::common::{BestEffort, ConversationId, LiveError, MessageId, TransportError};
use crate::domains::conversations::events::{Event, Topic};
use crate::kernel::traits::{BaseConversationStore, BaseEventBus};

/// Server is going away.
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Server-side failure.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// How long a close frame may take before the viewer is abandoned.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Write half of a viewer connection.
#[async_trait]
pub trait TransportSink: Send + 'static {
    async fn send_event(&mut self, event: &Event) -> Result<(), TransportError>;

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}

/// Read half of a viewer connection.
#[async_trait]
pub trait TransportSource: Send + 'static {
    /// `Ok(None)` when the viewer closed the connection.
    async fn next_frame(&mut self) -> Result<Option<serde_json::Value>, TransportError>;
}

/// Why a bridge stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    Cancelled,
    TransportClosed,
    WriteFailed,
    BusClosed,
}

#[derive(Clone)]
pub struct LiveBridge {
    store: Arc<dyn BaseConversationStore>,
    bus: Arc<dyn BaseEventBus>,
    ping_interval: Duration,
    auth_token: Option<String>,
}

impl LiveBridge {
    pub fn new(
        store: Arc<dyn BaseConversationStore>,
        bus: Arc<dyn BaseEventBus>,
        ping_interval: Duration,
    ) -> Self {
        Self {
            store,
            bus,
            ping_interval,
            auth_token: None,
        }
    }

    /// Requires viewers to present `token`. `None` or an empty token turns
    /// the check off.
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn requires_auth(&self) -> bool {
        self.auth_token.is_some()
    }

    /// Checks a viewer credential. Must run before the transport upgrade.
    pub fn authorize(&self, credential: Option<&str>) -> Result<(), LiveError> {
        match (&self.auth_token, credential) {
            (None, _) => Ok(()),
            (Some(expected), Some(given)) if given == expected => Ok(()),
            _ => Err(LiveError::Unauthorized),
        }
    }

    /// Streams the conversation to one viewer until one of the exit
    /// conditions fires.
    ///
    /// Fails only when the subscription cannot be created; the viewer is
    /// closed with [`CLOSE_INTERNAL_ERROR`] in that case.
    pub async fn run<S, R>(
        &self,
        conversation_id: ConversationId,
        mut sink: S,
        source: R,
        cancel: CancellationToken,
    ) -> Result<BridgeExit, LiveError>
    where
        S: TransportSink,
        R: TransportSource,
    {
        let topic = Topic::conversation(conversation_id);

        let mut subscription = match self.bus.subscribe(&topic).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "live subscribe failed");
                let close = sink.close(CLOSE_INTERNAL_ERROR, "subscribe failed");
                close_viewer(conversation_id, close).await;
                return Err(e.into());
            }
        };
        info!(conversation_id = %conversation_id, "viewer connected");

        let replay = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            replayed = self.replay_history(conversation_id, &mut sink) => Some(replayed),
        };
        let replayed = match replay {
            Some(Ok(replayed)) => replayed,
            Some(Err(e)) => {
                debug!(conversation_id = %conversation_id, error = %e, "history replay write failed");
                subscription.close();
                return Ok(BridgeExit::WriteFailed);
            }
            None => {
                debug!(conversation_id = %conversation_id, "cancelled during history replay");
                subscription.close();
                let close = sink.close(CLOSE_GOING_AWAY, "server closing");
                close_viewer(conversation_id, close).await;
                info!(conversation_id = %conversation_id, exit = ?BridgeExit::Cancelled, "viewer disconnected");
                return Ok(BridgeExit::Cancelled);
            }
        };

        let sink = Arc::new(Mutex::new(sink));
        let tasks = cancel.child_token();
        let (exit_tx, mut exit_rx) = mpsc::channel::<BridgeExit>(2);

        let ping_task = tokio::spawn(ping_loop(
            sink.clone(),
            self.ping_interval,
            tasks.clone(),
            exit_tx.clone(),
        ));
        let read_task = tokio::spawn(read_loop(source, tasks.clone(), exit_tx));

        let exit = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break BridgeExit::Cancelled,
                Some(exit) = exit_rx.recv() => break exit,
                event = subscription.recv() => {
                    let Some(event) = event else {
                        break BridgeExit::BusClosed;
                    };
                    if let Event::MessageCreated { message_id, .. } = &event {
                        if replayed.contains(message_id) {
                            trace!(conversation_id = %conversation_id, "skipping replayed message");
                            continue;
                        }
                    }

                    let sent = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break BridgeExit::Cancelled,
                        sent = async { sink.lock().await.send_event(&event).await } => sent,
                    };
                    if let Err(e) = sent {
                        debug!(conversation_id = %conversation_id, error = %e, "live forward failed");
                        break BridgeExit::WriteFailed;
                    }
                }
            }
        };

        tasks.cancel();
        subscription.close();
        ping_task.await.best_effort("live_bridge.ping_task");
        read_task.await.best_effort("live_bridge.read_task");

        let close = match exit {
            BridgeExit::Cancelled => Some((CLOSE_GOING_AWAY, "server closing")),
            BridgeExit::BusClosed => Some((CLOSE_INTERNAL_ERROR, "event stream ended")),
            BridgeExit::TransportClosed | BridgeExit::WriteFailed => None,
        };
        if let Some((code, reason)) = close {
            close_viewer(conversation_id, async {
                sink.lock().await.close(code, reason).await
            })
            .await;
        }

        info!(conversation_id = %conversation_id, exit = ?exit, "viewer disconnected");
        Ok(exit)
    }

    /// Sends stored history oldest first and returns the replayed ids.
    ///
    /// A failed history read is logged and the viewer just gets the live
    /// stream; only a failed write ends the replay.
    async fn replay_history<S: TransportSink>(
        &self,
        conversation_id: ConversationId,
        sink: &mut S,
    ) -> Result<HashSet<MessageId>, TransportError> {
        let Some(history) = self
            .store
            .conversation_messages(conversation_id)
            .await
            .best_effort("live_bridge.load_history")
        else {
            return Ok(HashSet::new());
        };

        let mut replayed = HashSet::with_capacity(history.len());
        for message in &history {
            sink.send_event(&Event::history(message)).await?;
            replayed.insert(message.id);
        }
        debug!(conversation_id = %conversation_id, count = history.len(), "history replayed");
        Ok(replayed)
    }
}

/// Sends a close frame, giving up after [`CLOSE_TIMEOUT`].
async fn close_viewer(
    conversation_id: ConversationId,
    close: impl Future<Output = Result<(), TransportError>>,
) {
    match tokio::time::timeout(CLOSE_TIMEOUT, close).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(conversation_id = %conversation_id, error = %e, "viewer close failed"),
        Err(_) => debug!(conversation_id = %conversation_id, "viewer close timed out"),
    }
}

async fn ping_loop<S: TransportSink>(
    sink: Arc<Mutex<S>>,
    period: Duration,
    cancel: CancellationToken,
    exits: mpsc::Sender<BridgeExit>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let sent = tokio::select! {
            _ = cancel.cancelled() => return,
            sent = async {
                ticker.tick().await;
                sink.lock().await.send_event(&Event::ping()).await
            } => sent,
        };

        if let Err(e) = sent {
            debug!(error = %e, "ping write failed");
            exits.try_send(BridgeExit::WriteFailed).ok();
            return;
        }
    }
}

async fn read_loop<R: TransportSource>(
    mut source: R,
    cancel: CancellationToken,
    exits: mpsc::Sender<BridgeExit>,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = source.next_frame() => frame,
        };

        match frame {
            // Inbound frames carry no meaning yet.
            Ok(Some(frame)) => trace!(frame = %frame, "ignoring viewer frame"),
            Ok(None) => {
                exits.try_send(BridgeExit::TransportClosed).ok();
                return;
            }
            Err(e) => {
                debug!(error = %e, "viewer read failed");
                exits.try_send(BridgeExit::TransportClosed).ok();
                return;
            }
        }
    }
}

/// Picks the viewer credential: the `X-WS-Token` header wins over the
/// `?token=` query parameter. Empty values count as absent.
pub fn viewer_credential<'a>(header: Option<&'a str>, query: Option<&'a str>) -> Option<&'a str> {
    header
        .filter(|h| !h.is_empty())
        .or(query.filter(|q| !q.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::memory_store::InMemoryStore;
    use crate::kernel::stream_hub::StreamHub;

    fn bridge(token: Option<&str>) -> LiveBridge {
        LiveBridge::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(StreamHub::new()),
            Duration::from_secs(30),
        )
        .with_auth_token(token.map(str::to_string))
    }

    #[test]
    fn open_bridge_accepts_anyone() {
        assert!(bridge(None).authorize(None).is_ok());
        assert!(bridge(Some("")).authorize(None).is_ok());
    }

    #[test]
    fn token_must_match() {
        let bridge = bridge(Some("s3cret"));
        assert!(bridge.authorize(Some("s3cret")).is_ok());
        assert!(matches!(bridge.authorize(Some("nope")), Err(LiveError::Unauthorized)));
        assert!(matches!(bridge.authorize(None), Err(LiveError::Unauthorized)));
    }

    #[test]
    fn header_credential_wins() {
        assert_eq!(viewer_credential(Some("h"), Some("q")), Some("h"));
        assert_eq!(viewer_credential(Some(""), Some("q")), Some("q"));
        assert_eq!(viewer_credential(None, None), None);
    }
}
