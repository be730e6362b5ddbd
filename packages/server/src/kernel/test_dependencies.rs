// TestDependencies - doubles for orchestration and live bridge tests
//
// RecordingBus delivers through a real StreamHub and remembers every publish;
// Journal interleaves store commits with bus publishes so tests can assert
// commit-before-publish; the channel transport stands in for a WebSocket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{
    BaseConversationStore, BaseEventBus, InMemoryStore, ServerDeps, StreamHub, Subscription,
    TransportSink, TransportSource,
};
use crate::common::{BusError, MessageId, TransportError};
use crate::config::OrchestrationSettings;
use crate::domains::agents::{Agent, DecisionPolicy, SimpleDecider};
use crate::domains::conversations::events::{Event, Topic};

// =============================================================================
// Journal
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    Committed(MessageId),
    Published { kind: &'static str, message_id: Option<MessageId> },
}

/// Shared, ordered record of store commits and bus publishes.
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: JournalEntry) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Position of the commit of `id`, if it happened.
    pub fn commit_position(&self, id: MessageId) -> Option<usize> {
        self.entries()
            .iter()
            .position(|e| *e == JournalEntry::Committed(id))
    }

    /// Position of the `message.created` publish for `id`, if it happened.
    pub fn publish_position(&self, id: MessageId) -> Option<usize> {
        self.entries().iter().position(|e| {
            matches!(e, JournalEntry::Published { kind: "message.created", message_id: Some(m) } if *m == id)
        })
    }
}

// =============================================================================
// Recording Bus
// =============================================================================

/// One successful publish.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub topic: Topic,
    pub event: Event,
    pub at: Instant,
}

/// Event bus that records every publish and still delivers to subscribers.
#[derive(Default)]
pub struct RecordingBus {
    hub: StreamHub,
    published: RwLock<Vec<PublishedEvent>>,
    unavailable: AtomicBool,
    journal: Option<Journal>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn hub(&self) -> &StreamHub {
        &self.hub
    }

    /// Makes every publish and subscribe fail with `BusError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedEvent> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Published events of one kind, in publish order.
    pub fn published_of_kind(&self, kind: &str) -> Vec<PublishedEvent> {
        self.published()
            .into_iter()
            .filter(|p| p.event.kind() == kind)
            .collect()
    }

    /// Content of every `message.created` event, in publish order.
    pub fn message_contents(&self) -> Vec<String> {
        self.published()
            .into_iter()
            .filter_map(|p| match p.event {
                Event::MessageCreated { content, .. } => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn was_published_to(&self, topic: &Topic) -> bool {
        self.published().iter().any(|p| p.topic == *topic)
    }

    fn check_available(&self) -> Result<(), BusError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable("recording bus offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BaseEventBus for RecordingBus {
    async fn publish(&self, topic: &Topic, event: Event) -> Result<(), BusError> {
        self.check_available()?;
        self.hub.publish(topic, event.clone()).await?;

        if let Some(journal) = &self.journal {
            let message_id = match &event {
                Event::MessageCreated { message_id, .. } => Some(*message_id),
                _ => None,
            };
            journal.record(JournalEntry::Published {
                kind: event.kind(),
                message_id,
            });
        }

        self.published
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(PublishedEvent {
                topic: topic.clone(),
                event,
                at: Instant::now(),
            });
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic) -> Result<Subscription, BusError> {
        self.check_available()?;
        self.hub.subscribe(topic).await
    }
}

// =============================================================================
// Channel Transport
// =============================================================================

/// Write half handed to the bridge.
pub struct ChannelSink {
    events: mpsc::UnboundedSender<Event>,
    closed: Arc<Mutex<Option<(u16, String)>>>,
    fail_writes: Arc<AtomicBool>,
}

/// Read half handed to the bridge.
pub struct ChannelSource {
    frames: mpsc::UnboundedReceiver<Result<serde_json::Value, TransportError>>,
}

/// The viewer's side of a channel transport.
pub struct TestViewer {
    events: mpsc::UnboundedReceiver<Event>,
    frames: Option<mpsc::UnboundedSender<Result<serde_json::Value, TransportError>>>,
    closed: Arc<Mutex<Option<(u16, String)>>>,
    fail_writes: Arc<AtomicBool>,
}

/// Builds a connected in-memory transport.
pub fn channel_transport() -> (ChannelSink, ChannelSource, TestViewer) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(Mutex::new(None));
    let fail_writes = Arc::new(AtomicBool::new(false));

    (
        ChannelSink {
            events: event_tx,
            closed: closed.clone(),
            fail_writes: fail_writes.clone(),
        },
        ChannelSource { frames: frame_rx },
        TestViewer {
            events: event_rx,
            frames: Some(frame_tx),
            closed,
            fail_writes,
        },
    )
}

#[async_trait]
impl TransportSink for ChannelSink {
    async fn send_event(&mut self, event: &Event) -> Result<(), TransportError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Io("write refused".to_string()));
        }
        self.events
            .send(event.clone())
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        *self.closed.lock().unwrap_or_else(|e| e.into_inner()) = Some((code, reason.to_string()));
        Ok(())
    }
}

#[async_trait]
impl TransportSource for ChannelSource {
    async fn next_frame(&mut self) -> Result<Option<serde_json::Value>, TransportError> {
        match self.frames.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

impl TestViewer {
    /// Next event the bridge wrote, or `None` once the sink is gone.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Events already written, without waiting.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn send_frame(&self, frame: serde_json::Value) {
        if let Some(frames) = &self.frames {
            frames.send(Ok(frame)).ok();
        }
    }

    /// Viewer goes away cleanly.
    pub fn disconnect(&mut self) {
        self.frames = None;
    }

    /// Next read on the bridge side fails.
    pub fn break_reads(&self) {
        if let Some(frames) = &self.frames {
            frames
                .send(Err(TransportError::Io("connection reset".to_string())))
                .ok();
        }
    }

    /// Every later write from the bridge fails.
    pub fn refuse_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Close code and reason the bridge sent, if any.
    pub fn close_frame(&self) -> Option<(u16, String)> {
        self.closed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

// =============================================================================
// Test Dependencies
// =============================================================================

/// Fully in-memory dependency set with the recording doubles wired in.
pub struct TestDependencies {
    pub store: Arc<InMemoryStore>,
    pub bus: Arc<RecordingBus>,
    pub journal: Journal,
    pub settings: OrchestrationSettings,
    pub decider: Arc<dyn DecisionPolicy>,
}

impl TestDependencies {
    pub fn new() -> Self {
        let journal = Journal::new();
        let commits = journal.clone();
        let store =
            InMemoryStore::new().on_commit(move |m| commits.record(JournalEntry::Committed(m.id)));

        Self {
            store: Arc::new(store),
            bus: Arc::new(RecordingBus::new().with_journal(journal.clone())),
            journal,
            settings: OrchestrationSettings::default(),
            decider: Arc::new(SimpleDecider),
        }
    }

    pub fn with_settings(mut self, settings: OrchestrationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_decider(mut self, decider: Arc<dyn DecisionPolicy>) -> Self {
        self.decider = decider;
        self
    }

    /// Adds agents with the given names to the roster, in order.
    pub fn with_agents(self, names: &[&str]) -> Self {
        for name in names {
            self.store
                .add_agent(Agent::new(*name, format!("{} persona", name)));
        }
        self
    }

    pub async fn agents(&self) -> Vec<Agent> {
        self.store.list_agents().await.unwrap_or_default()
    }

    pub fn into_server_deps(self) -> ServerDeps {
        ServerDeps::new(self.store, self.bus, self.decider, self.settings)
    }

    /// Server deps sharing this set's store and bus, so the doubles stay
    /// inspectable.
    pub fn server_deps(&self) -> ServerDeps {
        ServerDeps::new(
            self.store.clone(),
            self.bus.clone(),
            self.decider.clone(),
            self.settings.clone(),
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
