//! Kernel module - collaborator seams, event buses, stores and the live bridge.

pub mod conversation_locks;
pub mod deps;
pub mod live_bridge;
pub mod memory_store;
pub mod nats_bus;
pub mod postgres_store;
pub mod stream_hub;
pub mod subscription;
pub mod task_supervisor;
pub mod test_dependencies;
pub mod traits;

pub use conversation_locks::ConversationLocks;
pub use deps::ServerDeps;
pub use live_bridge::{
    viewer_credential, BridgeExit, LiveBridge, TransportSink, TransportSource,
    CLOSE_GOING_AWAY, CLOSE_INTERNAL_ERROR,
};
pub use memory_store::InMemoryStore;
pub use nats_bus::NatsEventBus;
pub use postgres_store::PostgresStore;
pub use stream_hub::StreamHub;
pub use subscription::Subscription;
pub use task_supervisor::TaskSupervisor;
pub use test_dependencies::{
    channel_transport, Journal, JournalEntry, RecordingBus, TestDependencies, TestViewer,
};
pub use traits::*;
