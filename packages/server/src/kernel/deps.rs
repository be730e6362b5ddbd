//! Server dependencies for the orchestration actions (using traits for testability)
//!
//! This module provides the dependency container every action and route
//! receives. Collaborators sit behind trait objects so tests swap in the
//! in-memory store and the recording bus.

use std::sync::Arc;

use crate::config::OrchestrationSettings;
use crate::domains::agents::DecisionPolicy;
use crate::kernel::{
    BaseConversationStore, BaseEventBus, ConversationLocks, LiveBridge, TaskSupervisor,
};

// =============================================================================
// ServerDeps
// =============================================================================

/// Shared, cheaply cloneable dependencies.
#[derive(Clone)]
pub struct ServerDeps {
    pub store: Arc<dyn BaseConversationStore>,
    pub bus: Arc<dyn BaseEventBus>,
    /// Decides whether and what an agent says during a turn round.
    pub decider: Arc<dyn DecisionPolicy>,
    pub settings: OrchestrationSettings,
    /// Owns background turn rounds and debates.
    pub supervisor: TaskSupervisor,
    pub locks: ConversationLocks,
}

impl ServerDeps {
    pub fn new(
        store: Arc<dyn BaseConversationStore>,
        bus: Arc<dyn BaseEventBus>,
        decider: Arc<dyn DecisionPolicy>,
        settings: OrchestrationSettings,
    ) -> Self {
        let supervisor = TaskSupervisor::new(settings.max_background_rounds);
        Self {
            store,
            bus,
            decider,
            settings,
            supervisor,
            locks: ConversationLocks::new(),
        }
    }

    /// Live bridge over the same store and bus. `auth_token` gates viewers.
    pub fn live_bridge(&self, auth_token: Option<String>) -> LiveBridge {
        LiveBridge::new(
            self.store.clone(),
            self.bus.clone(),
            self.settings.ping_interval,
        )
        .with_auth_token(auth_token)
    }
}
