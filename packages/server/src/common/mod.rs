// Common types and utilities shared across the application

pub mod best_effort;
pub mod entity_ids;
pub mod errors;
pub mod id;

pub use best_effort::BestEffort;
pub use entity_ids::*;
pub use errors::{
    BusError, DecisionError, LiveError, OrchestratorError, StoreError, TransportError,
};
pub use id::Id;
