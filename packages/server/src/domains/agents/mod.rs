//! Agents domain - the persona roster and the policy that decides what an
//! agent says.
//!
//! Dependency direction: conversations → agents. Agents has no knowledge of
//! schedulers or the event bus.

pub mod decision;
pub mod models;

pub use decision::{Action, ActionKind, ConversationSnapshot, DecisionPolicy, SimpleDecider};
pub use models::Agent;
