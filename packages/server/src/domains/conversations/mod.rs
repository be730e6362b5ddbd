//! Conversations domain - the message log, its events, and the schedulers
//! that make agents take turns in it.

pub mod actions;
pub mod events;
pub mod models;

pub use events::{Event, Topic};
pub use models::{Conversation, Message, NewMessage, SenderKind};
