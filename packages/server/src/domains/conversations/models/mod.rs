mod conversation;

pub use conversation::{Conversation, Message, NewMessage, SenderKind};
