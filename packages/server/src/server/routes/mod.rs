// HTTP routes
pub mod agents;
pub mod conversations;
pub mod health;
pub mod live;

pub use agents::*;
pub use conversations::*;
pub use health::*;
pub use live::live_handler;
