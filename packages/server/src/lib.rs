// Multi-agent conversation core
//
// Users post into conversations; a roster of persona agents answers in turn
// rounds or scripted debates, and live viewers follow every message over a
// WebSocket fed by the event bus.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
