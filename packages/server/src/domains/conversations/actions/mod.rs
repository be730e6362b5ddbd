//! Conversations domain actions
//!
//! Entry points (`create_conversation`, `handle_user_message`,
//! `start_debate`) are called from the HTTP routes. They validate and do
//! their own write synchronously, then hand the rest to the task supervisor.

mod debate;
mod entry_points;
mod turn_round;

pub use debate::{
    prepare_debate, run_debate, start_debate, DebatePlan, DebateReport, DebateScript,
    TemplatedDebateScript, DEFAULT_DEBATE_ROUNDS, DEFAULT_DEBATE_TOPIC, MAX_DEBATE_ROUNDS,
};
pub use entry_points::{
    create_conversation, handle_user_message, AcceptedMessage, DEFAULT_CONVERSATION_TITLE,
    DEFAULT_USER_ID,
};
pub use turn_round::{run_turn_round, RoundReport};
