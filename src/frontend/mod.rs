//! Terminal front ends: the stdin control channel of a run and the `chat` REPL.

pub mod chat;
pub mod control;

pub use chat::{ChatOptions, run_chat};
pub use control::{ControlCommand, serve_control};
