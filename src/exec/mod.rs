//! Process execution: one-shot shell commands for tools, and hosting of whole
//! runs in child processes for the interactive front end.

pub mod host;
pub mod shell;

pub use host::{HostedRun, StopOutcome};
pub use shell::{ExecResult, execute_shell};
