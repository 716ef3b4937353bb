use std::path::PathBuf;

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },
}

/// Missing or invalid agent definitions. Fatal: raised before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("Agent `{0}` is not defined in the catalogue")]
    UnknownAgent(String),

    #[error("`{name}` is not an agent: {reason}")]
    InvalidAgent { name: String, reason: String },
}

/// Failures while writing the persisted Context/Stack pair.
///
/// Reads never produce this error: unreadable state is treated as absent.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Frame index {index} out of range (stack depth {depth})")]
    FrameOutOfRange { index: usize, depth: usize },

    #[error("Stack already holds {depth} frame(s) of a different task")]
    StackOccupied { depth: usize },
}

/// Errors from the pending-entry registries (HIL tasks, tool confirmations).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinationError {
    #[error("No pending entry with id `{0}`")]
    NotFound(String),

    #[error("Entry `{id}` was already resolved ({status})")]
    AlreadyResolved { id: String, status: String },

    #[error("An entry with id `{0}` is already registered")]
    Duplicate(String),
}

/// Errors raised by a tool implementation. Recovered: surfaced to the model.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("{tool}: missing or invalid '{argument}' argument")]
    InvalidArgument { tool: String, argument: String },

    #[error("{tool}: path '{path}' is outside the workspace directory")]
    OutsideWorkspace { tool: String, path: String },

    #[error("{tool} failed: {message}")]
    Failed { tool: String, message: String },
}

/// Errors from the model-invocation client.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Malformed model reply: {0}")]
    Malformed(String),

    #[error("Model script exhausted after {0} turns")]
    Exhausted(u32),
}

/// Errors related to shell command execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Failed to spawn shell process: {0}")]
    SpawnFailed(String),

    #[error("Process execution failed: {0}")]
    ProcessFailed(String),
}

/// Errors from hosting a run in a child process.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Failed to spawn hosted run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to signal hosted run (pid {pid}): {message}")]
    Signal { pid: u32, message: String },

    #[error("Failed to wait for hosted run: {0}")]
    Wait(#[from] std::io::Error),
}

/// Failures of the run entry sequence (`session::start_run` / `resume_run`).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Nothing to resume: {0}")]
    NothingToResume(String),

    #[error(
        "An interrupted task is still pending ({stack_depth} frame(s)): \"{pending_input}\". \
         Run `stratum resume` to continue it or pass --force-new to discard it"
    )]
    StaleTask { pending_input: String, stack_depth: usize },
}
