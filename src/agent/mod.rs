//! Agent execution: the catalogue, model and tool seams, and the recursive
//! [`executor::AgentExecutor`] that ties them to the hierarchy and the
//! coordination layer.

pub mod catalog;
pub mod conversation;
pub mod events;
pub mod executor;
pub mod genai_client;
pub mod model;
pub mod tools;
pub mod types;

pub use catalog::{AgentCatalog, AgentConfig, StaticCatalog};
pub use executor::{AgentExecutor, ExecutorContext};
pub use model::{ModelClient, ModelRequest, ModelTurn, ToolRequest};
pub use tools::{BuiltinTools, ToolExecutor, ToolSpec};
pub use types::{ExecutionLimits, ExecutionResult, RunStatus, ToolOutcome, ToolStatus};
