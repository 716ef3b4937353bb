//! The model seam: one call per turn, returning either tool requests or a
//! finish signal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::catalog::AgentConfig;
use super::tools::ToolSpec;
use super::types::{Action, RunStatus};
use crate::error::ModelError;

/// One tool (or sub-agent, or human) call requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolRequest {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// What the model wants to do this turn.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelTurn {
    Act {
        thinking: Option<String>,
        calls: Vec<ToolRequest>,
    },
    Finish {
        status: RunStatus,
        output: String,
    },
}

/// Everything a model client needs to produce the next turn.
#[derive(Clone, Debug)]
pub struct ModelRequest {
    pub agent: AgentConfig,
    pub model: String,
    pub task_input: String,
    pub history: Vec<Action>,
    /// 1-based turn number within this agent run.
    pub turn: u32,
    pub max_turns: u32,
    pub tools: Vec<ToolSpec>,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn next_turn(&self, request: &ModelRequest) -> Result<ModelTurn, ModelError>;
}

/// Render an action history as plain text for a prompt.
pub fn render_history(history: &[Action]) -> String {
    let mut out = String::new();
    for action in history {
        let status = serde_json::to_value(action.outcome.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        out.push_str(&format!(
            "[turn {}] {}({}) -> {}: {}\n",
            action.turn, action.tool_name, action.arguments, status, action.outcome.output
        ));
    }
    out
}
