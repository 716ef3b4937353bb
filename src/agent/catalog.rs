//! Agent catalogue: where agent definitions come from.
//!
//! The executor only sees the [`AgentCatalog`] trait. [`StaticCatalog`] is the
//! in-memory implementation used by the binary and the tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Static definition of one agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    /// Position in the hierarchy; higher levels delegate to lower ones.
    /// Level 0 is reserved for plain tools.
    pub level: u32,
    /// Model override; `None` uses the configured default.
    pub model: Option<String>,
    /// Tool and sub-agent names this agent may call.
    pub available_tools: Vec<String>,
    pub description: String,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, level: u32, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level,
            model: None,
            available_tools: Vec::new(),
            description: description.into(),
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn can_call(&self, tool_name: &str) -> bool {
        self.available_tools.iter().any(|t| t == tool_name)
    }
}

pub trait AgentCatalog: Send + Sync {
    /// Resolve an agent by name.
    fn agent(&self, name: &str) -> Result<AgentConfig, CatalogError>;

    /// Whether `name` resolves to an agent (as opposed to a plain tool).
    fn is_agent(&self, name: &str) -> bool {
        self.agent(name).is_ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    agents: HashMap<String, AgentConfig>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(mut self, agent: AgentConfig) -> Self {
        self.agents.insert(agent.name.clone(), agent);
        self
    }

    /// Two-level default hierarchy: a planner delegating to a worker.
    pub fn builtin() -> Self {
        Self::new()
            .with_agent(
                AgentConfig::new(
                    "alpha_agent",
                    2,
                    "Top-level planner. Breaks the task into steps, delegates focused work \
                     to worker_agent, and asks the human when something only they can do.",
                )
                .with_tools([
                    "worker_agent",
                    "file_read",
                    "file_write",
                    "shell_exec",
                    "human_in_loop",
                ]),
            )
            .with_agent(
                AgentConfig::new(
                    "worker_agent",
                    1,
                    "Executes one focused subtask inside the workspace using file and shell tools.",
                )
                .with_tools(["file_read", "file_write", "shell_exec", "human_in_loop"]),
            )
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }
}

impl AgentCatalog for StaticCatalog {
    fn agent(&self, name: &str) -> Result<AgentConfig, CatalogError> {
        let agent = self
            .agents
            .get(name)
            .ok_or_else(|| CatalogError::UnknownAgent(name.to_string()))?;
        if agent.level == 0 {
            return Err(CatalogError::InvalidAgent {
                name: name.to_string(),
                reason: "level 0 is reserved for tools".to_string(),
            });
        }
        Ok(agent.clone())
    }
}
