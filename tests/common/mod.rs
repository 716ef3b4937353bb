//! Shared fixtures for the integration tests: a scripted model, a recording
//! tool executor, and a runtime wired to a temporary state directory.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;

use stratum::agent::catalog::StaticCatalog;
use stratum::agent::events::EventSink;
use stratum::agent::model::{ModelClient, ModelRequest, ModelTurn, ToolRequest};
use stratum::agent::tools::{ToolExecutor, ToolSpec};
use stratum::agent::types::RunStatus;
use stratum::config::{AppConfig, PartialConfig};
use stratum::error::{ModelError, ToolError};
use stratum::session::Runtime;

// ============================================================
// Scripted model
// ============================================================

/// Model client that replays a fixed list of turns per agent and records every
/// request it receives.
#[derive(Default)]
pub struct ScriptedModel {
    scripts: Mutex<HashMap<String, VecDeque<ModelTurn>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, agent: &str, turns: Vec<ModelTurn>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(agent.to_string())
            .or_default()
            .extend(turns);
        self
    }

    /// Requests made on behalf of `agent`, in order.
    pub fn requests_for(&self, agent: &str) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.agent.name == agent)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn next_turn(&self, request: &ModelRequest) -> Result<ModelTurn, ModelError> {
        self.requests.lock().unwrap().push(request.clone());
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&request.agent.name)
            .and_then(VecDeque::pop_front)
            .ok_or(ModelError::Exhausted(request.turn))
    }
}

pub fn call(call_id: &str, name: &str, arguments: Value) -> ModelTurn {
    ModelTurn::Act {
        thinking: None,
        calls: vec![ToolRequest::new(call_id, name, arguments)],
    }
}

pub fn delegate(call_id: &str, agent: &str, task: &str) -> ModelTurn {
    call(call_id, agent, json!({ "task_input": task }))
}

pub fn finish(output: &str) -> ModelTurn {
    ModelTurn::Finish {
        status: RunStatus::Success,
        output: output.to_string(),
    }
}

pub fn fail(output: &str) -> ModelTurn {
    ModelTurn::Finish {
        status: RunStatus::Error,
        output: output.to_string(),
    }
}

// ============================================================
// Recording tools
// ============================================================

/// Tool executor that records calls and answers `ok: <tool>`.
#[derive(Default)]
pub struct RecordingTools {
    calls: Mutex<Vec<(String, Value)>>,
}

impl RecordingTools {
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for RecordingTools {
    fn specs(&self) -> Vec<ToolSpec> {
        ["file_read", "file_write", "shell_exec"]
            .into_iter()
            .map(|name| ToolSpec {
                name: name.to_string(),
                description: format!("test {name}"),
                parameters: json!({ "type": "object" }),
            })
            .collect()
    }

    async fn execute(&self, _workspace: &Path, name: &str, arguments: &Value) -> Result<String, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));
        Ok(format!("ok: {name}"))
    }
}

// ============================================================
// Runtime fixture
// ============================================================

pub struct Fixture {
    pub state: TempDir,
    pub workspace: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            state: tempfile::tempdir().unwrap(),
            workspace: tempfile::tempdir().unwrap(),
        }
    }

    pub fn workspace_path(&self) -> PathBuf {
        self.workspace.path().to_path_buf()
    }

    pub fn config(&self, auto_mode: bool) -> AppConfig {
        PartialConfig {
            workspace: Some(self.workspace_path()),
            state_dir: Some(self.state.path().to_path_buf()),
            poll_interval_ms: Some(10),
            auto_mode: Some(auto_mode),
            ..Default::default()
        }
        .finalize()
    }

    pub fn runtime(&self, config: AppConfig, model: Arc<ScriptedModel>, tools: Arc<RecordingTools>) -> Runtime {
        Runtime::new(
            config,
            Arc::new(StaticCatalog::builtin()),
            model,
            tools,
            EventSink::disabled(),
        )
    }

    /// Workspace key string used by the coordination registries.
    pub fn key(&self, runtime: &Runtime) -> String {
        runtime
            .registry
            .manager_for(&self.workspace_path())
            .workspace_key()
            .as_str()
            .to_string()
    }
}

/// Poll `probe` until it yields a value (real time, bounded).
pub async fn eventually<T>(mut probe: impl FnMut() -> Option<T>) -> T {
    for _ in 0..500 {
        if let Some(value) = probe() {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
