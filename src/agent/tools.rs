//! Tool schemas and the built-in tool implementations.
//!
//! The executor talks to tools through the [`ToolExecutor`] trait.
//! [`BuiltinTools`] provides the three core tools (`shell_exec`, `file_read`,
//! `file_write`); `human_in_loop` and sub-agent calls are handled by the
//! executor itself and only contribute schemas here.
//!
//! Tool failures are returned as [`ToolError`] values, which the executor turns
//! into `error` tool results so the model can observe them and react.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::catalog::AgentConfig;
use crate::error::ToolError;
use crate::exec::execute_shell;

/// Name of the built-in human-in-the-loop tool.
pub const HUMAN_IN_LOOP: &str = "human_in_loop";

/// Schema of one callable tool, as presented to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Schemas of every tool this executor implements.
    fn specs(&self) -> Vec<ToolSpec>;

    /// Run `name` with `arguments` inside `workspace`.
    async fn execute(
        &self,
        workspace: &Path,
        name: &str,
        arguments: &serde_json::Value,
    ) -> Result<String, ToolError>;
}

/// Schema for the `human_in_loop` tool.
pub fn human_in_loop_spec() -> ToolSpec {
    ToolSpec {
        name: HUMAN_IN_LOOP.to_string(),
        description: "Ask the human operator to do something only they can do (sign in, \
                      upload a file, make a decision) and wait for their reply. Returns the \
                      reply, or a cancelled/timeout status."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "instruction": {
                    "type": "string",
                    "description": "What the human should do"
                },
                "hil_id": {
                    "type": "string",
                    "description": "Optional identifier for the request"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Seconds to wait before giving up"
                }
            },
            "required": ["instruction"]
        }),
    }
}

/// Schema that lets a parent call `agent` as a tool.
pub fn sub_agent_spec(agent: &AgentConfig) -> ToolSpec {
    ToolSpec {
        name: agent.name.clone(),
        description: format!("Delegate a subtask to {}. {}", agent.name, agent.description),
        parameters: json!({
            "type": "object",
            "properties": {
                "task_input": {
                    "type": "string",
                    "description": "Complete, self-contained description of the subtask"
                }
            },
            "required": ["task_input"]
        }),
    }
}

/// `shell_exec`, `file_read` and `file_write`.
#[derive(Clone, Debug)]
pub struct BuiltinTools {
    shell_timeout_secs: u64,
}

impl BuiltinTools {
    pub fn new(shell_timeout_secs: u64) -> Self {
        Self { shell_timeout_secs }
    }
}

#[async_trait]
impl ToolExecutor for BuiltinTools {
    fn specs(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: "shell_exec".to_string(),
                description: "Execute a shell command in the workspace directory. \
                              The command runs via `sh -c` with the workspace as the working \
                              directory. Returns stdout, then stderr and the exit code when notable."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "command": {
                            "type": "string",
                            "description": "The shell command to execute"
                        }
                    },
                    "required": ["command"]
                }),
            },
            ToolSpec {
                name: "file_read".to_string(),
                description: "Read the contents of a file. The path can be relative to the \
                              workspace root or an absolute path."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "File path, relative to workspace or absolute"
                        }
                    },
                    "required": ["path"]
                }),
            },
            ToolSpec {
                name: "file_write".to_string(),
                description: "Write content to a file within the workspace directory. The path \
                              must be relative to the workspace root. Parent directories are \
                              created automatically. Writes outside the workspace are rejected."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "File path relative to the workspace root"
                        },
                        "content": {
                            "type": "string",
                            "description": "Content to write to the file"
                        }
                    },
                    "required": ["path", "content"]
                }),
            },
        ]
    }

    async fn execute(
        &self,
        workspace: &Path,
        name: &str,
        arguments: &serde_json::Value,
    ) -> Result<String, ToolError> {
        match name {
            "shell_exec" => {
                let command = string_arg(name, arguments, "command")?;
                tokio::fs::create_dir_all(workspace)
                    .await
                    .map_err(|e| failed(name, e))?;
                let result = execute_shell(command, workspace, self.shell_timeout_secs)
                    .await
                    .map_err(|e| failed(name, e))?;
                Ok(result.render())
            }
            "file_read" => {
                let path = string_arg(name, arguments, "path")?;
                let full_path = if Path::new(path).is_absolute() {
                    PathBuf::from(path)
                } else {
                    workspace.join(path)
                };
                tokio::fs::read_to_string(&full_path)
                    .await
                    .map_err(|e| failed(name, e))
            }
            "file_write" => {
                let path = string_arg(name, arguments, "path")?;
                let content = string_arg(name, arguments, "content")?;
                let full_path = confine(workspace, path).ok_or_else(|| ToolError::OutsideWorkspace {
                    tool: name.to_string(),
                    path: path.to_string(),
                })?;
                if let Some(parent) = full_path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| failed(name, e))?;
                }
                tokio::fs::write(&full_path, content)
                    .await
                    .map_err(|e| failed(name, e))?;
                Ok(json!({ "written_bytes": content.len(), "path": path }).to_string())
            }
            unknown => Err(ToolError::UnknownTool(unknown.to_string())),
        }
    }
}

fn string_arg<'a>(
    tool: &str,
    arguments: &'a serde_json::Value,
    key: &str,
) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArgument {
            tool: tool.to_string(),
            argument: key.to_string(),
        })
}

fn failed(tool: &str, err: impl std::fmt::Display) -> ToolError {
    ToolError::Failed {
        tool: tool.to_string(),
        message: err.to_string(),
    }
}

/// Resolve `relative` under `workspace`, refusing absolute paths and any
/// `..` component that would climb out.
fn confine(workspace: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    let mut resolved = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if resolved.as_os_str().is_empty() {
        return None;
    }
    Some(workspace.join(resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn builtin_specs_have_expected_names() {
        let names: Vec<String> = BuiltinTools::new(5).specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["shell_exec", "file_read", "file_write"]);
    }

    #[test]
    fn confine_rejects_escapes() {
        let ws = Path::new("/ws");
        assert_eq!(confine(ws, "a/b.txt"), Some(PathBuf::from("/ws/a/b.txt")));
        assert_eq!(confine(ws, "a/../b.txt"), Some(PathBuf::from("/ws/b.txt")));
        assert_eq!(confine(ws, "../etc/passwd"), None);
        assert_eq!(confine(ws, "/etc/passwd"), None);
        assert_eq!(confine(ws, "."), None);
    }

    #[tokio::test]
    async fn write_then_read_inside_workspace() {
        let tmp = TempDir::new().unwrap();
        let tools = BuiltinTools::new(5);

        let written = tools
            .execute(
                tmp.path(),
                "file_write",
                &json!({"path": "notes/summary.md", "content": "hello"}),
            )
            .await
            .unwrap();
        assert!(written.contains("\"written_bytes\":5"));

        let read = tools
            .execute(tmp.path(), "file_read", &json!({"path": "notes/summary.md"}))
            .await
            .unwrap();
        assert_eq!(read, "hello");
    }

    #[tokio::test]
    async fn write_outside_workspace_is_refused() {
        let tmp = TempDir::new().unwrap();
        let err = BuiltinTools::new(5)
            .execute(tmp.path(), "file_write", &json!({"path": "../x", "content": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::OutsideWorkspace { .. }));
    }

    #[tokio::test]
    async fn missing_argument_is_reported() {
        let tmp = TempDir::new().unwrap();
        let err = BuiltinTools::new(5)
            .execute(tmp.path(), "shell_exec", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "shell_exec: missing or invalid 'command' argument");
    }

    #[tokio::test]
    async fn shell_exec_runs_in_workspace() {
        let tmp = TempDir::new().unwrap();
        let out = BuiltinTools::new(5)
            .execute(tmp.path(), "shell_exec", &json!({"command": "echo hi"}))
            .await
            .unwrap();
        assert_eq!(out, "hi\n");
    }
}
