//! Tool risk classification.
//!
//! Maps a tool call to a [`ToolCategory`]. In manual permission mode the
//! executor gates every category for which [`ToolCategory::is_mutating`] holds.
//! Names missing from the tables classify as `Other`, which is gated: a tool
//! has to be known read-only to skip confirmation.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    ReadOnly,
    FileWrite,
    CodeExecution,
    PackageInstall,
    Network,
    Delegation,
    Human,
    Other,
}

impl ToolCategory {
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            ToolCategory::ReadOnly | ToolCategory::Delegation | ToolCategory::Human
        )
    }
}

const READ_ONLY: &[&str] = &[
    "file_read",
    "read_file",
    "list_dir",
    "list_files",
    "dir_list",
    "grep",
    "glob",
    "file_search",
];

const FILE_WRITE: &[&str] = &[
    "file_write",
    "write_file",
    "edit_file",
    "append_file",
    "delete_file",
    "move_file",
    "copy_file",
    "make_dir",
];

const CODE_EXECUTION: &[&str] = &[
    "shell_exec",
    "execute_code",
    "execute_command",
    "run_python",
    "python_exec",
    "bash",
];

const PACKAGE_INSTALL: &[&str] = &["pip_install", "install_package", "npm_install"];

const NETWORK: &[&str] = &["web_fetch", "web_search", "http_request", "download"];

/// Package-manager installs hidden inside a shell command.
static INSTALL_COMMAND: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(pip3?|python3?\s+-m\s+pip|npm|pnpm|yarn|cargo|apt(-get)?|brew|conda|poetry|gem)\s+(install|add)\b",
    )
    .ok()
});

/// Classify a call by tool name, looking at `arguments` where the name alone
/// is ambiguous (a shell command that installs packages).
pub fn classify(tool_name: &str, arguments: &serde_json::Value) -> ToolCategory {
    let name = tool_name.to_ascii_lowercase();

    if name == "human_in_loop" {
        return ToolCategory::Human;
    }
    if PACKAGE_INSTALL.contains(&name.as_str()) {
        return ToolCategory::PackageInstall;
    }
    if CODE_EXECUTION.contains(&name.as_str()) {
        let command = arguments
            .get("command")
            .or_else(|| arguments.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let installs = INSTALL_COMMAND
            .as_ref()
            .is_some_and(|re| re.is_match(command));
        return if installs {
            ToolCategory::PackageInstall
        } else {
            ToolCategory::CodeExecution
        };
    }
    if FILE_WRITE.contains(&name.as_str()) {
        return ToolCategory::FileWrite;
    }
    if READ_ONLY.contains(&name.as_str()) {
        return ToolCategory::ReadOnly;
    }
    if NETWORK.contains(&name.as_str()) {
        return ToolCategory::Network;
    }
    if name.ends_with("_agent") {
        return ToolCategory::Delegation;
    }
    ToolCategory::Other
}
