use super::schema::{AppConfig, PartialConfig};
use std::path::PathBuf;

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            model: self.model.or(fallback.model),
            workspace: self.workspace.or(fallback.workspace),
            state_dir: self.state_dir.or(fallback.state_dir),
            agent: self.agent.or(fallback.agent),
            max_turns: self.max_turns.or(fallback.max_turns),
            max_depth: self.max_depth.or(fallback.max_depth),
            shell_timeout_secs: self.shell_timeout_secs.or(fallback.shell_timeout_secs),
            poll_interval_ms: self.poll_interval_ms.or(fallback.poll_interval_ms),
            watch_interval_ms: self.watch_interval_ms.or(fallback.watch_interval_ms),
            hil_timeout_secs: self.hil_timeout_secs.or(fallback.hil_timeout_secs),
            confirm_timeout_secs: self.confirm_timeout_secs.or(fallback.confirm_timeout_secs),
            auto_mode: self.auto_mode.or(fallback.auto_mode),
            stop_grace_secs: self.stop_grace_secs.or(fallback.stop_grace_secs),
        }
    }

    /// Convert to AppConfig, filling any remaining gaps with defaults.
    pub fn finalize(self) -> AppConfig {
        let state_dir = self.state_dir.unwrap_or_else(default_state_dir);

        AppConfig {
            model: self.model.unwrap_or_else(|| "llama3.2".to_string()),
            workspace: self.workspace.unwrap_or_else(|| PathBuf::from(".")),
            state_dir,
            agent: self.agent.unwrap_or_else(|| "alpha_agent".to_string()),
            max_turns: self.max_turns.unwrap_or(50),
            max_depth: self.max_depth.unwrap_or(5),
            shell_timeout_secs: self.shell_timeout_secs.unwrap_or(30),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(1000),
            watch_interval_ms: self.watch_interval_ms.unwrap_or(2000),
            hil_timeout_secs: self.hil_timeout_secs.unwrap_or(1800),
            confirm_timeout_secs: self.confirm_timeout_secs.unwrap_or(600),
            auto_mode: self.auto_mode.unwrap_or(false),
            stop_grace_secs: self.stop_grace_secs.unwrap_or(5),
        }
    }
}

/// Platform data directory for persisted workspace state.
/// Linux: ~/.local/share/stratum/conversations
fn default_state_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "stratum")
        .map(|dirs| dirs.data_dir().join("conversations"))
        .unwrap_or_else(|| PathBuf::from(".stratum/conversations"))
}
