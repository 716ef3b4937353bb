use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The TOML file structure for stratum.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub general: Option<GeneralConfig>,
    pub execution: Option<ExecutionConfig>,
    pub hil: Option<HilConfig>,
    pub permissions: Option<PermissionsConfig>,
    pub host: Option<HostConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub model: Option<String>,
    pub state_dir: Option<String>,
    /// Default top-level agent.
    pub agent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExecutionConfig {
    pub max_turns: Option<u32>,
    pub max_depth: Option<usize>,
    pub shell_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct HilConfig {
    pub poll_interval_ms: Option<u64>,
    pub watch_interval_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub confirm_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PermissionsConfig {
    pub auto_mode: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct HostConfig {
    pub stop_grace_secs: Option<u64>,
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub model: String,
    pub workspace: PathBuf,
    pub state_dir: PathBuf,
    pub agent: String,
    pub max_turns: u32,
    pub max_depth: usize,
    pub shell_timeout_secs: u64,
    /// Re-check interval for blocked HIL/confirmation waits.
    pub poll_interval_ms: u64,
    /// Scan interval of the front-end pending watcher.
    pub watch_interval_ms: u64,
    /// Default timeout for HIL tasks that do not specify one.
    pub hil_timeout_secs: u64,
    pub confirm_timeout_secs: u64,
    pub auto_mode: bool,
    pub stop_grace_secs: u64,
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub model: Option<String>,
    pub workspace: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub agent: Option<String>,
    pub max_turns: Option<u32>,
    pub max_depth: Option<usize>,
    pub shell_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub watch_interval_ms: Option<u64>,
    pub hil_timeout_secs: Option<u64>,
    pub confirm_timeout_secs: Option<u64>,
    pub auto_mode: Option<bool>,
    pub stop_grace_secs: Option<u64>,
}

impl ConfigFile {
    /// Flatten the sectioned file layout into a [`PartialConfig`].
    pub fn to_partial(self) -> PartialConfig {
        let general = self.general;
        let execution = self.execution;
        let hil = self.hil;

        PartialConfig {
            model: general.as_ref().and_then(|g| g.model.clone()),
            workspace: None,
            state_dir: general
                .as_ref()
                .and_then(|g| g.state_dir.as_ref())
                .map(PathBuf::from),
            agent: general.as_ref().and_then(|g| g.agent.clone()),
            max_turns: execution.as_ref().and_then(|e| e.max_turns),
            max_depth: execution.as_ref().and_then(|e| e.max_depth),
            shell_timeout_secs: execution.as_ref().and_then(|e| e.shell_timeout_secs),
            poll_interval_ms: hil.as_ref().and_then(|h| h.poll_interval_ms),
            watch_interval_ms: hil.as_ref().and_then(|h| h.watch_interval_ms),
            hil_timeout_secs: hil.as_ref().and_then(|h| h.timeout_secs),
            confirm_timeout_secs: hil.as_ref().and_then(|h| h.confirm_timeout_secs),
            auto_mode: self.permissions.and_then(|p| p.auto_mode),
            stop_grace_secs: self.host.and_then(|h| h.stop_grace_secs),
        }
    }
}
