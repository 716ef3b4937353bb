pub mod merge;
pub mod schema;

pub use schema::*;

use crate::cli::{Cli, CommonArgs, Commands};
use anyhow::{Context, anyhow, bail};
use std::path::{Path, PathBuf};

/// Load configuration by merging global, workspace, and CLI sources.
/// Precedence: CLI > workspace config > global config > defaults.
///
/// An explicit `--config` file takes the place of the global config.
/// Missing config files are handled gracefully (defaults apply).
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let common = cli.command.common();

    // Layer 1: Global config (~/.config/stratum/stratum.toml or platform equivalent)
    let global = match &common.config {
        Some(path) => load_explicit_config(path)?,
        None => load_global_config(),
    };

    // Layer 2: Workspace config (workspace/stratum.toml)
    let workspace_path = common
        .workspace
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let workspace = load_workspace_config(&workspace_path);

    // Layer 3: CLI args (converted to PartialConfig)
    let cli_partial = cli_to_partial(cli);

    // Merge: CLI > workspace > global > defaults
    let config = cli_partial
        .with_fallback(workspace)
        .with_fallback(global)
        .finalize();

    Ok(config)
}

/// Load global config from the platform-specific config directory.
/// Returns empty PartialConfig if file not found.
fn load_global_config() -> PartialConfig {
    let path = global_config_path();
    match path {
        Some(p) => load_toml_file(&p).unwrap_or_default(),
        None => {
            tracing::debug!("Could not determine global config directory");
            PartialConfig::default()
        }
    }
}

/// Load a config file named on the command line. Unlike the implicit layers,
/// a missing or malformed file here is an error.
fn load_explicit_config(path: &Path) -> anyhow::Result<PartialConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let config_file = toml::from_str::<ConfigFile>(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(config_file.to_partial())
}

/// Load workspace config from workspace/stratum.toml.
/// Returns empty PartialConfig if file not found.
fn load_workspace_config(workspace_path: &Path) -> PartialConfig {
    let config_path = workspace_path.join("stratum.toml");
    load_toml_file(&config_path).unwrap_or_default()
}

/// Load and parse a TOML config file into a PartialConfig.
/// Returns None on file-not-found; parse errors are logged and skipped.
fn load_toml_file(path: &Path) -> Option<PartialConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            match toml::from_str::<ConfigFile>(&contents)
                .context(format!("Failed to parse {}", path.display()))
            {
                Ok(config_file) => {
                    tracing::info!("Loaded config from {}", path.display());
                    Some(config_file.to_partial())
                }
                Err(e) => {
                    tracing::warn!("Config parse error: {:#}", e);
                    None
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Failed to read config at {}: {}", path.display(), e);
            None
        }
    }
}

/// Resolve the platform-specific global config path.
/// Linux: ~/.config/stratum/stratum.toml
/// macOS: ~/Library/Application Support/stratum/stratum.toml
fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "stratum")
        .map(|dirs| dirs.config_dir().join("stratum.toml"))
}

/// Convert CLI arguments to a PartialConfig for merging.
fn cli_to_partial(cli: &Cli) -> PartialConfig {
    let common = cli.command.common();
    let base = PartialConfig {
        workspace: common.workspace.clone(),
        state_dir: common.state_dir.clone(),
        ..Default::default()
    };

    // Flags only override when given; an absent `--auto-mode` defers to config.
    match &cli.command {
        Commands::Run {
            agent,
            model,
            auto_mode,
            ..
        } => PartialConfig {
            agent: agent.clone(),
            model: model.clone(),
            auto_mode: *auto_mode,
            ..base
        },
        Commands::Resume { auto_mode, .. } => PartialConfig {
            auto_mode: *auto_mode,
            ..base
        },
        Commands::Chat {
            agent, auto_mode, ..
        } => PartialConfig {
            agent: agent.clone(),
            auto_mode: *auto_mode,
            ..base
        },
        Commands::Reset { .. } | Commands::Status { .. } | Commands::Config { .. } => base,
    }
}

// ---------------------------------------------------------------------------
// `stratum config`
// ---------------------------------------------------------------------------

/// Render the merged configuration as TOML.
pub fn render_config(config: &AppConfig) -> anyhow::Result<String> {
    toml::to_string_pretty(config).context("Failed to render config")
}

/// File edited by `stratum config --set`: the `--config` file when given,
/// otherwise the workspace's `stratum.toml`.
pub fn editable_config_path(common: &CommonArgs) -> PathBuf {
    match &common.config {
        Some(path) => path.clone(),
        None => common
            .workspace
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stratum.toml"),
    }
}

#[derive(Debug, Clone, Copy)]
enum ValueKind {
    Text,
    Integer,
    Boolean,
}

/// Keys accepted by `--set`, by file section.
const SETTABLE_KEYS: &[(&str, &str, ValueKind)] = &[
    ("general", "model", ValueKind::Text),
    ("general", "state_dir", ValueKind::Text),
    ("general", "agent", ValueKind::Text),
    ("execution", "max_turns", ValueKind::Integer),
    ("execution", "max_depth", ValueKind::Integer),
    ("execution", "shell_timeout_secs", ValueKind::Integer),
    ("hil", "poll_interval_ms", ValueKind::Integer),
    ("hil", "watch_interval_ms", ValueKind::Integer),
    ("hil", "timeout_secs", ValueKind::Integer),
    ("hil", "confirm_timeout_secs", ValueKind::Integer),
    ("permissions", "auto_mode", ValueKind::Boolean),
    ("host", "stop_grace_secs", ValueKind::Integer),
];

/// Apply `section.key=value` assignments to the TOML file at `path`,
/// creating it if needed. Other contents of the file are kept. Nothing is
/// written unless every assignment is valid.
pub fn set_config_values(path: &Path, assignments: &[String]) -> anyhow::Result<()> {
    let mut table = match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str::<toml::Table>(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => toml::Table::new(),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read config at {}", path.display()));
        }
    };

    for assignment in assignments {
        let (section, key, value) = parse_assignment(assignment)?;
        let entry = table
            .entry(section.clone())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        let Some(section_table) = entry.as_table_mut() else {
            bail!("`{section}` in {} is not a table", path.display());
        };
        section_table.insert(key, value);
    }

    let rendered = toml::to_string_pretty(&table).context("Failed to render config")?;
    toml::from_str::<ConfigFile>(&rendered)
        .with_context(|| format!("Edited config for {} is invalid", path.display()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, rendered)
        .with_context(|| format!("Failed to write config at {}", path.display()))?;
    tracing::info!(path = %path.display(), count = assignments.len(), "Config updated");
    Ok(())
}

fn parse_assignment(assignment: &str) -> anyhow::Result<(String, String, toml::Value)> {
    let (name, raw) = assignment
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected SECTION.KEY=VALUE, got `{assignment}`"))?;
    let (name, raw) = (name.trim(), raw.trim());
    let (section, key) = name
        .split_once('.')
        .ok_or_else(|| anyhow!("Expected SECTION.KEY=VALUE, got `{assignment}`"))?;
    let kind = SETTABLE_KEYS
        .iter()
        .find(|(s, k, _)| *s == section && *k == key)
        .map(|(_, _, kind)| *kind)
        .ok_or_else(|| anyhow!("Unknown config key `{name}`"))?;

    let value = match kind {
        ValueKind::Text => toml::Value::String(raw.to_string()),
        ValueKind::Integer => toml::Value::Integer(
            raw.parse::<i64>()
                .with_context(|| format!("`{name}` expects an integer, got `{raw}`"))?,
        ),
        ValueKind::Boolean => toml::Value::Boolean(
            raw.parse::<bool>()
                .with_context(|| format!("`{name}` expects true or false, got `{raw}`"))?,
        ),
    };
    Ok((section.to_string(), key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn workspace_file_is_layered_under_cli() {
        let ws = tempfile::tempdir().unwrap();
        std::fs::write(
            ws.path().join("stratum.toml"),
            "[general]\nmodel = \"from-workspace\"\nagent = \"beta_agent\"\n\n[execution]\nmax_depth = 3\n",
        )
        .unwrap();
        let explicit = ws.path().join("explicit.toml");
        std::fs::write(&explicit, "[hil]\ntimeout_secs = 42\n").unwrap();

        let cli = Cli::parse_from([
            "stratum",
            "run",
            "--workspace",
            ws.path().to_str().unwrap(),
            "--config",
            explicit.to_str().unwrap(),
            "--input",
            "hello",
            "--model",
            "from-cli",
        ]);
        let config = load_config(&cli).unwrap();

        assert_eq!(config.model, "from-cli");
        assert_eq!(config.agent, "beta_agent");
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.hil_timeout_secs, 42);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let cli = Cli::parse_from(["stratum", "status", "--config", "/nonexistent/stratum.toml"]);
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn auto_mode_flag_only_overrides_when_set() {
        let ws = tempfile::tempdir().unwrap();
        std::fs::write(ws.path().join("stratum.toml"), "[permissions]\nauto_mode = true\n").unwrap();
        let cli = Cli::parse_from([
            "stratum",
            "resume",
            "--workspace",
            ws.path().to_str().unwrap(),
            "--config",
            ws.path().join("stratum.toml").to_str().unwrap(),
        ]);
        assert!(load_config(&cli).unwrap().auto_mode);
    }

    #[test]
    fn auto_mode_false_overrides_the_config_file() {
        let ws = tempfile::tempdir().unwrap();
        std::fs::write(ws.path().join("stratum.toml"), "[permissions]\nauto_mode = true\n").unwrap();
        let workspace = ws.path().to_str().unwrap();

        let cli = Cli::parse_from(["stratum", "run", "-w", workspace, "-i", "x", "--auto-mode", "false"]);
        assert!(!load_config(&cli).unwrap().auto_mode);

        let cli = Cli::parse_from(["stratum", "chat", "-w", workspace, "--auto-mode=false"]);
        assert!(!load_config(&cli).unwrap().auto_mode);

        // A bare flag still means "on".
        let bare = Cli::parse_from(["stratum", "resume", "--auto-mode"]);
        assert_eq!(cli_to_partial(&bare).auto_mode, Some(true));
    }

    #[test]
    fn set_updates_the_workspace_file() {
        let ws = tempfile::tempdir().unwrap();
        let path = ws.path().join("stratum.toml");
        std::fs::write(&path, "[general]\nmodel = \"kept\"\n").unwrap();

        set_config_values(
            &path,
            &["hil.timeout_secs=600".to_string(), "permissions.auto_mode = true".to_string()],
        )
        .unwrap();

        let cli = Cli::parse_from(["stratum", "config", "-w", ws.path().to_str().unwrap()]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.model, "kept");
        assert_eq!(config.hil_timeout_secs, 600);
        assert!(config.auto_mode);
    }

    #[test]
    fn set_rejects_bad_assignments_without_writing() {
        let ws = tempfile::tempdir().unwrap();
        let path = ws.path().join("stratum.toml");

        for bad in ["hil.bogus=1", "timeout_secs=5", "execution.max_depth=-1", "permissions.auto_mode=maybe"] {
            assert!(set_config_values(&path, &[bad.to_string()]).is_err(), "{bad} was accepted");
        }
        assert!(!path.exists());
    }

    #[test]
    fn merged_config_renders_as_toml() {
        let config = PartialConfig {
            workspace: Some(PathBuf::from("/tmp/ws")),
            max_depth: Some(7),
            ..Default::default()
        }
        .finalize();

        let rendered: toml::Table = toml::from_str(&render_config(&config).unwrap()).unwrap();
        assert_eq!(rendered["max_depth"].as_integer(), Some(7));
        assert_eq!(rendered["workspace"].as_str(), Some("/tmp/ws"));
        assert_eq!(rendered["auto_mode"].as_bool(), Some(false));
    }
}
