use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::io::BufReader;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use stratum::agent::events::EventSink;
use stratum::cli::{Cli, Commands};
use stratum::config::{self, AppConfig};
use stratum::error::SessionError;
use stratum::frontend::{ChatOptions, run_chat, serve_control};
use stratum::orchestration::registry::HierarchyRegistry;
use stratum::orchestration::types::ResumeOutcome;
use stratum::session::{RunReport, RunRequest, Runtime, resume_run, start_run};

/// Exit status of a run cancelled by a signal (128 + SIGINT).
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize tracing. Stdout is reserved for JSONL events.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    if let Commands::Config { common, set } = &cli.command {
        if !set.is_empty() {
            let path = config::editable_config_path(common);
            config::set_config_values(&path, set)?;
            eprintln!("Updated {}", path.display());
        }
    }
    let config = config::load_config(&cli)?;
    tracing::info!(
        model = %config.model,
        workspace = %config.workspace.display(),
        state_dir = %config.state_dir.display(),
        "Config loaded"
    );

    match cli.command {
        Commands::Run {
            input,
            force_new,
            jsonl,
            ..
        } => {
            let runtime = Runtime::from_config(config.clone(), event_sink(jsonl));
            let cancel = shutdown_token();
            let control = spawn_control(&runtime, jsonl, &cancel);
            let request = RunRequest {
                workspace: config.workspace.clone(),
                agent_name: config.agent.clone(),
                user_input: input,
                force_new,
                auto_mode: Some(config.auto_mode),
            };
            let outcome = start_run(&runtime, request, cancel).await;
            control.cancel();
            exit_after_run(outcome, jsonl)
        }
        Commands::Resume { jsonl, .. } => {
            let runtime = Runtime::from_config(config.clone(), event_sink(jsonl));
            let cancel = shutdown_token();
            let control = spawn_control(&runtime, jsonl, &cancel);
            let outcome = resume_run(
                &runtime,
                config.workspace.clone(),
                Some(config.auto_mode),
                cancel,
            )
            .await;
            control.cancel();
            exit_after_run(outcome, jsonl)
        }
        Commands::Reset { .. } => {
            let registry = HierarchyRegistry::new(config.state_dir.clone());
            let manager = registry.manager_for(&config.workspace);
            let discarded = manager.force_reset()?;
            println!(
                "Reset workspace {} ({discarded} interrupted frame(s) discarded)",
                manager.workspace_key()
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status { json, .. } => {
            print_status(&config, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Chat {
            ref common,
            ref agent,
            ..
        } => {
            let options = ChatOptions {
                program: std::env::current_exe()?,
                config_path: common.config.clone(),
                agent: agent.clone(),
            };
            run_chat(config, options).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { .. } => {
            print!("{}", config::render_config(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn event_sink(jsonl: bool) -> EventSink {
    if jsonl {
        EventSink::stdout(Uuid::new_v4().to_string())
    } else {
        EventSink::disabled()
    }
}

/// Token cancelled on Ctrl-C or SIGTERM. A cancelled run keeps its stack so
/// `resume` can pick it up.
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
                token.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
        tracing::warn!("Shutdown requested, cancelling run");
        token.cancel();
    });
    cancel
}

/// Serve HIL answers and confirmations from stdin for the duration of a run.
fn spawn_control(runtime: &Runtime, jsonl: bool, cancel: &CancellationToken) -> CancellationToken {
    let stop = cancel.child_token();
    let workspace = runtime
        .registry
        .manager_for(&runtime.config.workspace)
        .workspace_key()
        .as_str()
        .to_string();
    tokio::spawn(serve_control(
        runtime.coordination.clone(),
        workspace,
        BufReader::new(tokio::io::stdin()),
        std::io::stderr(),
        jsonl,
        Duration::from_millis(runtime.config.watch_interval_ms),
        stop.clone(),
    ));
    stop
}

fn exit_after_run(outcome: Result<RunReport, SessionError>, jsonl: bool) -> anyhow::Result<ExitCode> {
    let code = match outcome {
        Ok(report) => {
            let result = &report.result;
            if !jsonl {
                if result.is_success() {
                    println!("{}", result.output);
                } else {
                    eprintln!(
                        "Run failed: {}",
                        result.error_information.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            tracing::info!(
                status = ?result.status,
                duration_ms = report.duration.as_millis() as u64,
                "Run finished"
            );
            if result.is_cancelled() {
                EXIT_CANCELLED
            } else if result.is_success() {
                0
            } else {
                1
            }
        }
        Err(SessionError::NothingToResume(message)) => {
            eprintln!("{message}");
            1
        }
        Err(e @ SessionError::StaleTask { .. }) => {
            eprintln!("{e}");
            1
        }
        Err(e) => return Err(e.into()),
    };

    // The stdin reader of the control channel may still be blocked on a read,
    // which would hold the runtime open on return.
    std::process::exit(i32::from(code));
}

fn print_status(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let registry = HierarchyRegistry::new(config.state_dir.clone());
    let manager = registry.manager_for(&config.workspace);
    let outcome = manager.resume();

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let context = manager.context();
    println!("Workspace: {} ({})", config.workspace.display(), manager.workspace_key());
    println!("Instructions recorded: {}", context.instructions.len());
    match outcome {
        ResumeOutcome::Found {
            agent_name,
            user_input,
            interrupted_at,
            stack_depth,
        } => {
            println!("Interrupted task: {agent_name} (depth {stack_depth}, started {interrupted_at})");
            println!("  {user_input}");
        }
        ResumeOutcome::NotFound { message } => println!("{message}"),
    }
    Ok(())
}
