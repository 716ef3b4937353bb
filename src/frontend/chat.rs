//! Interactive front end that hosts each task in a child process.
//!
//! `stratum chat` reads lines from the terminal. A plain line starts a task by
//! spawning `stratum run --jsonl` through [`HostedRun`]; the child's JSONL
//! events are rendered as they arrive, and answers to HIL tasks or tool
//! confirmations are written back to the child's stdin as control commands.
//! Stopping a task terminates the child's process group, which leaves the
//! workspace stack in place for `/resume`.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::ChildStdin;
use tokio::sync::mpsc;

use super::control::ControlCommand;
use crate::config::AppConfig;
use crate::exec::{HostedRun, StopOutcome};
use crate::orchestration::registry::HierarchyRegistry;
use crate::orchestration::types::ResumeOutcome;

const HELP: &str = "\
Type a task to run it. While a task is running, lines answer its pending prompts.
  /resume   relaunch the interrupted task for this workspace
  /stop     stop the running task (it stays resumable)
  /status   show whether an interrupted task exists
  /help     show this message
  /quit     stop any running task and exit";

/// Everything needed to launch child runs.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub program: PathBuf,
    pub config_path: Option<PathBuf>,
    pub agent: Option<String>,
}

/// What the child should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    Run(String),
    Resume,
}

/// Messages from the child's stdout reader task.
#[derive(Debug)]
enum ChildMessage {
    Event(Value),
    Closed,
}

/// A prompt announced by the child and not yet answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    Hil { hil_id: String },
    Confirm { confirm_id: String },
}

struct ActiveRun {
    host: HostedRun,
    stdin: ChildStdin,
    prompts: VecDeque<Prompt>,
}

/// Command line for a child run.
pub fn child_args(config: &AppConfig, options: &ChatOptions, launch: &Launch) -> Vec<String> {
    let mut args = match launch {
        Launch::Run(input) => vec!["run".to_string(), "--input".to_string(), input.clone()],
        Launch::Resume => vec!["resume".to_string()],
    };
    args.push("--jsonl".to_string());
    args.push("--workspace".to_string());
    args.push(config.workspace.display().to_string());
    args.push("--state-dir".to_string());
    args.push(config.state_dir.display().to_string());
    if let Some(path) = &options.config_path {
        args.push("--config".to_string());
        args.push(path.display().to_string());
    }
    if let Launch::Run(_) = launch {
        args.push("--agent".to_string());
        args.push(options.agent.clone().unwrap_or_else(|| config.agent.clone()));
        args.push("--model".to_string());
        args.push(config.model.clone());
    }
    // Always explicit, so the child's own config files cannot flip the mode
    // the front end resolved.
    args.push(format!("--auto-mode={}", config.auto_mode));
    args
}

/// Human-readable rendering of one JSONL event. `None` for events not shown.
pub fn render_event(event: &Value) -> Option<String> {
    let field = |name: &str| event.get(name).and_then(Value::as_str).unwrap_or_default();

    match field("type") {
        "start" => Some(format!("Starting {} in {}", field("agent"), field("workspace"))),
        "token" => {
            let text = field("text").trim();
            (!text.is_empty()).then(|| format!("[{}] {text}", field("agent")))
        }
        "progress" => Some(format!(
            "[{}] turn {}/{}",
            field("agent"),
            event.get("turn").and_then(Value::as_u64).unwrap_or_default(),
            event.get("max_turns").and_then(Value::as_u64).unwrap_or_default()
        )),
        "notice" => Some(field("message").to_string()),
        "warn" => Some(format!("warning: {}", field("message"))),
        "error" => Some(format!("error: {}", field("message"))),
        "human_in_loop" => Some(format!(
            "[human] {} (id {}). Type your reply, or /cancel [reason].",
            field("instruction"),
            field("hil_id")
        )),
        "tool_confirmation" => Some(format!(
            "[confirm] {} {} -- allow? [y/n]",
            field("tool_name"),
            event.get("arguments").cloned().unwrap_or(Value::Null)
        )),
        "tool_call" => Some(format!(
            "[{}] {} -> {}",
            field("agent"),
            field("tool_name"),
            field("status")
        )),
        "agent_call" => Some(format!(
            "[{}] delegating to {} (depth {})",
            field("parent"),
            field("agent"),
            event.get("depth").and_then(Value::as_u64).unwrap_or_default()
        )),
        "result" => {
            let mut text = format!("Result ({}): {}", field("status"), field("output"));
            if let Some(info) = event.get("error_information").and_then(Value::as_str) {
                text.push_str(&format!("\n  {info}"));
            }
            Some(text)
        }
        _ => None,
    }
}

/// Prompt announced by `event`, if any.
pub fn prompt_for(event: &Value) -> Option<Prompt> {
    let id = |name: &str| event.get(name).and_then(Value::as_str).map(str::to_string);
    match event.get("type").and_then(Value::as_str)? {
        "human_in_loop" => Some(Prompt::Hil { hil_id: id("hil_id")? }),
        "tool_confirmation" => Some(Prompt::Confirm {
            confirm_id: id("confirm_id")?,
        }),
        _ => None,
    }
}

/// Translate a typed answer into a control command for `prompt`.
pub fn answer(prompt: &Prompt, line: &str) -> Option<ControlCommand> {
    let line = line.trim();
    match prompt {
        Prompt::Hil { hil_id } => {
            if let Some(rest) = line.strip_prefix("/cancel") {
                let reason = rest.trim();
                return Some(ControlCommand::HilCancel {
                    hil_id: hil_id.clone(),
                    reason: (!reason.is_empty()).then(|| reason.to_string()),
                });
            }
            (!line.is_empty()).then(|| ControlCommand::HilRespond {
                hil_id: hil_id.clone(),
                response: line.to_string(),
            })
        }
        Prompt::Confirm { confirm_id } => match line.to_ascii_lowercase().as_str() {
            "y" | "yes" => Some(ControlCommand::Confirm {
                confirm_id: confirm_id.clone(),
                approved: true,
            }),
            "n" | "no" => Some(ControlCommand::Confirm {
                confirm_id: confirm_id.clone(),
                approved: false,
            }),
            _ => None,
        },
    }
}

fn launch(
    config: &AppConfig,
    options: &ChatOptions,
    what: &Launch,
    tx: &mpsc::UnboundedSender<ChildMessage>,
) -> anyhow::Result<ActiveRun> {
    let args = child_args(config, options, what);
    let mut host = HostedRun::spawn(&options.program, &args, &config.workspace)?;
    let stdin = host
        .take_stdin()
        .ok_or_else(|| anyhow::anyhow!("hosted run has no stdin"))?;
    let stdout = host
        .take_stdout()
        .ok_or_else(|| anyhow::anyhow!("hosted run has no stdout"))?;

    // -- Forward child events until its stdout closes
    let tx = tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match serde_json::from_str::<Value>(&line) {
                Ok(event) => {
                    if tx.send(ChildMessage::Event(event)).is_err() {
                        return;
                    }
                }
                Err(e) => tracing::debug!("Skipping non-JSON child output: {e}"),
            }
        }
        let _ = tx.send(ChildMessage::Closed);
    });

    Ok(ActiveRun {
        host,
        stdin,
        prompts: VecDeque::new(),
    })
}

fn print_status(registry: &HierarchyRegistry, config: &AppConfig) {
    match registry.manager_for(&config.workspace).resume() {
        ResumeOutcome::Found {
            agent_name,
            user_input,
            interrupted_at,
            stack_depth,
        } => println!(
            "Interrupted task: {agent_name} \"{user_input}\" (depth {stack_depth}, since {interrupted_at}). Use /resume."
        ),
        ResumeOutcome::NotFound { message } => println!("{message}"),
    }
}

async fn stop_run(run: &mut ActiveRun, grace: Duration) {
    match run.host.stop(grace).await {
        Ok(StopOutcome::Exited(code)) => println!("Task already finished (exit {code:?})."),
        Ok(StopOutcome::Terminated(_)) => println!("Task stopped. Use /resume to continue it."),
        Ok(StopOutcome::Killed) => println!("Task killed after {}s. Use /resume to continue it.", grace.as_secs()),
        Err(e) => eprintln!("Failed to stop task: {e}"),
    }
}

/// Run the interactive loop until `/quit` or end of input.
pub async fn run_chat(config: AppConfig, options: ChatOptions) -> anyhow::Result<()> {
    let registry = HierarchyRegistry::new(config.state_dir.clone());
    let grace = Duration::from_secs(config.stop_grace_secs);
    let (tx, mut rx) = mpsc::unbounded_channel::<ChildMessage>();
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut active: Option<ActiveRun> = None;

    println!("stratum chat -- workspace {}", config.workspace.display());
    println!("{HELP}");
    print_status(&registry, &config);

    loop {
        tokio::select! {
            Some(message) = rx.recv() => match message {
                ChildMessage::Event(event) => {
                    if let Some(text) = render_event(&event) {
                        println!("{text}");
                    }
                    if let (Some(run), Some(prompt)) = (active.as_mut(), prompt_for(&event)) {
                        run.prompts.push_back(prompt);
                    }
                }
                ChildMessage::Closed => {
                    if let Some(mut run) = active.take() {
                        match run.host.wait().await {
                            Ok(status) => tracing::debug!(code = ?status.code(), "Hosted run exited"),
                            Err(e) => tracing::warn!("Failed to reap hosted run: {e}"),
                        }
                    }
                }
            },

            line = input.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim().to_string();

                match line.as_str() {
                    "" => {}
                    "/quit" | "/exit" => break,
                    "/help" => println!("{HELP}"),
                    "/status" => print_status(&registry, &config),
                    "/stop" => match active.as_mut() {
                        Some(run) => stop_run(run, grace).await,
                        None => println!("No task is running."),
                    },
                    "/resume" => {
                        if active.is_some() {
                            println!("A task is already running.");
                        } else {
                            active = Some(launch(&config, &options, &Launch::Resume, &tx)?);
                        }
                    }
                    _ => match active.as_mut() {
                        Some(run) => {
                            let Some(prompt) = run.prompts.front().cloned() else {
                                println!("A task is running. Use /stop to interrupt it.");
                                continue;
                            };
                            let Some(command) = answer(&prompt, &line) else {
                                println!("Answer with y or n, or type a reply.");
                                continue;
                            };
                            let mut bytes = command.to_line().into_bytes();
                            bytes.push(b'\n');
                            if let Err(e) = run.stdin.write_all(&bytes).await {
                                eprintln!("Failed to send answer: {e}");
                            } else {
                                run.prompts.pop_front();
                            }
                        }
                        None => {
                            active = Some(launch(&config, &options, &Launch::Run(line), &tx)?);
                        }
                    },
                }
            }
        }
    }

    if let Some(mut run) = active.take() {
        stop_run(&mut run, grace).await;
    }
    Ok(())
}
