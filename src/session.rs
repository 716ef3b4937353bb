//! Entry sequence for top-level runs.
//!
//! [`start_run`] performs, in order: catalogue check, state cleaning,
//! instruction registration, permission setup, and the executor run. A
//! different interrupted task still on the stack stops the sequence before
//! anything is registered. Keeping it
//! here rather than in `main` lets the integration tests drive the exact same
//! sequence as the binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::agent::catalog::{AgentCatalog, StaticCatalog};
use crate::agent::conversation::ConversationStore;
use crate::agent::events::{Event, EventSink};
use crate::agent::executor::{AgentExecutor, ExecutorContext};
use crate::agent::genai_client::GenaiModel;
use crate::agent::model::ModelClient;
use crate::agent::tools::{BuiltinTools, ToolExecutor};
use crate::agent::types::{ExecutionLimits, ExecutionResult};
use crate::config::AppConfig;
use crate::coordination::Coordination;
use crate::error::SessionError;
use crate::orchestration::cleaner::{CleanReport, clean_before_start};
use crate::orchestration::registry::HierarchyRegistry;
use crate::orchestration::types::ResumeOutcome;

/// Long-lived collaborators shared by every run of a process.
#[derive(Clone)]
pub struct Runtime {
    pub config: AppConfig,
    pub registry: HierarchyRegistry,
    pub coordination: Coordination,
    pub catalog: Arc<dyn AgentCatalog>,
    pub model: Arc<dyn ModelClient>,
    pub tools: Arc<dyn ToolExecutor>,
    pub events: EventSink,
}

impl Runtime {
    pub fn new(
        config: AppConfig,
        catalog: Arc<dyn AgentCatalog>,
        model: Arc<dyn ModelClient>,
        tools: Arc<dyn ToolExecutor>,
        events: EventSink,
    ) -> Self {
        Self {
            registry: HierarchyRegistry::new(config.state_dir.clone()),
            coordination: Coordination::from_config(&config),
            config,
            catalog,
            model,
            tools,
            events,
        }
    }

    /// Runtime with the built-in catalogue, the genai model client, and the
    /// built-in tools.
    pub fn from_config(config: AppConfig, events: EventSink) -> Self {
        let tools = Arc::new(BuiltinTools::new(config.shell_timeout_secs));
        Self::new(
            config,
            Arc::new(StaticCatalog::builtin()),
            Arc::new(GenaiModel::new()),
            tools,
            events,
        )
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub workspace: PathBuf,
    pub agent_name: String,
    pub user_input: String,
    pub force_new: bool,
    /// Permission mode for this task; `None` keeps the configured default.
    pub auto_mode: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub result: ExecutionResult,
    pub cleanup: CleanReport,
    /// Id of the registered instruction; `None` when the run resumed an
    /// instruction registered earlier.
    pub instruction_id: Option<String>,
    pub duration: Duration,
}

pub async fn start_run(
    runtime: &Runtime,
    request: RunRequest,
    cancel: CancellationToken,
) -> Result<RunReport, SessionError> {
    let started = Instant::now();

    // -- Configuration errors are fatal before any state is touched
    runtime.catalog.agent(&request.agent_name)?;

    let manager = runtime.registry.manager_for(&request.workspace);
    let key = manager.workspace_key().clone();

    let cleanup = clean_before_start(&manager, &request.user_input, request.force_new)?;
    if let CleanReport::StaleRetained { stack_depth } = cleanup {
        let pending_input = manager
            .stack()
            .first()
            .map(|frame| frame.user_input.clone())
            .unwrap_or_default();
        return Err(SessionError::StaleTask {
            pending_input,
            stack_depth,
        });
    }

    runtime.events.emit(Event::Start {
        agent: request.agent_name.clone(),
        workspace: key.absolute_path().display().to_string(),
        task_id: key.as_str().to_string(),
        user_input: request.user_input.clone(),
        cleanup: serde_json::to_value(&cleanup).ok(),
    });

    let instruction_id = match cleanup {
        CleanReport::Resuming { .. } => None,
        _ => Some(manager.start_new_instruction(&request.user_input)?),
    };

    if let Some(auto) = request.auto_mode {
        runtime.coordination.gate.set_task_permission(key.as_str(), auto);
    }

    let ctx = Arc::new(ExecutorContext {
        catalog: runtime.catalog.clone(),
        model: runtime.model.clone(),
        tools: runtime.tools.clone(),
        hierarchy: manager.clone(),
        coordination: runtime.coordination.clone(),
        events: runtime.events.clone(),
        conversations: ConversationStore::new(key.clone(), runtime.registry.state_dir()),
        limits: ExecutionLimits {
            max_turns: runtime.config.max_turns,
            max_depth: runtime.config.max_depth,
        },
        default_model: runtime.config.model.clone(),
        hil_timeout: Duration::from_secs(runtime.config.hil_timeout_secs),
        cancel,
    });

    tracing::info!(
        workspace = %key,
        agent = %request.agent_name,
        cleanup = ?cleanup,
        "Starting run"
    );
    let result = AgentExecutor::new(ctx, &request.agent_name)
        .run(&request.user_input)
        .await;

    let duration = started.elapsed();
    runtime.events.emit(Event::Result {
        status: result.status,
        output: result.output.clone(),
        error_information: result.error_information.clone(),
    });
    runtime.events.emit(Event::End {
        status: result.status,
        duration_ms: duration.as_millis() as u64,
    });

    Ok(RunReport {
        result,
        cleanup,
        instruction_id,
        duration,
    })
}

/// Relaunch the interrupted task recorded for `workspace`.
pub async fn resume_run(
    runtime: &Runtime,
    workspace: PathBuf,
    auto_mode: Option<bool>,
    cancel: CancellationToken,
) -> Result<RunReport, SessionError> {
    let manager = runtime.registry.manager_for(&workspace);
    match manager.resume() {
        ResumeOutcome::Found {
            agent_name,
            user_input,
            stack_depth,
            ..
        } => {
            tracing::info!(agent = %agent_name, stack_depth, "Resuming interrupted task");
            start_run(
                runtime,
                RunRequest {
                    workspace,
                    agent_name,
                    user_input,
                    force_new: false,
                    auto_mode,
                },
                cancel,
            )
            .await
        }
        ResumeOutcome::NotFound { message } => Err(SessionError::NothingToResume(message)),
    }
}
