//! Agent executor: drives one agent's turn loop and recurses into sub-agents.
//!
//! A run proceeds as follows:
//!
//! 1. Resolve the agent from the catalogue (a failure here aborts before any
//!    state is touched)
//! 2. Push a stack frame (the top-level run adopts a matching interrupted
//!    bottom frame instead) and register the agent in the context
//! 3. Loop: ask the model for a turn, dispatch each requested call, record the
//!    outcomes in the action history, save the history
//! 4. On finish, pop the frame and record the final agent status
//!
//! Sub-agent calls run a nested executor whose result is folded back into the
//! parent's history as an ordinary tool result. Nesting is bounded by the
//! durable frame count, not by the Rust call stack.
//!
//! **Cancellation model:** the shared [`CancellationToken`] is honoured at the
//! model call, the permission gate, the HIL wait, and tool execution. A
//! cancelled run keeps its frames on the stack so it can be resumed, marks
//! the agent `interrupted`, and returns an `error` result with
//! `error_information = "cancelled"`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::catalog::{AgentCatalog, AgentConfig};
use super::conversation::{ConversationRecord, ConversationStore};
use super::events::{Event, EventSink};
use super::model::{ModelClient, ModelRequest, ModelTurn, ToolRequest};
use super::tools::{HUMAN_IN_LOOP, ToolExecutor, ToolSpec, human_in_loop_spec, sub_agent_spec};
use super::types::{
    Action, ActionKind, CANCELLED, ExecutionLimits, ExecutionResult, RunStatus, ToolOutcome,
    ToolStatus,
};
use crate::coordination::classify::classify;
use crate::coordination::{Coordination, GateDecision, HilOutcome};
use crate::orchestration::manager::HierarchyManager;
use crate::orchestration::types::{AgentId, AgentNode, AgentRunStatus, StackFrame, now_rfc3339};

/// Marker for "the run's cancellation token fired"; propagated with `?`.
#[derive(Debug)]
struct Cancelled;

/// Everything an executor (and its nested executors) share for one run.
pub struct ExecutorContext {
    pub catalog: Arc<dyn AgentCatalog>,
    pub model: Arc<dyn ModelClient>,
    pub tools: Arc<dyn ToolExecutor>,
    pub hierarchy: Arc<HierarchyManager>,
    pub coordination: Coordination,
    pub events: EventSink,
    pub conversations: ConversationStore,
    pub limits: ExecutionLimits,
    /// Model used by agents without their own override.
    pub default_model: String,
    /// Timeout for HIL requests that do not carry one.
    pub hil_timeout: Duration,
    pub cancel: CancellationToken,
}

impl ExecutorContext {
    fn workspace(&self) -> &str {
        self.hierarchy.workspace_key().as_str()
    }
}

/// Executor for one agent at one nesting depth.
#[derive(Clone)]
pub struct AgentExecutor {
    ctx: Arc<ExecutorContext>,
    agent_name: String,
    parent_id: Option<AgentId>,
    depth: usize,
}

impl AgentExecutor {
    /// Top-level executor for `agent_name`.
    pub fn new(ctx: Arc<ExecutorContext>, agent_name: impl Into<String>) -> Self {
        Self {
            ctx,
            agent_name: agent_name.into(),
            parent_id: None,
            depth: 0,
        }
    }

    fn child(&self, agent_name: &str, parent_id: &AgentId) -> Self {
        Self {
            ctx: self.ctx.clone(),
            agent_name: agent_name.to_string(),
            parent_id: Some(parent_id.clone()),
            depth: self.depth + 1,
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Run the agent on `user_input` to completion.
    ///
    /// Never fails: every error, including a panic inside the loop, is
    /// converted into an `error` result.
    pub async fn run(&self, user_input: &str) -> ExecutionResult {
        match AssertUnwindSafe(self.run_inner(user_input)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(agent = %self.agent_name, "Agent panicked: {message}");
                self.ctx.events.emit(Event::Error {
                    message: format!("{} panicked: {message}", self.agent_name),
                });
                ExecutionResult::error(format!("agent panicked: {message}"))
            }
        }
    }

    /// Boxed entry point for nested runs (async recursion needs indirection).
    fn run_nested(self, user_input: String) -> BoxFuture<'static, ExecutionResult> {
        async move { self.run(&user_input).await }.boxed()
    }

    async fn run_inner(&self, user_input: &str) -> ExecutionResult {
        let ctx = &self.ctx;

        // -- Resolve configuration before touching any state
        let config = match ctx.catalog.agent(&self.agent_name) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(agent = %self.agent_name, "{e}");
                return ExecutionResult::error(e.to_string());
            }
        };

        // -- Enter the stack
        let frame = StackFrame::new(&config.name, user_input);
        let entered = if self.depth == 0 {
            ctx.hierarchy.adopt_or_push_root(frame)
        } else {
            ctx.hierarchy.push_frame(frame)
        };
        let frame_index = match entered {
            Ok(index) => index,
            Err(e) => return ExecutionResult::error(format!("persistence error: {e}")),
        };

        let agent_id: AgentId = format!("{}-{}", config.name, &Uuid::new_v4().simple().to_string()[..8]);
        let node = AgentNode {
            agent_name: config.name.clone(),
            level: config.level,
            parent_id: self.parent_id.clone(),
            depth: frame_index,
            started_at: now_rfc3339(),
        };
        if let Err(e) = ctx.hierarchy.register_agent(&agent_id, node) {
            self.leave_frame(frame_index);
            return ExecutionResult::error(format!("persistence error: {e}"));
        }

        tracing::info!(
            agent = %config.name,
            agent_id = %agent_id,
            depth = frame_index,
            "Agent started"
        );

        // -- Turn loop
        let outcome = self.turn_loop(&config, &agent_id, user_input).await;

        // -- Leave the stack
        let result = match outcome {
            Err(Cancelled) => {
                if let Err(e) = ctx
                    .hierarchy
                    .set_agent_status(&agent_id, AgentRunStatus::Interrupted)
                {
                    tracing::warn!(agent_id = %agent_id, "Failed to record interruption: {e}");
                }
                tracing::info!(agent = %config.name, "Agent cancelled; frame kept for resume");
                return ExecutionResult::error(CANCELLED);
            }
            Ok(result) => result,
        };

        let result = match ctx.hierarchy.pop_frame(frame_index) {
            Ok(_) => result,
            Err(e) => ExecutionResult::error(format!("persistence error: {e}")),
        };
        let status = if result.is_success() {
            AgentRunStatus::Completed
        } else {
            AgentRunStatus::Failed
        };
        if let Err(e) = ctx.hierarchy.set_agent_status(&agent_id, status) {
            tracing::warn!(agent_id = %agent_id, "Failed to record agent status: {e}");
        }
        ctx.conversations.remove(&config.name);

        tracing::info!(agent = %config.name, status = ?result.status, "Agent finished");
        result
    }

    fn leave_frame(&self, frame_index: usize) {
        if let Err(e) = self.ctx.hierarchy.pop_frame(frame_index) {
            tracing::warn!(agent = %self.agent_name, "Failed to pop frame {frame_index}: {e}");
        }
    }

    async fn turn_loop(
        &self,
        config: &AgentConfig,
        agent_id: &AgentId,
        user_input: &str,
    ) -> Result<ExecutionResult, Cancelled> {
        let ctx = &self.ctx;
        let max_turns = ctx.limits.max_turns;
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| ctx.default_model.clone());
        let tools = self.tool_specs(config);

        // -- Restore history of an interrupted run of the same task
        let (mut turn, mut history) = match ctx.conversations.load(&config.name, user_input) {
            Some(record) => {
                tracing::info!(
                    agent = %config.name,
                    turn = record.current_turn,
                    actions = record.action_history.len(),
                    "Restored action history"
                );
                (record.current_turn, record.action_history)
            }
            None => (0, Vec::new()),
        };

        while turn < max_turns {
            if ctx.cancel.is_cancelled() {
                return Err(Cancelled);
            }
            turn += 1;
            ctx.events.emit(Event::Progress {
                agent: config.name.clone(),
                turn,
                max_turns,
            });

            let request = ModelRequest {
                agent: config.clone(),
                model: model.clone(),
                task_input: user_input.to_string(),
                history: history.clone(),
                turn,
                max_turns,
                tools: tools.clone(),
            };

            let reply = tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(Cancelled),
                reply = ctx.model.next_turn(&request) => reply,
            };

            let reply = match reply {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!(agent = %config.name, turn, "{e}");
                    ctx.events.emit(Event::Error {
                        message: format!("{}: {e}", config.name),
                    });
                    return Ok(ExecutionResult::error(format!("model error: {e}")));
                }
            };

            match reply {
                ModelTurn::Finish { status, output } => {
                    return Ok(match status {
                        RunStatus::Success => ExecutionResult::success(output),
                        RunStatus::Error => ExecutionResult {
                            status: RunStatus::Error,
                            error_information: Some(output.clone()),
                            output,
                        },
                    });
                }
                ModelTurn::Act { thinking, calls } => {
                    if let Some(text) = thinking {
                        ctx.events.emit(Event::Token {
                            agent: config.name.clone(),
                            text,
                        });
                    }
                    if calls.is_empty() {
                        ctx.events.emit(Event::Warn {
                            message: format!("{} returned no tool calls on turn {turn}", config.name),
                        });
                    }

                    for call in calls {
                        let (kind, outcome) = self.dispatch(config, agent_id, &call).await?;
                        ctx.events.emit(Event::ToolCall {
                            agent: config.name.clone(),
                            tool_call_id: call.call_id.clone(),
                            tool_name: call.name.clone(),
                            arguments: call.arguments.clone(),
                            status: outcome.status,
                            output: outcome.output.clone(),
                        });
                        history.push(Action {
                            turn,
                            call_id: call.call_id,
                            tool_name: call.name,
                            kind,
                            arguments: call.arguments,
                            outcome,
                        });
                    }

                    let record = ConversationRecord::new(&config.name, user_input, turn, history.clone());
                    if let Err(e) = ctx.conversations.save(&record) {
                        tracing::warn!(agent = %config.name, "Failed to save action history: {e}");
                    }
                }
            }
        }

        tracing::warn!(agent = %config.name, max_turns, "Turn budget exhausted");
        Ok(ExecutionResult::error(format!(
            "turn budget exhausted after {max_turns} turns"
        )))
    }

    /// Schemas for every tool the agent may call.
    fn tool_specs(&self, config: &AgentConfig) -> Vec<ToolSpec> {
        let builtin = self.ctx.tools.specs();
        config
            .available_tools
            .iter()
            .filter_map(|name| {
                if name == HUMAN_IN_LOOP {
                    return Some(human_in_loop_spec());
                }
                if let Ok(agent) = self.ctx.catalog.agent(name) {
                    return Some(sub_agent_spec(&agent));
                }
                let spec = builtin.iter().find(|s| &s.name == name).cloned();
                if spec.is_none() {
                    tracing::debug!(agent = %config.name, tool = %name, "No schema for available tool");
                }
                spec
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    async fn dispatch(
        &self,
        config: &AgentConfig,
        agent_id: &AgentId,
        call: &ToolRequest,
    ) -> Result<(ActionKind, ToolOutcome), Cancelled> {
        if !config.can_call(&call.name) {
            return Ok((
                ActionKind::Tool,
                ToolOutcome::error(format!(
                    "Tool `{}` is not available to {}",
                    call.name, config.name
                )),
            ));
        }

        if call.name == HUMAN_IN_LOOP {
            return Ok((ActionKind::Human, self.ask_human(call).await?));
        }

        if self.ctx.catalog.is_agent(&call.name) {
            return Ok((ActionKind::SubAgent, self.delegate(config, agent_id, call).await?));
        }

        Ok((ActionKind::Tool, self.execute_tool(call).await?))
    }

    async fn execute_tool(&self, call: &ToolRequest) -> Result<ToolOutcome, Cancelled> {
        let ctx = &self.ctx;
        let workspace = ctx.workspace();

        // -- Permission gate (manual mode, mutating tools only)
        let category = classify(&call.name, &call.arguments);
        if category.is_mutating() && !ctx.coordination.gate.is_auto(workspace) {
            let confirmation = match ctx.coordination.gate.open(workspace, &call.name, &call.arguments) {
                Ok(confirmation) => confirmation,
                Err(e) => return Ok(ToolOutcome::error(e.to_string())),
            };
            ctx.events.emit(Event::ToolConfirmation {
                confirm_id: confirmation.confirm_id.clone(),
                tool_name: call.name.clone(),
                arguments: call.arguments.clone(),
            });

            let decision = ctx
                .coordination
                .gate
                .wait(&confirmation.confirm_id, &ctx.cancel)
                .await;
            match decision {
                Ok(GateDecision::Allowed) => {}
                Ok(GateDecision::Rejected { reason }) => return Ok(ToolOutcome::rejected(reason)),
                Ok(GateDecision::TimedOut) => {
                    return Ok(ToolOutcome::rejected(format!(
                        "Confirmation for {} timed out",
                        call.name
                    )));
                }
                Ok(GateDecision::Aborted) => return Err(Cancelled),
                Err(e) => return Ok(ToolOutcome::error(e.to_string())),
            }
        }

        // -- Execute
        let path = ctx.hierarchy.workspace_key().absolute_path();
        let result = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(Cancelled),
            result = ctx.tools.execute(path, &call.name, &call.arguments) => result,
        };
        Ok(match result {
            Ok(output) => ToolOutcome::success(output),
            Err(e) => ToolOutcome::error(e.to_string()),
        })
    }

    async fn ask_human(&self, call: &ToolRequest) -> Result<ToolOutcome, Cancelled> {
        let ctx = &self.ctx;
        let Some(instruction) = call.arguments.get("instruction").and_then(|v| v.as_str()) else {
            return Ok(ToolOutcome::error(format!(
                "{HUMAN_IN_LOOP}: missing or invalid 'instruction' argument"
            )));
        };
        let hil_id = call
            .arguments
            .get("hil_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let timeout = call
            .arguments
            .get("timeout")
            .and_then(|v| v.as_u64())
            .map(Duration::from_secs)
            .unwrap_or(ctx.hil_timeout);

        let task = match ctx
            .coordination
            .hil
            .create(ctx.workspace(), hil_id, instruction, timeout)
        {
            Ok(task) => task,
            Err(e) => return Ok(ToolOutcome::error(e.to_string())),
        };
        ctx.events.emit(Event::HumanInLoop {
            hil_id: task.hil_id.clone(),
            instruction: task.instruction.clone(),
            timeout_sec: task.timeout_secs,
        });

        let outcome = ctx.coordination.hil.wait(&task.hil_id, &ctx.cancel).await;
        Ok(match outcome {
            Ok(HilOutcome::Completed(response)) => {
                ToolOutcome::success(format!("Human task completed: {response}"))
            }
            Ok(HilOutcome::Cancelled(reason)) => {
                ToolOutcome::cancelled(format!("User cancelled the human task: {reason}"))
            }
            Ok(HilOutcome::TimedOut) => ToolOutcome::timeout(format!(
                "Human task {} timed out after {}s",
                task.hil_id,
                timeout.as_secs()
            )),
            Ok(HilOutcome::Aborted) => return Err(Cancelled),
            Err(e) => ToolOutcome::error(e.to_string()),
        })
    }

    async fn delegate(
        &self,
        config: &AgentConfig,
        agent_id: &AgentId,
        call: &ToolRequest,
    ) -> Result<ToolOutcome, Cancelled> {
        let ctx = &self.ctx;

        let depth = ctx.hierarchy.depth();
        if depth >= ctx.limits.max_depth {
            return Ok(ToolOutcome::error(format!(
                "Cannot call {}: maximum nesting depth {} reached",
                call.name, ctx.limits.max_depth
            )));
        }

        let input = ["task_input", "input", "instruction"]
            .iter()
            .find_map(|key| call.arguments.get(*key).and_then(|v| v.as_str()))
            .or_else(|| call.arguments.as_str());
        let Some(input) = input else {
            return Ok(ToolOutcome::error(format!(
                "{}: missing or invalid 'task_input' argument",
                call.name
            )));
        };

        ctx.events.emit(Event::AgentCall {
            parent: config.name.clone(),
            agent: call.name.clone(),
            user_input: input.to_string(),
            depth,
        });

        let result = self
            .child(&call.name, agent_id)
            .run_nested(input.to_string())
            .await;

        if ctx.cancel.is_cancelled() {
            return Err(Cancelled);
        }

        Ok(match result.status {
            RunStatus::Success => ToolOutcome::success(result.output),
            RunStatus::Error => ToolOutcome {
                status: ToolStatus::Error,
                output: result.output,
                error: result.error_information,
            },
        })
    }
}
