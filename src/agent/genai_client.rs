//! [`ModelClient`] backed by the `genai` crate.
//!
//! Each turn is a fresh streaming chat request: the agent description as the
//! system prompt, the task and rendered action history as the user message,
//! and the agent's tools plus a `final_output` tool as the tool set. Calling
//! `final_output` ends the run.

use async_trait::async_trait;
use futures::StreamExt;
use genai::Client;
use genai::chat::{ChatMessage, ChatOptions, ChatRequest, ChatStreamEvent, Tool, ToolCall};
use serde_json::json;

use super::model::{ModelClient, ModelRequest, ModelTurn, ToolRequest, render_history};
use super::tools::ToolSpec;
use super::types::RunStatus;
use crate::error::ModelError;

const FINAL_OUTPUT: &str = "final_output";

pub struct GenaiModel {
    client: Client,
}

impl Default for GenaiModel {
    fn default() -> Self {
        Self::new()
    }
}

impl GenaiModel {
    /// Defaults to Ollama for non-prefixed model names.
    pub fn new() -> Self {
        Self {
            client: Client::default(),
        }
    }
}

fn to_genai_tool(spec: &ToolSpec) -> Tool {
    Tool::new(spec.name.clone())
        .with_description(spec.description.clone())
        .with_schema(spec.parameters.clone())
}

fn final_output_tool() -> Tool {
    Tool::new(FINAL_OUTPUT)
        .with_description(
            "Finish the task. Call this exactly once, when the task is done or cannot be done.",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "enum": ["success", "error"],
                    "description": "Whether the task was accomplished"
                },
                "output": {
                    "type": "string",
                    "description": "The result, or what went wrong"
                }
            },
            "required": ["status", "output"]
        }))
}

fn system_prompt(request: &ModelRequest) -> String {
    format!(
        "You are {name}. {description}\n\n\
         Work in turns. Each turn, call one or more tools. When the task is complete, \
         or cannot be completed, call `{FINAL_OUTPUT}` with a status and output.\n\
         This is turn {turn} of at most {max}.",
        name = request.agent.name,
        description = request.agent.description,
        turn = request.turn,
        max = request.max_turns,
    )
}

fn user_prompt(request: &ModelRequest) -> String {
    if request.history.is_empty() {
        format!("Task:\n{}", request.task_input)
    } else {
        format!(
            "Task:\n{}\n\nActions so far:\n{}",
            request.task_input,
            render_history(&request.history)
        )
    }
}

/// Map the captured reply of one turn onto a [`ModelTurn`].
fn interpret(text: Option<String>, calls: Vec<ToolCall>) -> Result<ModelTurn, ModelError> {
    if let Some(finish) = calls.iter().find(|c| c.fn_name == FINAL_OUTPUT) {
        let status = match finish.fn_arguments.get("status").and_then(|v| v.as_str()) {
            Some("error") => RunStatus::Error,
            Some("success") | None => RunStatus::Success,
            Some(other) => {
                return Err(ModelError::Malformed(format!(
                    "final_output status must be success or error, got `{other}`"
                )));
            }
        };
        let output = finish
            .fn_arguments
            .get("output")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or(text)
            .unwrap_or_default();
        return Ok(ModelTurn::Finish { status, output });
    }

    Ok(ModelTurn::Act {
        thinking: text.filter(|t| !t.trim().is_empty()),
        calls: calls
            .into_iter()
            .map(|c| ToolRequest::new(c.call_id, c.fn_name, c.fn_arguments))
            .collect(),
    })
}

#[async_trait]
impl ModelClient for GenaiModel {
    async fn next_turn(&self, request: &ModelRequest) -> Result<ModelTurn, ModelError> {
        let mut tools: Vec<Tool> = request.tools.iter().map(to_genai_tool).collect();
        tools.push(final_output_tool());

        let chat_req = ChatRequest::from_system(system_prompt(request))
            .with_tools(tools)
            .append_message(ChatMessage::user(user_prompt(request)));

        // -- Configure streaming capture options
        let chat_options = ChatOptions::default()
            .with_capture_content(true)
            .with_capture_tool_calls(true);

        let stream_res = self
            .client
            .exec_chat_stream(&request.model, chat_req, Some(&chat_options))
            .await
            .map_err(|e| ModelError::LlmError(e.to_string()))?;

        let mut stream = stream_res.stream;
        let mut captured_text: Option<String> = None;
        let mut captured_tool_calls: Vec<ToolCall> = Vec::new();

        while let Some(event) = stream.next().await {
            match event {
                Ok(ChatStreamEvent::End(end)) => {
                    if let Some(text) = end.captured_first_text() {
                        captured_text = Some(text.to_string());
                    }
                    if let Some(calls) = end.captured_tool_calls() {
                        captured_tool_calls = calls.into_iter().cloned().collect();
                    }
                }
                Ok(_) => {
                    // Start, Chunk, ReasoningChunk, ToolCallChunk -- only the captured End matters.
                }
                Err(e) => {
                    tracing::warn!(agent = %request.agent.name, "Stream error: {e}");
                    // Continue -- the End event may still arrive.
                }
            }
        }

        interpret(captured_text, captured_tool_calls)
    }
}
