//! JSONL event stream for front-end integration.
//!
//! With `run --jsonl`, every notable step of a run is written to stdout as one
//! JSON object per line. Each line carries the run's `call_id`, a `timestamp`
//! and a `type` tag, followed by the event's own fields.
//!
//! Uses synchronous `std::io` writes since events are small, buffered, and
//! flushed after each line.

use std::io::{BufWriter, Write};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;

use super::types::{RunStatus, ToolStatus};

/// Returns the current UTC time as an ISO 8601 string with milliseconds.
fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A top-level run is starting.
    Start {
        agent: String,
        workspace: String,
        task_id: String,
        user_input: String,
        /// What the state cleaner did before the run.
        #[serde(skip_serializing_if = "Option::is_none")]
        cleanup: Option<serde_json::Value>,
    },

    /// Free-form model text produced alongside tool calls.
    Token { agent: String, text: String },

    /// An agent is starting turn `turn`.
    Progress {
        agent: String,
        turn: u32,
        max_turns: u32,
    },

    Notice { message: String },

    Warn { message: String },

    Error { message: String },

    /// A human-in-the-loop task is waiting for an answer.
    HumanInLoop {
        hil_id: String,
        instruction: String,
        timeout_sec: u64,
    },

    /// A gated tool call is waiting for approval.
    ToolConfirmation {
        confirm_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// A tool call finished.
    ToolCall {
        agent: String,
        tool_call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
        status: ToolStatus,
        output: String,
    },

    /// An agent delegated to a sub-agent.
    AgentCall {
        parent: String,
        agent: String,
        user_input: String,
        depth: usize,
    },

    Result {
        status: RunStatus,
        output: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_information: Option<String>,
    },

    End { status: RunStatus, duration_ms: u64 },
}

#[derive(Serialize)]
struct EventLine<'a> {
    call_id: &'a str,
    timestamp: String,
    #[serde(flatten)]
    event: &'a Event,
}

struct SinkInner {
    call_id: String,
    writer: BufWriter<Box<dyn Write + Send>>,
}

/// Cheap-to-clone handle to the event stream. A disabled sink drops events.
#[derive(Clone, Default)]
pub struct EventSink {
    inner: Option<Arc<Mutex<SinkInner>>>,
}

impl EventSink {
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn stdout(call_id: impl Into<String>) -> Self {
        Self::to_writer(call_id, Box::new(std::io::stdout()))
    }

    pub fn to_writer(call_id: impl Into<String>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Some(Arc::new(Mutex::new(SinkInner {
                call_id: call_id.into(),
                writer: BufWriter::new(writer),
            }))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Serialize `event` as a single JSON line and flush.
    ///
    /// Write failures are logged and otherwise ignored: a closed front end must
    /// not abort the run.
    pub fn emit(&self, event: Event) {
        let Some(inner) = &self.inner else {
            return;
        };
        let mut inner = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let SinkInner { call_id, writer } = &mut *inner;
        let line = EventLine {
            call_id: call_id.as_str(),
            timestamp: now_iso(),
            event: &event,
        };
        let written = serde_json::to_writer(&mut *writer, &line)
            .map_err(std::io::Error::from)
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush());
        if let Err(e) = written {
            tracing::warn!("Failed to write event: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writer that appends into a shared buffer.
    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn lines(buf: &Shared) -> Vec<serde_json::Value> {
        let bytes = buf.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn every_line_carries_call_id_and_type() {
        let buf = Shared::default();
        let sink = EventSink::to_writer("run-1", Box::new(buf.clone()));

        sink.emit(Event::HumanInLoop {
            hil_id: "h1".into(),
            instruction: "upload".into(),
            timeout_sec: 1800,
        });
        sink.emit(Event::End {
            status: RunStatus::Success,
            duration_ms: 12,
        });

        let events = lines(&buf);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["type"], "human_in_loop");
        assert_eq!(events[0]["call_id"], "run-1");
        assert_eq!(events[0]["timeout_sec"], 1800);
        assert_eq!(events[1]["type"], "end");
        assert_eq!(events[1]["status"], "success");
        assert!(events[1]["timestamp"].is_string());
    }

    #[test]
    fn result_without_error_omits_field() {
        let buf = Shared::default();
        let sink = EventSink::to_writer("run-2", Box::new(buf.clone()));
        sink.emit(Event::Result {
            status: RunStatus::Success,
            output: "ok".into(),
            error_information: None,
        });
        let events = lines(&buf);
        assert!(events[0].get("error_information").is_none());
    }

    #[test]
    fn disabled_sink_is_silent() {
        let sink = EventSink::disabled();
        assert!(!sink.is_enabled());
        sink.emit(Event::Notice {
            message: "nobody listens".into(),
        });
    }
}
