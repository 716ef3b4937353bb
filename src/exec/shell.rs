//! One-shot shell command execution with a timeout.
//!
//! The command runs as `sh -c <command>` in its own process group, so a
//! timeout can take down every descendant with a single `killpg`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::error::ExecError;

/// Result of a shell command execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ExecResult {
    /// Render for a model: stdout, then stderr and exit status when notable.
    pub fn render(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("[stderr]\n");
            out.push_str(&self.stderr);
        }
        if self.timed_out {
            out.push_str("\n[timed out]");
        } else if let Some(code) = self.exit_code.filter(|c| *c != 0) {
            out.push_str(&format!("\n[exit code {code}]"));
        }
        out
    }
}

/// Run `command` in `cwd`, killing the whole process group after `timeout_secs`.
pub async fn execute_shell(
    command: &str,
    cwd: &Path,
    timeout_secs: u64,
) -> Result<ExecResult, ExecError> {
    #[allow(unused_imports)]
    use std::os::unix::process::CommandExt;

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .process_group(0)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ExecError::SpawnFailed(e.to_string()))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| ExecError::ProcessFailed("stdout not captured".into()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| ExecError::ProcessFailed("stderr not captured".into()))?;

    // Drain both pipes concurrently so a chatty process cannot block on a full pipe.
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf).await;
        buf
    });

    let (exit_code, timed_out) =
        match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait()).await {
            Ok(Ok(status)) => (status.code(), false),
            Ok(Err(e)) => return Err(ExecError::ProcessFailed(e.to_string())),
            Err(_) => {
                if let Some(pid) = child.id() {
                    let pgid = nix::unistd::Pid::from_raw(pid as i32);
                    let _ = nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGKILL);
                }
                // Reap the child to prevent zombies.
                let _ = child.wait().await;
                tracing::warn!(command, timeout_secs, "Shell command timed out");
                (None, true)
            }
        };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(ExecResult {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
        timed_out,
    })
}
