//! Hosting a run in a child process.
//!
//! [`HostedRun`] spawns a child (normally `stratum run --jsonl ...`) in its own
//! process group with piped stdin/stdout, so the front end can stream events,
//! answer control requests, and stop the whole tree:
//!
//! 1. `SIGTERM` to the process group, letting the run cancel cooperatively
//!    and leave its stack resumable.
//! 2. Wait up to the grace period.
//! 3. `SIGKILL` to the process group, then reap.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::error::HostError;

/// How [`HostedRun::stop`] brought the child down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The child had already exited.
    Exited(Option<i32>),
    /// The child exited within the grace period after `SIGTERM`.
    Terminated(Option<i32>),
    /// The child ignored `SIGTERM` and was killed.
    Killed,
}

pub struct HostedRun {
    child: Child,
    program: String,
}

impl HostedRun {
    pub fn spawn(program: &Path, args: &[String], cwd: &Path) -> Result<Self, HostError> {
        #[allow(unused_imports)]
        use std::os::unix::process::CommandExt;

        let child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .process_group(0)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HostError::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        tracing::debug!(program = %program.display(), pid = ?child.id(), "Hosted run spawned");
        Ok(Self {
            child,
            program: program.display().to_string(),
        })
    }

    /// OS process id, or `None` once the child has been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub async fn wait(&mut self) -> Result<ExitStatus, HostError> {
        Ok(self.child.wait().await?)
    }

    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>, HostError> {
        Ok(self.child.try_wait()?)
    }

    /// Stop the child's process group: terminate, wait `grace`, then kill.
    pub async fn stop(&mut self, grace: Duration) -> Result<StopOutcome, HostError> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(StopOutcome::Exited(status.code()));
        }
        let Some(pid) = self.child.id() else {
            let status = self.child.wait().await?;
            return Ok(StopOutcome::Exited(status.code()));
        };

        if !self.signal_group(pid, Signal::SIGTERM)? {
            let status = self.child.wait().await?;
            return Ok(StopOutcome::Exited(status.code()));
        }

        if let Ok(waited) = tokio::time::timeout(grace, self.child.wait()).await {
            let status = waited?;
            tracing::info!(pid, code = ?status.code(), "Hosted run terminated");
            return Ok(StopOutcome::Terminated(status.code()));
        }

        tracing::warn!(pid, grace_secs = grace.as_secs(), "Hosted run ignored SIGTERM, killing");
        self.signal_group(pid, Signal::SIGKILL)?;
        // Reap the child to prevent zombies.
        self.child.wait().await?;
        Ok(StopOutcome::Killed)
    }

    /// Signal the child's process group. `Ok(false)` when it no longer exists.
    fn signal_group(&self, pid: u32, signal: Signal) -> Result<bool, HostError> {
        match killpg(Pid::from_raw(pid as i32), signal) {
            Ok(()) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(e) => Err(HostError::Signal {
                pid,
                message: e.to_string(),
            }),
        }
    }
}
