//! Handle to one running transcoder process group.
//!
//! The transcoder is spawned as the leader of a fresh process group so that
//! it and anything it forks can be signalled together.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::command::TranscoderCommand;
use crate::{Error, Result};

/// Diagnostic streams of a freshly spawned transcoder, handed to the monitor.
#[derive(Debug)]
pub struct TranscoderOutput {
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

/// How a transcoder ended up stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process had already exited before it was asked to stop.
    AlreadyExited(ExitStatus),
    /// The process group exited after SIGTERM.
    Graceful(ExitStatus),
    /// The process group ignored SIGTERM and was killed.
    Forced(ExitStatus),
}

impl Termination {
    pub fn status(&self) -> ExitStatus {
        match *self {
            Termination::AlreadyExited(s) | Termination::Graceful(s) | Termination::Forced(s) => s,
        }
    }

    pub fn was_forced(&self) -> bool {
        matches!(self, Termination::Forced(_))
    }
}

/// Exclusively-owned handle to a running transcoder.
#[derive(Debug)]
pub struct TranscoderProcess {
    child: Child,
    pid: u32,
    pgid: u32,
    program: String,
    status: Option<ExitStatus>,
}

impl TranscoderProcess {
    /// Spawn `command` in its own process group with piped output.
    pub fn spawn(command: &TranscoderCommand) -> Result<(Self, TranscoderOutput)> {
        let program = command.program_name();

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found(program.clone())
            } else {
                Error::spawn(program.clone(), e.to_string())
            }
        })?;

        let pid = child
            .id()
            .ok_or_else(|| Error::spawn(program.clone(), "process exited before it was tracked"))?;

        let output = TranscoderOutput {
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
        };

        debug!(pid, program = %program, "Spawned transcoder");

        Ok((
            Self {
                child,
                pid,
                // process_group(0) makes the child its own group leader
                pgid: pid,
                program,
                status: None,
            },
            output,
        ))
    }

    /// Process id of the group leader.
    pub fn id(&self) -> u32 {
        self.pid
    }

    /// Process group id.
    pub fn pgid(&self) -> u32 {
        self.pgid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Poll for exit without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if self.status.is_none() {
            self.status = self.child.try_wait()?;
        }
        Ok(self.status)
    }

    /// Signal the whole process group: SIGTERM when `graceful`, SIGKILL otherwise.
    ///
    /// A group that no longer exists is not an error.
    pub fn terminate(&mut self, graceful: bool) -> Result<()> {
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            let signal = if graceful {
                Signal::SIGTERM
            } else {
                Signal::SIGKILL
            };

            match killpg(Pid::from_raw(self.pgid as i32), signal) {
                Ok(()) | Err(Errno::ESRCH) => Ok(()),
                Err(e) => Err(Error::signal(self.pgid, e.to_string())),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = graceful;
            match self.child.start_kill() {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
                Err(e) => Err(Error::Io(e)),
            }
        }
    }

    /// Stop the transcoder: SIGTERM, wait up to `timeout`, then SIGKILL.
    ///
    /// The process is always reaped before this returns `Ok`.
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<Termination> {
        if let Some(status) = self.try_wait()? {
            debug!(pid = self.pid, %status, "Transcoder had already exited");
            return Ok(Termination::AlreadyExited(status));
        }

        if let Err(e) = self.terminate(true) {
            warn!(pid = self.pid, error = %e, "Graceful termination signal failed");
        }

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.status = Some(status);
                info!(pid = self.pid, %status, "Transcoder exited");
                Ok(Termination::Graceful(status))
            }
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_elapsed) => {
                warn!(
                    pid = self.pid,
                    timeout_ms = timeout.as_millis() as u64,
                    "Transcoder ignored SIGTERM, killing process group"
                );
                self.terminate(false)?;
                let status = self.child.wait().await?;
                self.status = Some(status);
                Ok(Termination::Forced(status))
            }
        }
    }
}

impl Drop for TranscoderProcess {
    fn drop(&mut self) {
        if self.status.is_none() {
            let _ = self.terminate(false);
        }
    }
}
