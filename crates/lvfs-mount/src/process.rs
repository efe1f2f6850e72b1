//! The process-handle capability and its `std::process` implementation.
//!
//! A mounter runs as a long-lived child: it is started, left running while
//! the mount is in use, and only exits after a separate administrative
//! command asks the OS to detach the drive. The harness therefore needs
//! three operations, which is all [`ProcessRunner`] and [`ChildProcess`]
//! expose:
//!
//! 1. start a long-lived child without waiting for it
//! 2. fire a short-lived command without waiting for it
//! 3. wait (or poll) for the long-lived child to exit
//!
//! A child that never bound the drive may ignore the unmount command; for
//! that case [`wait_or_kill`] gives up after a grace period and kills it.

use std::io;
use std::process::{Child, Stdio};
use std::time::{Duration, Instant};

use crate::command::CommandLine;
use crate::error::MountError;

/// How a started process's standard streams are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdioMode {
    /// Share the harness's stdout/stderr
    #[default]
    Inherit,
    /// Discard all output
    Null,
}

impl StdioMode {
    fn stdio(self) -> Stdio {
        match self {
            Self::Inherit => Stdio::inherit(),
            Self::Null => Stdio::null(),
        }
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, `None` if the process was terminated by a signal
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitOutcome {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// A running child process started by a [`ProcessRunner`].
pub trait ChildProcess: Send {
    /// OS process id (or a synthetic id for fakes).
    fn id(&self) -> u32;

    /// Check for exit without blocking.
    fn try_wait(&mut self) -> io::Result<Option<ExitOutcome>>;

    /// Block until the process exits.
    ///
    /// There is no timeout: a mounter that never exits blocks the caller
    /// indefinitely.
    fn wait(&mut self) -> io::Result<ExitOutcome>;

    /// Forcibly terminate the process. Does not reap it.
    fn kill(&mut self) -> io::Result<()>;
}

/// Poll period of [`wait_or_kill`]
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Wait up to `grace` for `child` to exit on its own, then kill and reap it.
pub fn wait_or_kill(child: &mut dyn ChildProcess, grace: Duration) -> io::Result<ExitOutcome> {
    let start = Instant::now();
    loop {
        if let Some(outcome) = child.try_wait()? {
            return Ok(outcome);
        }
        if start.elapsed() >= grace {
            break;
        }
        std::thread::sleep(REAP_POLL_INTERVAL.min(grace));
    }

    tracing::warn!(
        "Process {} still running after {:?}, killing it",
        child.id(),
        grace
    );
    if let Err(e) = child.kill() {
        // It may have exited between the last poll and the kill.
        if child.try_wait()?.is_none() {
            return Err(e);
        }
    }
    child.wait()
}

/// Starts processes on behalf of the mount controller.
pub trait ProcessRunner {
    /// Start a long-lived process and return a handle to it.
    fn start(&mut self, command: &CommandLine) -> Result<Box<dyn ChildProcess>, MountError>;

    /// Start a short-lived command and return immediately.
    ///
    /// The caller never learns whether the command succeeded; success is
    /// inferred from its effect on the long-lived child.
    fn fire_and_forget(&mut self, command: &CommandLine) -> Result<(), MountError>;
}

/// [`ProcessRunner`] backed by real OS processes.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    output: StdioMode,
}

impl SystemRunner {
    pub fn new(output: StdioMode) -> Self {
        Self { output }
    }
}

impl ProcessRunner for SystemRunner {
    fn start(&mut self, command: &CommandLine) -> Result<Box<dyn ChildProcess>, MountError> {
        let child = command
            .to_command()
            .stdin(Stdio::null())
            .stdout(self.output.stdio())
            .stderr(self.output.stdio())
            .spawn()
            .map_err(|source| MountError::Spawn {
                command: command.to_string(),
                source,
            })?;

        tracing::debug!("Started `{}` (pid {})", command, child.id());
        Ok(Box::new(SystemChild { child }))
    }

    fn fire_and_forget(&mut self, command: &CommandLine) -> Result<(), MountError> {
        let mut child = command
            .to_command()
            .stdin(Stdio::null())
            .stdout(self.output.stdio())
            .stderr(self.output.stdio())
            .spawn()
            .map_err(|source| MountError::UnmountCommand {
                command: command.to_string(),
                source,
            })?;

        // Reap in the background so the command does not linger as a zombie.
        let label = command.to_string();
        let pid = child.id();
        let reaper = std::thread::Builder::new()
            .name("lvfs-reaper".to_string())
            .spawn(move || match child.wait() {
                Ok(status) if status.success() => {
                    tracing::debug!("`{}` (pid {}) finished", label, pid);
                }
                Ok(status) => {
                    tracing::debug!("`{}` (pid {}) exited with {}", label, pid, status);
                }
                Err(e) => {
                    tracing::warn!("Failed to reap `{}` (pid {}): {}", label, pid, e);
                }
            });

        if let Err(e) = reaper {
            tracing::warn!("Failed to start reaper thread for pid {}: {}", pid, e);
        }

        Ok(())
    }
}

struct SystemChild {
    child: Child,
}

impl ChildProcess for SystemChild {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitOutcome>> {
        Ok(self.child.try_wait()?.map(ExitOutcome::from))
    }

    fn wait(&mut self) -> io::Result<ExitOutcome> {
        self.child.wait().map(ExitOutcome::from)
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }
}
