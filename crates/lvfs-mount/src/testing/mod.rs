//! Fake process runner for exercising mount logic without a real mounter.
//!
//! [`FakeRunner`] hands out [`ChildProcess`] handles that behave like a
//! mounter: they keep running until an unmount command is fired, then exit
//! after a configurable latency. A startup delay can be simulated by asking
//! the runner to create probe files some time after each start.
//!
//! # Usage
//!
//! ```ignore
//! use lvfs_mount::testing::{FakeRunner, ProcessEvent};
//! use lvfs_mount::{CommandLine, ProcessRunner};
//! use std::time::Duration;
//!
//! let mut runner = FakeRunner::new().exit_latency(Duration::from_millis(5));
//! let observer = runner.clone();
//!
//! let mut child = runner.start(&CommandLine::new("mounter").arg("x:")).unwrap();
//! runner.fire_and_forget(&CommandLine::new("unmount").arg("x:")).unwrap();
//! child.wait().unwrap();
//!
//! assert_eq!(observer.events().len(), 3);
//! assert!(matches!(observer.events()[2], ProcessEvent::Exited { .. }));
//! ```

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::command::CommandLine;
use crate::error::MountError;
use crate::process::{ChildProcess, ExitOutcome, ProcessRunner};

/// Upper bound on [`ChildProcess::wait`] for fakes that were never asked to
/// unmount, so a broken test fails instead of hanging.
const FAKE_HANG_LIMIT: Duration = Duration::from_secs(30);

/// Something the fake runner observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A long-lived child was started
    Started { id: u32, command: CommandLine },
    /// A fire-and-forget command was issued
    Fired { command: CommandLine },
    /// A long-lived child was killed
    Killed { id: u32 },
    /// A long-lived child was observed to exit
    Exited { id: u32 },
}

#[derive(Debug, Default)]
struct FakeState {
    events: Vec<ProcessEvent>,
    next_id: u32,
    live: Vec<u32>,
    unmount_requested: HashMap<u32, Instant>,
}

/// In-memory [`ProcessRunner`]. Clones share the same event log.
#[derive(Debug, Clone, Default)]
pub struct FakeRunner {
    startup_delay: Duration,
    exit_latency: Duration,
    populate: Vec<PathBuf>,
    exit_immediately: Option<Option<i32>>,
    ignore_unmount: bool,
    state: Arc<Mutex<FakeState>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay between start and the creation of any [`populates`](Self::populates) paths.
    #[must_use]
    pub fn startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Delay between an unmount command and the child's exit.
    #[must_use]
    pub fn exit_latency(mut self, latency: Duration) -> Self {
        self.exit_latency = latency;
        self
    }

    /// Create an empty file at `path` once the startup delay has elapsed.
    #[must_use]
    pub fn populates(mut self, path: &Path) -> Self {
        self.populate.push(path.to_path_buf());
        self
    }

    /// Make every child exit right away with `code`, as a mounter that
    /// fails to bind the drive would.
    #[must_use]
    pub fn exits_immediately(mut self, code: Option<i32>) -> Self {
        self.exit_immediately = Some(code);
        self
    }

    /// Make children keep running after an unmount command, as a mounter
    /// that never bound the drive would. Only [`ChildProcess::kill`] ends them.
    #[must_use]
    pub fn ignores_unmount(mut self) -> Self {
        self.ignore_unmount = true;
        self
    }

    /// Everything observed so far.
    pub fn events(&self) -> Vec<ProcessEvent> {
        self.state.lock().events.clone()
    }

    /// Command lines of every started child, in order.
    pub fn started(&self) -> Vec<CommandLine> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                ProcessEvent::Started { command, .. } => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of children that have been started but not yet seen to exit.
    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }
}

impl ProcessRunner for FakeRunner {
    fn start(&mut self, command: &CommandLine) -> Result<Box<dyn ChildProcess>, MountError> {
        let id = {
            let mut state = self.state.lock();
            state.next_id += 1;
            let id = state.next_id;
            state.live.push(id);
            state.events.push(ProcessEvent::Started {
                id,
                command: command.clone(),
            });
            id
        };

        if !self.populate.is_empty() {
            let paths = self.populate.clone();
            let delay = self.startup_delay;
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                for path in paths {
                    if let Some(parent) = path.parent() {
                        let _ = std::fs::create_dir_all(parent);
                    }
                    let _ = std::fs::File::create(&path);
                }
            });
        }

        Ok(Box::new(FakeChild {
            id,
            exit_latency: self.exit_latency,
            exit_immediately: self.exit_immediately,
            ignore_unmount: self.ignore_unmount,
            killed: false,
            exited: None,
            state: Arc::clone(&self.state),
        }))
    }

    fn fire_and_forget(&mut self, command: &CommandLine) -> Result<(), MountError> {
        let mut state = self.state.lock();
        state.events.push(ProcessEvent::Fired {
            command: command.clone(),
        });
        let now = Instant::now();
        let live = state.live.clone();
        for id in live {
            state.unmount_requested.entry(id).or_insert(now);
        }
        Ok(())
    }
}

struct FakeChild {
    id: u32,
    exit_latency: Duration,
    exit_immediately: Option<Option<i32>>,
    ignore_unmount: bool,
    killed: bool,
    exited: Option<ExitOutcome>,
    state: Arc<Mutex<FakeState>>,
}

impl FakeChild {
    fn record_exit(&mut self, outcome: ExitOutcome) -> ExitOutcome {
        let mut state = self.state.lock();
        state.live.retain(|id| *id != self.id);
        state.unmount_requested.remove(&self.id);
        state.events.push(ProcessEvent::Exited { id: self.id });
        self.exited = Some(outcome);
        outcome
    }
}

impl ChildProcess for FakeChild {
    fn id(&self) -> u32 {
        self.id
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitOutcome>> {
        if let Some(outcome) = self.exited {
            return Ok(Some(outcome));
        }

        if self.killed {
            return Ok(Some(self.record_exit(ExitOutcome { code: None })));
        }
        if let Some(code) = self.exit_immediately {
            return Ok(Some(self.record_exit(ExitOutcome { code })));
        }
        if self.ignore_unmount {
            return Ok(None);
        }

        let requested = self.state.lock().unmount_requested.get(&self.id).copied();
        match requested {
            Some(at) if at.elapsed() >= self.exit_latency => {
                Ok(Some(self.record_exit(ExitOutcome { code: Some(0) })))
            }
            _ => Ok(None),
        }
    }

    fn wait(&mut self) -> io::Result<ExitOutcome> {
        let start = Instant::now();
        loop {
            if let Some(outcome) = self.try_wait()? {
                return Ok(outcome);
            }
            if start.elapsed() > FAKE_HANG_LIMIT {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("fake mounter {} was never asked to unmount", self.id),
                ));
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        if self.exited.is_none() && !self.killed {
            self.killed = true;
            self.state.lock().events.push(ProcessEvent::Killed { id: self.id });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_runs_until_unmount() {
        let mut runner = FakeRunner::new();
        let mut child = runner.start(&CommandLine::new("mounter")).unwrap();

        assert_eq!(child.try_wait().unwrap(), None);
        assert_eq!(runner.live_count(), 1);

        runner.fire_and_forget(&CommandLine::new("unmount")).unwrap();
        assert_eq!(child.wait().unwrap(), ExitOutcome { code: Some(0) });
        assert_eq!(runner.live_count(), 0);
    }

    #[test]
    fn test_exit_latency_is_honored() {
        let mut runner = FakeRunner::new().exit_latency(Duration::from_millis(40));
        let mut child = runner.start(&CommandLine::new("mounter")).unwrap();

        let start = Instant::now();
        runner.fire_and_forget(&CommandLine::new("unmount")).unwrap();
        assert_eq!(child.try_wait().unwrap(), None);
        child.wait().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_events_are_ordered() {
        let mut runner = FakeRunner::new();
        let observer = runner.clone();
        let mut child = runner.start(&CommandLine::new("mounter").arg("x:")).unwrap();
        runner.fire_and_forget(&CommandLine::new("unmount").arg("x:")).unwrap();
        let id = child.id();
        child.wait().unwrap();

        assert_eq!(
            observer.events(),
            vec![
                ProcessEvent::Started {
                    id,
                    command: CommandLine::new("mounter").arg("x:"),
                },
                ProcessEvent::Fired {
                    command: CommandLine::new("unmount").arg("x:"),
                },
                ProcessEvent::Exited { id },
            ]
        );
    }

    #[test]
    fn test_unmount_only_affects_live_children() {
        let mut runner = FakeRunner::new();
        runner.fire_and_forget(&CommandLine::new("unmount")).unwrap();

        let mut child = runner.start(&CommandLine::new("mounter")).unwrap();
        assert_eq!(child.try_wait().unwrap(), None);
    }

    #[test]
    fn test_ignoring_child_only_ends_when_killed() {
        let mut runner = FakeRunner::new().ignores_unmount();
        let observer = runner.clone();
        let mut child = runner.start(&CommandLine::new("mounter")).unwrap();
        let id = child.id();

        runner.fire_and_forget(&CommandLine::new("unmount")).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(child.try_wait().unwrap(), None);

        child.kill().unwrap();
        assert_eq!(child.wait().unwrap(), ExitOutcome { code: None });
        assert_eq!(observer.live_count(), 0);
        assert_eq!(
            &observer.events()[2..],
            [ProcessEvent::Killed { id }, ProcessEvent::Exited { id }]
        );
    }

    #[test]
    fn test_wait_or_kill_on_ignoring_child() {
        let mut runner = FakeRunner::new().ignores_unmount();
        let mut child = runner.start(&CommandLine::new("mounter")).unwrap();
        runner.fire_and_forget(&CommandLine::new("unmount")).unwrap();

        let start = Instant::now();
        let outcome = crate::wait_or_kill(child.as_mut(), Duration::from_millis(30)).unwrap();
        assert_eq!(outcome.code, None);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
