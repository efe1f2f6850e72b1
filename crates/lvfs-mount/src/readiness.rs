//! Deciding when a freshly started mount is usable.
//!
//! Mounters give no explicit "ready" signal. The default strategy is a fixed
//! settle delay with no verification at all; a slow or failed mount then
//! shows up only as meaningless measurements. [`Readiness::Probe`] is the
//! opt-in alternative: poll a path through the mount until it answers.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::error::MountError;
use crate::process::ChildProcess;

/// Default poll period for [`Readiness::Probe`]
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(50);

/// Strategy for waiting on a fresh mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Sleep for a fixed interval and assume the mount is usable.
    SettleDelay(Duration),
    /// Poll `path` until it is accessible, failing after `timeout`.
    Probe {
        path: PathBuf,
        interval: Duration,
        timeout: Duration,
    },
}

/// Check if a path is accessible within a timeout.
///
/// The `stat` runs on a helper thread so that a wedged mount cannot block
/// the caller past `timeout`.
pub fn is_path_accessible(path: &Path, timeout: Duration) -> bool {
    AccessCheck::new(path).poll(timeout).unwrap_or(false)
}

fn stat_ok(path: &Path) -> bool {
    std::fs::metadata(path).is_ok()
}

/// Repeated accessibility checks of one path with at most one `stat` in
/// flight. A check that has not answered yet is awaited again on the next
/// poll instead of being replaced, so a wedged mount costs one thread.
struct AccessCheck {
    path: PathBuf,
    check: fn(&Path) -> bool,
    pending: Option<mpsc::Receiver<bool>>,
    spawned: usize,
}

impl AccessCheck {
    fn new(path: &Path) -> Self {
        Self::with_check(path, stat_ok)
    }

    fn with_check(path: &Path, check: fn(&Path) -> bool) -> Self {
        Self {
            path: path.to_path_buf(),
            check,
            pending: None,
            spawned: 0,
        }
    }

    /// `None` if the outstanding check did not answer within `timeout`.
    fn poll(&mut self, timeout: Duration) -> Option<bool> {
        let rx = self.pending.get_or_insert_with(|| {
            let (tx, rx) = mpsc::channel();
            let path = self.path.clone();
            let check = self.check;
            std::thread::spawn(move || {
                let _ = tx.send(check(&path));
            });
            self.spawned += 1;
            rx
        });

        match rx.recv_timeout(timeout) {
            Ok(accessible) => {
                self.pending = None;
                Some(accessible)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                self.pending = None;
                Some(false)
            }
        }
    }
}

/// Wait until the mount backed by `child` is usable.
///
/// Returns how long the wait took.
///
/// # Errors
///
/// With [`Readiness::Probe`], returns [`MountError::MounterExited`] if the
/// child exits while being probed and [`MountError::NotReady`] if the probe
/// path is still inaccessible after the timeout.
pub fn wait_until_ready(
    child: &mut dyn ChildProcess,
    readiness: &Readiness,
) -> Result<Duration, MountError> {
    let start = Instant::now();

    match readiness {
        Readiness::SettleDelay(delay) => {
            std::thread::sleep(*delay);
            Ok(start.elapsed())
        }
        Readiness::Probe {
            path,
            interval,
            timeout,
        } => {
            let mut access = AccessCheck::new(path);
            loop {
                let exited = child.try_wait().map_err(|source| MountError::Wait {
                    pid: child.id(),
                    source,
                })?;
                if let Some(outcome) = exited {
                    return Err(MountError::MounterExited { code: outcome.code });
                }

                let check_timeout = (*interval).max(Duration::from_millis(1));
                if access.poll(check_timeout) == Some(true) {
                    let waited = start.elapsed();
                    tracing::debug!("{} accessible after {:?}", path.display(), waited);
                    return Ok(waited);
                }

                let waited = start.elapsed();
                if waited >= *timeout {
                    return Err(MountError::NotReady {
                        probe: path.clone(),
                        waited,
                    });
                }

                std::thread::sleep(*interval);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRunner;
    use crate::{CommandLine, ProcessRunner};
    use tempfile::TempDir;

    #[test]
    fn test_is_path_accessible() {
        let temp = TempDir::new().unwrap();
        assert!(is_path_accessible(temp.path(), Duration::from_secs(1)));
        assert!(!is_path_accessible(
            &temp.path().join("missing"),
            Duration::from_secs(1)
        ));
    }

    #[test]
    fn test_settle_delay_sleeps() {
        let mut runner = FakeRunner::new();
        let mut child = runner.start(&CommandLine::new("mounter")).unwrap();

        let waited = wait_until_ready(
            child.as_mut(),
            &Readiness::SettleDelay(Duration::from_millis(30)),
        )
        .unwrap();
        assert!(waited >= Duration::from_millis(30));
    }

    #[test]
    fn test_probe_succeeds_once_path_appears() {
        let temp = TempDir::new().unwrap();
        let probe = temp.path().join("file0");
        let mut runner = FakeRunner::new()
            .startup_delay(Duration::from_millis(100))
            .populates(&probe);
        let mut child = runner.start(&CommandLine::new("mounter")).unwrap();

        let readiness = Readiness::Probe {
            path: probe.clone(),
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        };
        let waited = wait_until_ready(child.as_mut(), &readiness).unwrap();
        assert!(waited >= Duration::from_millis(100));
        assert!(probe.exists());
    }

    #[test]
    fn test_probe_times_out() {
        let temp = TempDir::new().unwrap();
        let mut runner = FakeRunner::new();
        let mut child = runner.start(&CommandLine::new("mounter")).unwrap();

        let readiness = Readiness::Probe {
            path: temp.path().join("never"),
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(50),
        };
        let err = wait_until_ready(child.as_mut(), &readiness).unwrap_err();
        assert!(matches!(err, MountError::NotReady { waited, .. } if waited >= Duration::from_millis(50)));
    }

    #[test]
    fn test_probe_detects_early_exit() {
        let temp = TempDir::new().unwrap();
        let mut runner = FakeRunner::new().exits_immediately(Some(1));
        let mut child = runner.start(&CommandLine::new("mounter")).unwrap();

        let readiness = Readiness::Probe {
            path: temp.path().join("never"),
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        };
        let err = wait_until_ready(child.as_mut(), &readiness).unwrap_err();
        assert!(matches!(err, MountError::MounterExited { code: Some(1) }));
    }

    fn slow_stat(_: &Path) -> bool {
        std::thread::sleep(Duration::from_millis(150));
        true
    }

    #[test]
    fn test_unanswered_check_is_not_duplicated() {
        let mut access = AccessCheck::with_check(Path::new("/wedged"), slow_stat);

        for _ in 0..5 {
            assert_eq!(access.poll(Duration::from_millis(5)), None);
        }
        assert_eq!(access.spawned, 1);

        assert_eq!(access.poll(Duration::from_secs(5)), Some(true));
        assert_eq!(access.spawned, 1);

        // Answered; the next poll starts a fresh check.
        assert_eq!(access.poll(Duration::from_secs(5)), Some(true));
        assert_eq!(access.spawned, 2);
    }
}
