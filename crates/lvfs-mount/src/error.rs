//! Error type for mounter process orchestration.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while starting, probing or stopping a mounter.
#[derive(Error, Debug)]
pub enum MountError {
    /// The mounter executable could not be started
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The unmount administrative command could not be started
    #[error("Failed to issue unmount command `{command}`: {source}")]
    UnmountCommand {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Waiting on or polling the mounter process failed
    #[error("Failed to wait for mounter (pid {pid}): {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },

    /// The mounter exited before the mount became usable
    #[error("Mounter exited before the mount became ready (exit code {code:?})")]
    MounterExited { code: Option<i32> },

    /// The probe path never became accessible
    #[error("Mount not ready after {waited:?}: {} is not accessible", probe.display())]
    NotReady { probe: PathBuf, waited: Duration },

    /// A mount was requested while another session is still alive
    #[error("A mount session is already active on {0}")]
    AlreadyMounted(String),

    /// An unmount was requested with no active session
    #[error("No mount session is active")]
    NotMounted,
}
