//! Mount sessions for the layered filesystem under test.
//!
//! A session is one run of the external mounter bound to the drive target:
//!
//! ```text
//! Unmounted -> Mounting -> Mounted -> Unmounting -> Unmounted
//! ```
//!
//! Unmounting is two-step. The administrative unmount command only asks the
//! OS to detach the drive and is never awaited; the session is over once the
//! mounter process itself has exited. Only then may the next session start,
//! otherwise two mounters could race for the same drive target.

use std::ffi::OsString;
use std::path::{PathBuf, MAIN_SEPARATOR};
use std::time::Duration;

use lvfs_mount::{
    wait_or_kill, wait_until_ready, ChildProcess, CommandLine, MountError, ProcessRunner,
    Readiness,
};
use serde::Serialize;

use crate::fixture::LayerSet;

/// How long a mounter whose mount never became ready gets to exit after the
/// unmount command before it is killed.
pub const DEFAULT_ABANDON_GRACE: Duration = Duration::from_secs(2);

/// Mount/unmount as seen by the experiment driver.
pub trait MountControl {
    /// Start a session over `layers` and return once it is usable.
    fn mount(&mut self, layers: &LayerSet) -> Result<(), MountError>;

    /// End the current session and return once the mounter has exited.
    fn unmount(&mut self) -> Result<(), MountError>;
}

/// The OS-visible location the mounter binds, e.g. `x:` or `/mnt/lvfs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DriveTarget(String);

impl DriveTarget {
    pub fn new(target: impl Into<String>) -> Self {
        Self(target.into())
    }

    pub fn platform_default() -> Self {
        if cfg!(windows) {
            Self::new("x:")
        } else {
            Self::new("/mnt/lvfs")
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory through which the merged view is addressed.
    ///
    /// A bare drive letter (`x:`) is drive-relative on Windows, so its root
    /// needs an explicit separator.
    pub fn root(&self) -> PathBuf {
        if self.0.ends_with(':') {
            PathBuf::from(format!("{}{}", self.0, MAIN_SEPARATOR))
        } else {
            PathBuf::from(&self.0)
        }
    }
}

impl std::fmt::Display for DriveTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The administrative command that asks the OS to detach the drive.
///
/// Invoked as `<program> <args...> <drive target>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmountCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl UnmountCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Dokan's control tool on Windows, `fusermount -u` elsewhere.
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            Self::new(
                r"C:\Program Files\Dokan\DokanLibrary-1.0.1\dokanctl.exe",
                vec!["/u".to_string()],
            )
        } else {
            Self::new("fusermount", vec!["-u".to_string()])
        }
    }

    pub fn command_for(&self, drive: &DriveTarget) -> CommandLine {
        CommandLine::new(self.program.as_os_str())
            .args(&self.args)
            .arg(drive.as_str())
    }
}

/// Fixed inputs of every session.
#[derive(Debug, Clone)]
pub struct MountSettings {
    pub mounter: PathBuf,
    pub drive: DriveTarget,
    pub merge_policy: PathBuf,
    pub unmount: UnmountCommand,
    pub readiness: Readiness,
    /// Pause after the mounter has exited
    pub unmount_settle: Duration,
    /// Exit deadline for a mounter that failed to become ready
    pub abandon_grace: Duration,
}

impl MountSettings {
    /// `<mounter> <drive> <layer>... -o=<merge policy>`
    pub fn mounter_command(&self, layers: &LayerSet) -> CommandLine {
        let mut merge_option = OsString::from("-o=");
        merge_option.push(self.merge_policy.as_os_str());

        CommandLine::new(self.mounter.as_os_str())
            .arg(self.drive.as_str())
            .args(layers.dirs().iter().map(|dir| dir.as_os_str()))
            .arg(merge_option)
    }
}

/// Where a [`MountController`] is in the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountPhase {
    Unmounted,
    Mounting,
    Mounted,
    Unmounting,
}

/// Drives the external mounter through a [`ProcessRunner`].
pub struct MountController<R: ProcessRunner> {
    runner: R,
    settings: MountSettings,
    phase: MountPhase,
    session: Option<Box<dyn ChildProcess>>,
}

impl<R: ProcessRunner> MountController<R> {
    pub fn new(runner: R, settings: MountSettings) -> Self {
        Self {
            runner,
            settings,
            phase: MountPhase::Unmounted,
            session: None,
        }
    }

    pub fn phase(&self) -> MountPhase {
        self.phase
    }

    pub fn settings(&self) -> &MountSettings {
        &self.settings
    }

    /// Tear down a session whose mount never became usable.
    fn abandon_failed_mount(&mut self, mut child: Box<dyn ChildProcess>, error: &MountError) {
        if !matches!(error, MountError::MounterExited { .. }) {
            let command = self.settings.unmount.command_for(&self.settings.drive);
            if let Err(e) = self.runner.fire_and_forget(&command) {
                tracing::warn!("Failed to unmount after failed mount: {}", e);
            }
        }
        if let Err(e) = wait_or_kill(child.as_mut(), self.settings.abandon_grace) {
            tracing::warn!("Failed to reap mounter (pid {}): {}", child.id(), e);
        }
    }
}

impl<R: ProcessRunner> MountControl for MountController<R> {
    fn mount(&mut self, layers: &LayerSet) -> Result<(), MountError> {
        if self.phase != MountPhase::Unmounted {
            return Err(MountError::AlreadyMounted(self.settings.drive.to_string()));
        }

        let command = self.settings.mounter_command(layers);
        tracing::debug!("Mounting {} layers: {}", layers.len(), command);

        self.phase = MountPhase::Mounting;
        let mut child = match self.runner.start(&command) {
            Ok(child) => child,
            Err(e) => {
                self.phase = MountPhase::Unmounted;
                return Err(e);
            }
        };

        match wait_until_ready(child.as_mut(), &self.settings.readiness) {
            Ok(waited) => {
                tracing::debug!("Mounter pid {} ready after {:?}", child.id(), waited);
                self.session = Some(child);
                self.phase = MountPhase::Mounted;
                Ok(())
            }
            Err(e) => {
                self.abandon_failed_mount(child, &e);
                self.phase = MountPhase::Unmounted;
                Err(e)
            }
        }
    }

    fn unmount(&mut self) -> Result<(), MountError> {
        if self.phase != MountPhase::Mounted {
            return Err(MountError::NotMounted);
        }

        let command = self.settings.unmount.command_for(&self.settings.drive);
        self.phase = MountPhase::Unmounting;
        if let Err(e) = self.runner.fire_and_forget(&command) {
            self.phase = MountPhase::Mounted;
            return Err(e);
        }

        let Some(mut child) = self.session.take() else {
            self.phase = MountPhase::Unmounted;
            return Err(MountError::NotMounted);
        };

        let pid = child.id();
        tracing::debug!("Waiting for mounter pid {} to exit", pid);
        let outcome = match child.wait() {
            Ok(outcome) => outcome,
            Err(source) => {
                // Still ours: a later unmount or Drop can retry.
                self.session = Some(child);
                self.phase = MountPhase::Mounted;
                return Err(MountError::Wait { pid, source });
            }
        };
        if !outcome.success() {
            tracing::debug!("Mounter pid {} exited with code {:?}", pid, outcome.code);
        }

        std::thread::sleep(self.settings.unmount_settle);
        self.phase = MountPhase::Unmounted;
        Ok(())
    }
}

impl<R: ProcessRunner> Drop for MountController<R> {
    fn drop(&mut self) {
        if let Some(child) = self.session.take() {
            tracing::warn!(
                "Mount session (pid {}) still active on {}, requesting unmount",
                child.id(),
                self.settings.drive
            );
            let command = self.settings.unmount.command_for(&self.settings.drive);
            if let Err(e) = self.runner.fire_and_forget(&command) {
                tracing::warn!("Failed to unmount {}: {}", self.settings.drive, e);
            }
        }
    }
}

/// Probe path used by [`Readiness::Probe`]: the first fixture file, as seen
/// through the drive root.
pub fn probe_path(drive: &DriveTarget) -> PathBuf {
    drive.root().join(crate::fixture::file_name(0))
}
