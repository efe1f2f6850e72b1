//! Run configuration.

use std::path::PathBuf;
use std::time::Duration;

use lvfs_mount::{Readiness, StdioMode};
use serde::Serialize;

use crate::driver::ExperimentPlan;
use crate::fixture::Fixture;
use crate::mount::{
    probe_path, DriveTarget, MountSettings, UnmountCommand, DEFAULT_ABANDON_GRACE,
};

/// Default settle delay after mount and after unmount.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(1);

/// Opt-in readiness probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeConfig {
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

/// Everything needed to run one experiment.
#[derive(Debug, Clone, Serialize)]
pub struct BenchConfig {
    pub max_layers: usize,
    pub num_files: usize,
    pub num_samples: usize,
    pub mounter: PathBuf,
    pub drive: DriveTarget,
    /// `None` keeps fixture paths relative to the current directory.
    pub work_dir: Option<PathBuf>,
    pub output: PathBuf,
    pub settle_ms: u64,
    pub unmount: UnmountCommand,
    /// `None` means fixed settle delay with no verification.
    pub probe: Option<ProbeConfig>,
    pub quiet_mounter: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<PathBuf>,
}

impl BenchConfig {
    /// Config with platform defaults for everything but the four required values.
    pub fn new(max_layers: usize, num_files: usize, num_samples: usize, mounter: PathBuf) -> Self {
        Self {
            max_layers,
            num_files,
            num_samples,
            mounter,
            drive: DriveTarget::platform_default(),
            work_dir: None,
            output: PathBuf::from("results.csv"),
            settle_ms: u64::try_from(DEFAULT_SETTLE.as_millis()).unwrap_or(1000),
            unmount: UnmountCommand::platform_default(),
            probe: None,
            quiet_mounter: false,
            json: None,
        }
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn plan(&self) -> ExperimentPlan {
        ExperimentPlan {
            max_layers: self.max_layers,
            num_files: self.num_files,
            num_samples: self.num_samples,
        }
    }

    pub fn fixture(&self) -> Fixture {
        Fixture::new(self.work_dir.clone().unwrap_or_default(), self.num_files)
    }

    pub fn readiness(&self) -> Readiness {
        match self.probe {
            None => Readiness::SettleDelay(self.settle()),
            Some(probe) => Readiness::Probe {
                path: probe_path(&self.drive),
                interval: Duration::from_millis(probe.interval_ms),
                timeout: Duration::from_millis(probe.timeout_ms),
            },
        }
    }

    pub fn mount_settings(&self) -> MountSettings {
        MountSettings {
            mounter: self.mounter.clone(),
            drive: self.drive.clone(),
            merge_policy: self.fixture().merge_policy_dir(),
            unmount: self.unmount.clone(),
            readiness: self.readiness(),
            unmount_settle: self.settle(),
            abandon_grace: DEFAULT_ABANDON_GRACE,
        }
    }

    pub fn mounter_output(&self) -> StdioMode {
        if self.quiet_mounter {
            StdioMode::Null
        } else {
            StdioMode::Inherit
        }
    }
}
