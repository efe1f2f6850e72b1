//! Command-line interface for the benchmark harness.

#![allow(clippy::struct_excessive_bools)]

use crate::config::{BenchConfig, ProbeConfig};
use crate::mount::{DriveTarget, UnmountCommand};
use clap::Parser;
use lvfs_mount::DEFAULT_PROBE_INTERVAL;
use std::path::PathBuf;

const DEFAULT_PROBE_INTERVAL_MS: u64 = DEFAULT_PROBE_INTERVAL.as_millis() as u64;

/// One-line usage printed on any argument error.
pub const USAGE: &str =
    "Usage: lvfs-bench <maxLayers> <numFiles> <numSamples> <path to mounter executable>";

/// Measure how metadata lookup latency through a layered virtual filesystem
/// scales with the number of layers.
///
/// For every layer count from 1 to MAX_LAYERS the mounter is started
/// NUM_SAMPLES times over folder0..folder<k-1>, each time timing a lookup of
/// all NUM_FILES files through the drive, then unmounted. Results go to a
/// CSV file, one synced row per layer count.
#[derive(Parser, Debug)]
#[command(name = "lvfs-bench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Highest layer count to measure.
    #[arg(value_name = "MAX_LAYERS", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_layers: u32,

    /// Number of files in the base layer.
    #[arg(value_name = "NUM_FILES", value_parser = clap::value_parser!(u32).range(1..))]
    pub num_files: u32,

    /// Mount/measure/unmount cycles per layer count.
    #[arg(value_name = "NUM_SAMPLES", value_parser = clap::value_parser!(u32).range(1..))]
    pub num_samples: u32,

    /// Path to the mounter executable.
    #[arg(value_name = "MOUNTER")]
    pub mounter: PathBuf,

    /// Virtual drive target passed to the mounter.
    ///
    /// Defaults to `x:` on Windows and `/mnt/lvfs` elsewhere.
    #[arg(long, env = "LVFS_BENCH_DRIVE")]
    pub drive: Option<String>,

    /// Directory holding the layer folders and the merge-policy directory.
    ///
    /// Defaults to the current directory, with relative names passed to the mounter.
    #[arg(long, env = "LVFS_BENCH_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Results file (truncated at start).
    #[arg(long, default_value = "results.csv", env = "LVFS_BENCH_OUTPUT")]
    pub output: PathBuf,

    /// Settle delay after each mount and each unmount, in milliseconds.
    #[arg(long, default_value = "1000", env = "LVFS_BENCH_SETTLE_MS")]
    pub settle_ms: u64,

    /// Program that asks the OS to detach the drive.
    ///
    /// Defaults to Dokan's dokanctl on Windows and `fusermount` elsewhere.
    #[arg(long, env = "LVFS_BENCH_UNMOUNT_PROGRAM")]
    pub unmount_program: Option<PathBuf>,

    /// Argument placed before the drive target in the unmount command.
    ///
    /// Can be given multiple times. Defaults to `/u` on Windows and `-u`
    /// elsewhere when no unmount program is given.
    #[arg(long = "unmount-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub unmount_args: Vec<String>,

    /// Poll the drive until the first file is visible instead of trusting the
    /// settle delay after mount.
    #[arg(long)]
    pub probe: bool,

    /// Poll period for --probe, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_PROBE_INTERVAL_MS)]
    pub probe_interval_ms: u64,

    /// Give up on a mount after this many milliseconds with --probe.
    #[arg(long, default_value = "10000")]
    pub probe_timeout_ms: u64,

    /// Discard the mounter's stdout and stderr.
    #[arg(long)]
    pub quiet_mounter: bool,

    /// Also export raw samples to a JSON file.
    #[arg(long, value_name = "PATH")]
    pub json: Option<PathBuf>,

    /// Disable colored output.
    #[arg(long)]
    pub no_color: bool,

    /// Verbose output.
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    /// Build the run configuration.
    pub fn into_config(self) -> BenchConfig {
        let mut config = BenchConfig::new(
            self.max_layers as usize,
            self.num_files as usize,
            self.num_samples as usize,
            self.mounter,
        );

        if let Some(drive) = self.drive {
            config.drive = DriveTarget::new(drive);
        }
        config.work_dir = self.work_dir;
        config.output = self.output;
        config.settle_ms = self.settle_ms;

        config.unmount = match (self.unmount_program, self.unmount_args.is_empty()) {
            (Some(program), _) => UnmountCommand::new(program, self.unmount_args),
            (None, true) => UnmountCommand::platform_default(),
            (None, false) => UnmountCommand {
                args: self.unmount_args,
                ..UnmountCommand::platform_default()
            },
        };

        if self.probe {
            config.probe = Some(ProbeConfig {
                interval_ms: self.probe_interval_ms,
                timeout_ms: self.probe_timeout_ms,
            });
        }
        config.quiet_mounter = self.quiet_mounter;
        config.json = self.json;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("lvfs-bench").chain(args.iter().copied()))
    }

    #[test]
    fn test_positional_arguments() {
        let config = parse(&["3", "2", "1", "mounter.exe"]).unwrap().into_config();
        assert_eq!(config.max_layers, 3);
        assert_eq!(config.num_files, 2);
        assert_eq!(config.num_samples, 1);
        assert_eq!(config.mounter, PathBuf::from("mounter.exe"));
        assert_eq!(config.output, PathBuf::from("results.csv"));
        assert_eq!(config.settle_ms, 1000);
        assert!(config.probe.is_none());
    }

    #[test]
    fn test_missing_arguments_rejected() {
        let err = parse(&["3", "2", "1"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_extra_arguments_rejected() {
        assert!(parse(&["3", "2", "1", "mounter", "extra"]).is_err());
    }

    #[test]
    fn test_non_positive_rejected() {
        assert!(parse(&["0", "2", "1", "mounter"]).is_err());
        assert!(parse(&["3", "-2", "1", "mounter"]).is_err());
        assert!(parse(&["3", "2", "x", "mounter"]).is_err());
    }

    #[test]
    fn test_unmount_command_overrides() {
        let config = parse(&[
            "1",
            "1",
            "1",
            "mounter",
            "--unmount-program",
            "umount",
            "--unmount-arg",
            "-l",
        ])
        .unwrap()
        .into_config();
        assert_eq!(config.unmount, UnmountCommand::new("umount", vec!["-l".to_string()]));

        let config = parse(&["1", "1", "1", "mounter", "--unmount-program", "true"])
            .unwrap()
            .into_config();
        assert!(config.unmount.args.is_empty());

        let config = parse(&["1", "1", "1", "mounter"]).unwrap().into_config();
        assert_eq!(config.unmount, UnmountCommand::platform_default());
    }

    #[test]
    fn test_probe_options() {
        let config = parse(&["1", "1", "1", "mounter", "--probe", "--probe-timeout-ms", "250"])
            .unwrap()
            .into_config();
        assert_eq!(
            config.probe,
            Some(ProbeConfig {
                interval_ms: DEFAULT_PROBE_INTERVAL.as_millis() as u64,
                timeout_ms: 250,
            })
        );
        assert_eq!(
            config.readiness(),
            lvfs_mount::Readiness::Probe {
                path: crate::mount::probe_path(&config.drive),
                interval: DEFAULT_PROBE_INTERVAL,
                timeout: std::time::Duration::from_millis(250),
            }
        );

        let config = parse(&["1", "1", "1", "mounter", "--probe-timeout-ms", "250"])
            .unwrap()
            .into_config();
        assert!(config.probe.is_none());
    }
}
