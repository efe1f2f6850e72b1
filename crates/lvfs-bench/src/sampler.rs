//! Timed metadata workload against the mounted drive.

use std::path::{Path, PathBuf};
use std::time::Duration;

use quanta::Clock;

use crate::error::HarnessError;
use crate::fixture::file_name;

/// Result of one timed workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    pub elapsed: Duration,
    /// Lookups that failed; a non-zero count means the sample is suspect.
    pub failed_lookups: usize,
}

impl Measurement {
    pub fn seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Something that can time the workload on a live mount.
pub trait Sampler {
    fn measure(&mut self) -> Result<Measurement, HarnessError>;
}

/// Looks up the access time of every fixture file through the drive root.
///
/// Paths are built up front; the timer brackets only the lookup loop.
pub struct MetadataSampler {
    paths: Vec<PathBuf>,
    clock: Clock,
}

impl MetadataSampler {
    pub fn new(drive_root: &Path, num_files: usize) -> Self {
        Self {
            paths: (0..num_files).map(|i| drive_root.join(file_name(i))).collect(),
            clock: Clock::new(),
        }
    }

    /// Replace the clock, e.g. with a mocked one in tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Sampler for MetadataSampler {
    fn measure(&mut self) -> Result<Measurement, HarnessError> {
        let mut failed_lookups = 0;

        let start = self.clock.now();
        for path in &self.paths {
            match std::fs::metadata(path) {
                Ok(meta) => {
                    std::hint::black_box(meta.accessed().ok());
                }
                Err(_) => failed_lookups += 1,
            }
        }
        let elapsed = self.clock.now().duration_since(start);

        if failed_lookups > 0 {
            tracing::warn!(
                "{} of {} lookups failed through the mount; sample is not meaningful",
                failed_lookups,
                self.paths.len()
            );
        }

        Ok(Measurement {
            elapsed,
            failed_lookups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_address_drive_root() {
        let sampler = MetadataSampler::new(Path::new("/mnt/lvfs"), 2);
        assert_eq!(
            sampler.paths(),
            [PathBuf::from("/mnt/lvfs/file0"), PathBuf::from("/mnt/lvfs/file1")]
        );
    }

    #[test]
    fn test_measure_existing_files() {
        let temp = TempDir::new().unwrap();
        for i in 0..5 {
            std::fs::File::create(temp.path().join(file_name(i))).unwrap();
        }

        let mut sampler = MetadataSampler::new(temp.path(), 5);
        let measurement = sampler.measure().unwrap();
        assert_eq!(measurement.failed_lookups, 0);
        assert!(measurement.seconds() >= 0.0);
    }

    #[test]
    fn test_missing_files_are_counted_not_fatal() {
        let temp = TempDir::new().unwrap();
        std::fs::File::create(temp.path().join("file0")).unwrap();

        let mut sampler = MetadataSampler::new(temp.path(), 3);
        let measurement = sampler.measure().unwrap();
        assert_eq!(measurement.failed_lookups, 2);
    }

    #[test]
    fn test_time_outside_workload_is_excluded() {
        let temp = TempDir::new().unwrap();
        let (clock, mock) = Clock::mock();
        let mut sampler = MetadataSampler::new(temp.path(), 0).with_clock(clock);

        // Time that passes between samples (settle delays, unmount) is not measured.
        mock.increment(Duration::from_secs(1));
        let first = sampler.measure().unwrap();
        mock.increment(Duration::from_secs(1));
        let second = sampler.measure().unwrap();

        assert_eq!(first.elapsed, Duration::ZERO);
        assert_eq!(second.elapsed, Duration::ZERO);
    }
}
