//! Error type for the benchmark harness.

use std::io;
use std::path::PathBuf;

use lvfs_mount::MountError;
use thiserror::Error;

/// Fatal failures of an experiment run.
///
/// Nothing is retried: any of these ends the run, leaving the results file
/// valid up to the last synced row.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Experiment parameters are not usable
    #[error("Invalid parameters: {0}")]
    Usage(String),

    /// A fixture directory or file could not be created
    #[error("Failed to create fixture {}: {source}", path.display())]
    Fixture {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing or syncing the results file failed
    #[error("Failed to write results to {}: {source}", path.display())]
    Results {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A row was appended out of layer-count order
    #[error("Row for layer count {got} appended, expected {expected}")]
    RowOutOfOrder { expected: usize, got: usize },

    /// A row carries the wrong number of samples
    #[error("Row for layer count {layer_count} has {got} samples, expected {expected}")]
    RowLength {
        layer_count: usize,
        expected: usize,
        got: usize,
    },

    /// Exporting the JSON report failed
    #[error("Failed to export JSON report to {}: {source}", path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Mounting or unmounting failed
    #[error(transparent)]
    Mount(#[from] MountError),
}
