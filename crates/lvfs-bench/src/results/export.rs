//! JSON export of raw samples.

use std::path::Path;

use serde::Serialize;

use crate::config::BenchConfig;
use crate::error::HarnessError;
use crate::results::{RunSummary, SampleRow};

/// JSON-serializable run report
#[derive(Debug, Clone, Serialize)]
pub struct RunReport<'a> {
    pub metadata: ReportMetadata<'a>,
    pub rows: &'a [SampleRow],
    pub failed_lookups: usize,
}

/// Report metadata
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata<'a> {
    pub timestamp: String,
    pub platform: String,
    pub lvfs_bench_version: &'static str,
    pub results_file: String,
    pub config: &'a BenchConfig,
}

impl<'a> RunReport<'a> {
    pub fn new(summary: &'a RunSummary, config: &'a BenchConfig) -> Self {
        Self {
            metadata: ReportMetadata {
                timestamp: chrono::Utc::now().to_rfc3339(),
                platform: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
                lvfs_bench_version: env!("CARGO_PKG_VERSION"),
                results_file: summary.output.display().to_string(),
                config,
            },
            rows: &summary.rows,
            failed_lookups: summary.failed_lookups,
        }
    }
}

/// Export a finished run to a JSON file
pub fn export_json(
    summary: &RunSummary,
    config: &BenchConfig,
    path: &Path,
) -> Result<(), HarnessError> {
    let report = RunReport::new(summary, config);
    let json = serde_json::to_string_pretty(&report).map_err(|e| HarnessError::Export {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    std::fs::write(path, json).map_err(|source| HarnessError::Export {
        path: path.to_path_buf(),
        source,
    })
}
