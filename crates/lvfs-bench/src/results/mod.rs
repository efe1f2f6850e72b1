//! Results file and report export.
//!
//! The results file is comma-separated text:
//!
//! ```text
//! Access times for 100 files:
//! Layer count, sample 1, sample 2, sample 3
//! 1,0.0123,0.0119,0.0121
//! 2,0.0131,0.0128,0.0130
//! ```
//!
//! Each row is flushed and synced to storage before [`ResultsSink::append_row`]
//! returns, so a crash loses at most the row in progress.

mod export;

pub use export::{export_json, RunReport};

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::HarnessError;

/// Sample times for one layer count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRow {
    pub layer_count: usize,
    /// Elapsed seconds, in sampling order
    pub samples: Vec<f64>,
}

/// Everything a completed run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub output: PathBuf,
    pub rows: Vec<SampleRow>,
    /// Metadata lookups that failed through the mount, across all samples
    pub failed_lookups: usize,
}

/// The two header lines describing the columns.
pub fn format_header(num_files: usize, num_samples: usize) -> String {
    let mut header = format!("Access times for {num_files} files:\nLayer count");
    for i in 1..=num_samples {
        let _ = write!(header, ", sample {i}");
    }
    header.push('\n');
    header
}

/// One data line: the layer count then every sample in seconds.
pub fn format_row(layer_count: usize, samples: &[f64]) -> String {
    let mut row = layer_count.to_string();
    for sample in samples {
        let _ = write!(row, ",{sample}");
    }
    row.push('\n');
    row
}

/// Append-only writer for the results file.
///
/// Rows must arrive with layer counts `1, 2, 3, ...` and exactly as many
/// samples as the header announced.
pub struct ResultsSink {
    path: PathBuf,
    writer: BufWriter<File>,
    num_samples: usize,
    rows_written: usize,
}

impl ResultsSink {
    /// Create (or truncate) the results file and write its header.
    pub fn create(path: &Path, num_files: usize, num_samples: usize) -> Result<Self, HarnessError> {
        let file = File::create(path).map_err(|source| HarnessError::Results {
            path: path.to_path_buf(),
            source,
        })?;

        let mut sink = Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            num_samples,
            rows_written: 0,
        };
        sink.write_header(num_files)?;
        Ok(sink)
    }

    fn write_header(&mut self, num_files: usize) -> Result<(), HarnessError> {
        let header = format_header(num_files, self.num_samples);
        self.write_durable(&header)
    }

    /// Write one row and force it to storage.
    pub fn append_row(&mut self, layer_count: usize, samples: &[f64]) -> Result<(), HarnessError> {
        let expected = self.rows_written + 1;
        if layer_count != expected {
            return Err(HarnessError::RowOutOfOrder {
                expected,
                got: layer_count,
            });
        }
        if samples.len() != self.num_samples {
            return Err(HarnessError::RowLength {
                layer_count,
                expected: self.num_samples,
                got: samples.len(),
            });
        }

        self.write_durable(&format_row(layer_count, samples))?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final sync, then close the file.
    pub fn close(mut self) -> Result<PathBuf, HarnessError> {
        self.sync()?;
        Ok(self.path)
    }

    fn write_durable(&mut self, text: &str) -> Result<(), HarnessError> {
        self.writer
            .write_all(text.as_bytes())
            .map_err(|source| HarnessError::Results {
                path: self.path.clone(),
                source,
            })?;
        self.sync()
    }

    fn sync(&mut self) -> Result<(), HarnessError> {
        self.writer
            .flush()
            .and_then(|()| self.writer.get_ref().sync_all())
            .map_err(|source| HarnessError::Results {
                path: self.path.clone(),
                source,
            })
    }
}
