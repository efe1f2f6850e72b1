//! Layer-count scaling benchmark for layered virtual filesystem mounters.
//!
//! The harness builds a fixture of `N` empty files in a base layer, then for
//! each layer count `1..=L` repeatedly mounts `folder0..folder<k-1>` through
//! an external mounter, times a metadata lookup of every file through the
//! mounted drive, and unmounts again. One CSV row per layer count is synced
//! to disk as soon as it is complete.
//!
//! # Components
//!
//! - [`fixture`] - directory/file fixture and layer sets
//! - [`mount`] - mount session lifecycle over an external mounter
//! - [`sampler`] - the timed workload
//! - [`results`] - durable results file and JSON export
//! - [`driver`] - the experiment loop tying it together

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod fixture;
pub mod mount;
pub mod results;
pub mod sampler;

pub use driver::{Experiment, ExperimentPlan};
pub use error::HarnessError;
