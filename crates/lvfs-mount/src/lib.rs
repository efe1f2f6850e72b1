//! Process orchestration for external layered-filesystem mounters.
//!
//! The mounter is a separate executable that binds a virtual drive target
//! for as long as it runs. This crate provides the pieces needed to drive it
//! from a measurement harness without depending on a real mounter binary:
//!
//! - [`ProcessRunner`] / [`ChildProcess`] - the process-handle capability
//!   (start a long-lived child, fire a short-lived command, wait for exit)
//! - [`wait_or_kill`] - bounded reaping of a child that ignores unmount
//! - [`SystemRunner`] - the real implementation on top of `std::process`
//! - [`CommandLine`] - an owned, printable program + argument list
//! - [`Readiness`] - how to decide a fresh mount is usable (fixed settle
//!   delay, or an opt-in poll of a probe path)
//! - [`MountError`] - error type for all of the above
//!
//! With the `testing` feature, [`testing::FakeRunner`] simulates a mounter
//! with configurable startup delay and exit latency.

mod command;
mod error;
mod process;
mod readiness;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use command::CommandLine;
pub use error::MountError;
pub use process::{
    wait_or_kill, ChildProcess, ExitOutcome, ProcessRunner, StdioMode, SystemRunner,
};
pub use readiness::{is_path_accessible, wait_until_ready, Readiness, DEFAULT_PROBE_INTERVAL};
