//! On-disk fixture: layer directories, marker files and the merge-policy directory.
//!
//! Layout under the fixture root:
//!
//! ```text
//! folder0/file0 .. folder0/file<N-1>   base layer, the only one with files
//! folder1 .. folder<L-1>               empty layers
//! oneway/                              merge-policy input for the mounter
//! ```
//!
//! Everything is created only if missing, so re-running over an existing
//! fixture leaves it untouched.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::HarnessError;

pub const LAYER_PREFIX: &str = "folder";
pub const FILE_PREFIX: &str = "file";
pub const MERGE_POLICY_DIR: &str = "oneway";

/// Name of the `index`th marker file.
pub fn file_name(index: usize) -> String {
    format!("{FILE_PREFIX}{index}")
}

/// Name of the `index`th layer directory.
pub fn layer_name(index: usize) -> String {
    format!("{LAYER_PREFIX}{index}")
}

/// Ordered layer directories for one mount invocation.
///
/// Always the prefix `folder0 .. folder<count-1>`; the order is the merge
/// precedence handed to the mounter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSet {
    dirs: Vec<PathBuf>,
}

impl LayerSet {
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

/// The fixture rooted at one directory.
#[derive(Debug, Clone)]
pub struct Fixture {
    root: PathBuf,
    num_files: usize,
}

impl Fixture {
    /// An empty `root` keeps every path relative to the current directory,
    /// exactly as named (`folder0`, not `./folder0`).
    pub fn new(root: impl Into<PathBuf>, num_files: usize) -> Self {
        Self {
            root: root.into(),
            num_files,
        }
    }

    pub fn layer_dir(&self, index: usize) -> PathBuf {
        self.root.join(layer_name(index))
    }

    pub fn merge_policy_dir(&self) -> PathBuf {
        self.root.join(MERGE_POLICY_DIR)
    }

    /// Paths of the marker files inside the base layer.
    pub fn base_files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        let base = self.layer_dir(0);
        (0..self.num_files).map(move |i| base.join(file_name(i)))
    }

    /// Create the base layer, its marker files and the merge-policy directory.
    pub fn ensure_base_fixture(&self) -> Result<(), HarnessError> {
        ensure_dir(&self.layer_dir(0))?;
        ensure_dir(&self.merge_policy_dir())?;

        let mut created = 0usize;
        for path in self.base_files() {
            if ensure_empty_file(&path)? {
                created += 1;
            }
        }

        tracing::debug!(
            "Base fixture ready: {} files ({} created)",
            self.num_files,
            created
        );
        Ok(())
    }

    /// Create the directory for layer `index` if absent.
    pub fn ensure_layer_directory(&self, index: usize) -> Result<PathBuf, HarnessError> {
        let dir = self.layer_dir(index);
        ensure_dir(&dir)?;
        Ok(dir)
    }

    /// The first `count` layer directories, in creation order.
    pub fn layer_set(&self, count: usize) -> LayerSet {
        LayerSet {
            dirs: (0..count).map(|i| self.layer_dir(i)).collect(),
        }
    }
}

fn ensure_dir(path: &Path) -> Result<(), HarnessError> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|source| HarnessError::Fixture {
        path: path.to_path_buf(),
        source,
    })
}

/// Returns `true` if the file was created.
fn ensure_empty_file(path: &Path) -> Result<bool, HarnessError> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(source) => Err(HarnessError::Fixture {
            path: path.to_path_buf(),
            source,
        }),
    }
}
