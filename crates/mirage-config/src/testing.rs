//! Test environment abstraction for isolated shim tests.
//!
//! Provides `TestEnvironment` to manage:
//! - A temporary tree of synthetic manifest folders, one per category
//! - Helpers to materialize files the redirected enumeration will serve
//!
//! The environment owns its `TempDir`; everything is removed on drop.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::ManifestCategory;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Root of the synthetic tree
    pub root: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment with one synthetic folder per
    /// manifest category.
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().to_path_buf();

        for category in ManifestCategory::ALL {
            std::fs::create_dir_all(root.join(category.folder_name()))?;
        }

        Ok(Self {
            _temp_dir: temp_dir,
            root,
            test_id,
        })
    }

    /// Synthetic folder backing a manifest category.
    pub fn category_dir(&self, category: ManifestCategory) -> PathBuf {
        self.root.join(category.folder_name())
    }

    /// Create a file under the synthetic tree with content
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.root.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Create a directory under the synthetic tree
    pub fn create_dir(&self, relative_path: &str) -> anyhow::Result<PathBuf> {
        let path = self.root.join(relative_path);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
