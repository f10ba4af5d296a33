//! Ordering oracle seam.
//!
//! The canonical, insertion-ordered listing of a synthetic test folder is
//! owned by an external authority (the harness' folder manager). The engine
//! only ever asks "what are the expected contents of folder X, in order";
//! it never maintains that order itself.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Query interface to the ordering authority.
///
/// The returned sequence reflects the insertion order of the synthetic
/// folder's population, independent of any filesystem timestamp or name
/// ordering.
pub trait OrderingOracle: Send + Sync {
    fn ordered_contents(&self, folder: &Path) -> Vec<OsString>;
}

/// In-memory insertion-ordered ledger, the default oracle adapter.
///
/// The harness records a name each time it materializes a file in a
/// synthetic folder. Internally locked so a harness can keep appending
/// after the session has captured its `Arc`.
#[derive(Debug, Default)]
pub struct FolderLedger {
    folders: Mutex<HashMap<PathBuf, Vec<OsString>>>,
}

impl FolderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `name` to the folder's ordered listing. Re-recording an
    /// existing name keeps its original position.
    pub fn record(&self, folder: impl Into<PathBuf>, name: impl Into<OsString>) {
        let name = name.into();
        let mut folders = self.folders.lock().unwrap_or_else(|e| e.into_inner());
        let list = folders.entry(folder.into()).or_default();
        if !list.contains(&name) {
            list.push(name);
        }
    }

    /// Remove `name` from the folder's listing, keeping the remaining order.
    pub fn forget(&self, folder: &Path, name: &OsString) {
        let mut folders = self.folders.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(list) = folders.get_mut(folder) {
            list.retain(|n| n != name);
        }
    }

    /// Drop every folder's listing.
    pub fn clear(&self) {
        self.folders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl OrderingOracle for FolderLedger {
    fn ordered_contents(&self, folder: &Path) -> Vec<OsString> {
        self.folders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(folder)
            .cloned()
            .unwrap_or_default()
    }
}
