//! Redirection store: real lookup key → substitute path, plus the set of
//! known (real but order-significant) paths.
//!
//! Pure data, no OS interaction. Keys are unique and last write wins.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Mapping tables shared by every interception layer.
#[derive(Debug, Default)]
pub struct RedirectStore {
    redirects: HashMap<PathBuf, PathBuf>,
    known: HashSet<PathBuf>,
}

impl RedirectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redirect `key` to `substitute`. Idempotent per key; overwrites any
    /// previous substitute.
    pub fn redirect(&mut self, key: impl Into<PathBuf>, substitute: impl Into<PathBuf>) {
        let key = key.into();
        let substitute = substitute.into();
        debug!(key = %key.display(), substitute = %substitute.display(), "redirect");
        self.redirects.insert(key, substitute);
    }

    /// Remove a redirection. Removing an unknown key is a no-op.
    pub fn unredirect(&mut self, key: &Path) {
        self.redirects.remove(key);
    }

    pub fn is_redirected(&self, key: &Path) -> bool {
        self.redirects.contains_key(key)
    }

    /// The substitute for `key`, or `None` if not redirected. Callers on the
    /// interception path check [`Self::is_redirected`] or match on this.
    pub fn resolve(&self, key: &Path) -> Option<PathBuf> {
        self.redirects.get(key).cloned()
    }

    /// Mark a real path as order-significant: its content is never
    /// fabricated, but its enumeration order follows the ordering oracle.
    pub fn mark_known(&mut self, path: impl Into<PathBuf>) {
        self.known.insert(path.into());
    }

    pub fn unmark_known(&mut self, path: &Path) {
        self.known.remove(path);
    }

    pub fn is_known(&self, path: &Path) -> bool {
        self.known.contains(path)
    }

    /// Clear all redirections and known paths.
    pub fn reset(&mut self) {
        self.redirects.clear();
        self.known.clear();
    }
}
