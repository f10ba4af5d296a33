//! File/access interception: stateless call rewriting for single-file
//! operations.
//!
//! Files are never individually redirected; they relocate with their
//! enclosing folder. Only the parent directory component participates in
//! redirection; the filename is carried over unchanged.

use std::path::{Path, PathBuf};
use tracing::trace;

use crate::redirect::RedirectStore;

/// Rewrite target for a single-file call, or `None` for passthrough.
///
/// A path with no parent component has nothing to redirect. Otherwise the
/// parent is looked up in the store and, when redirected, the call targets
/// `substitute/filename`.
pub fn resolve_file_path(store: &RedirectStore, path: &Path) -> Option<PathBuf> {
    let parent = path.parent()?;
    if parent.as_os_str().is_empty() {
        return None;
    }
    let filename = path.file_name()?;
    let rewritten = store.resolve(parent).map(|sub| sub.join(filename));
    if let Some(target) = &rewritten {
        trace!(path = %path.display(), target = %target.display(), "file call rewritten");
    }
    rewritten
}
