//! Directory virtualization engine.
//!
//! Redirected (and known) directories are opened with the real OS primitive,
//! but what `readdir` serves back is a reconciled view: the real entries
//! reordered and filtered to match the ordering oracle's authoritative list.
//! The OS enumeration order is filesystem-dependent and non-deterministic;
//! discovery-order-sensitive tests require the oracle's creation order
//! instead.
//!
//! Per-handle state keeps OS semantics intact: the token handed to the
//! caller is the real one, the reconciled sequence is computed exactly once
//! on the first read, the cursor only moves forward, and end-of-stream is
//! sticky until `closedir`.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::host::{DirEntryRecord, DirPrimitives, DirToken};
use crate::oracle::OrderingOracle;
use crate::redirect::RedirectStore;

/// One outstanding `opendir` → `closedir` session on a virtualized
/// directory.
#[derive(Debug)]
struct OpenDirState {
    /// The path the caller asked for.
    virtual_path: PathBuf,
    /// Folder key used for the oracle query: the substitute for redirected
    /// paths, the path itself for known paths.
    oracle_key: PathBuf,
    /// Populated exactly once, on the first read for this handle.
    reconciled: Option<Box<[DirEntryRecord]>>,
    cursor: usize,
}

/// Per-open-handle state machine over the real enumeration primitives.
pub struct DirEngine {
    backend: Arc<dyn DirPrimitives>,
    oracle: Arc<dyn OrderingOracle>,
    open: HashMap<DirToken, OpenDirState>,
    /// Holds the most recent passthrough entry, mirroring the per-stream
    /// buffer the real `readdir` returns a pointer into.
    scratch: Option<DirEntryRecord>,
}

impl DirEngine {
    pub fn new(backend: Arc<dyn DirPrimitives>, oracle: Arc<dyn OrderingOracle>) -> Self {
        Self {
            backend,
            oracle,
            open: HashMap::new(),
            scratch: None,
        }
    }

    /// Intercepted `opendir`.
    ///
    /// Redirected paths open the substitute directory; known paths open
    /// themselves. Both register handle state for reconciliation. Anything
    /// else passes through and registers nothing. An OS open failure is
    /// propagated untouched.
    pub fn open(&mut self, path: &Path, store: &RedirectStore) -> io::Result<DirToken> {
        if let Some(substitute) = store.resolve(path) {
            let token = self.backend.opendir(&substitute)?;
            debug!(
                path = %path.display(),
                substitute = %substitute.display(),
                "opendir redirected"
            );
            self.open.insert(
                token,
                OpenDirState {
                    virtual_path: path.to_path_buf(),
                    oracle_key: substitute,
                    reconciled: None,
                    cursor: 0,
                },
            );
            return Ok(token);
        }
        if store.is_known(path) {
            let token = self.backend.opendir(path)?;
            debug!(path = %path.display(), "opendir known path");
            self.open.insert(
                token,
                OpenDirState {
                    virtual_path: path.to_path_buf(),
                    oracle_key: path.to_path_buf(),
                    reconciled: None,
                    cursor: 0,
                },
            );
            return Ok(token);
        }
        self.backend.opendir(path)
    }

    /// Intercepted `readdir`.
    ///
    /// Unregistered handles pass straight through. Registered handles drain
    /// the real enumeration on first read, reconcile it against the oracle
    /// order, then serve one entry per call until the sticky end.
    pub fn next(&mut self, token: DirToken) -> io::Result<Option<&DirEntryRecord>> {
        if !self.open.contains_key(&token) {
            self.scratch = self.backend.readdir(token)?;
            return Ok(self.scratch.as_ref());
        }

        let state = match self.open.get_mut(&token) {
            Some(s) => s,
            None => return Ok(None),
        };

        if state.reconciled.is_none() {
            let mut drained = Vec::new();
            while let Some(entry) = self.backend.readdir(token)? {
                drained.push(entry);
            }
            let order = self.oracle.ordered_contents(&state.oracle_key);
            let sequence = reconcile(&drained, &order);
            debug!(
                path = %state.virtual_path.display(),
                drained = drained.len(),
                authoritative = order.len(),
                reconciled = sequence.len(),
                "readdir reconciled"
            );
            state.reconciled = Some(sequence);
        }

        let sequence = match state.reconciled.as_deref() {
            Some(s) => s,
            None => return Ok(None),
        };
        if state.cursor >= sequence.len() {
            trace!(path = %state.virtual_path.display(), "readdir end of stream");
            return Ok(None);
        }
        let entry = &sequence[state.cursor];
        state.cursor += 1;
        Ok(Some(entry))
    }

    /// Intercepted `closedir`.
    ///
    /// Drops the handle record if present, then always forwards to the real
    /// close: unredirected directories were opened with the real primitive
    /// too, and the underlying close must never be skipped.
    pub fn close(&mut self, token: DirToken) -> io::Result<()> {
        self.open.remove(&token);
        self.backend.closedir(token)
    }

    /// Number of live virtualized handles.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Drop all handle records. Tokens of still-open real streams revert to
    /// passthrough; the caller remains responsible for closing them.
    pub fn reset(&mut self) {
        self.open.clear();
        self.scratch = None;
    }
}

/// Impose the authoritative order on a drained OS listing.
///
/// Iterates the authoritative names and appends the first drained entry with
/// a byte-identical name. OS entries absent from the authoritative list are
/// dropped; authoritative names with no OS match are skipped, so an entry is
/// never fabricated without a backing record. Behavior when one real listing
/// reports the same name twice is implementation-defined (linear
/// first-match scan).
fn reconcile(drained: &[DirEntryRecord], order: &[std::ffi::OsString]) -> Box<[DirEntryRecord]> {
    let mut sequence = Vec::with_capacity(order.len());
    for name in order {
        if let Some(hit) = drained.iter().find(|entry| &entry.name == name) {
            sequence.push(hit.clone());
        }
    }
    sequence.into_boxed_slice()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{EntryKind, HostOs};
    use crate::oracle::FolderLedger;
    use std::ffi::OsString;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Scripted backend with a fixed, caller-chosen "OS" enumeration order
    /// and call accounting.
    #[derive(Default)]
    struct ScriptedFs {
        listings: Mutex<HashMap<PathBuf, Vec<DirEntryRecord>>>,
        cursors: Mutex<HashMap<u64, (PathBuf, usize)>>,
        next_token: AtomicU64,
        closes: Mutex<Vec<DirToken>>,
    }

    impl ScriptedFs {
        fn with_listing(path: &str, names: &[&str]) -> Self {
            let fs = Self {
                next_token: AtomicU64::new(1),
                ..Default::default()
            };
            fs.listings.lock().unwrap().insert(
                PathBuf::from(path),
                names
                    .iter()
                    .map(|n| DirEntryRecord {
                        name: OsString::from(n),
                        kind: EntryKind::File,
                    })
                    .collect(),
            );
            fs
        }

        fn close_count(&self, token: DirToken) -> usize {
            self.closes.lock().unwrap().iter().filter(|t| **t == token).count()
        }
    }

    impl DirPrimitives for ScriptedFs {
        fn opendir(&self, path: &Path) -> io::Result<DirToken> {
            if !self.listings.lock().unwrap().contains_key(path) {
                return Err(io::Error::from_raw_os_error(libc::ENOENT));
            }
            let token = self.next_token.fetch_add(1, Ordering::Relaxed);
            self.cursors
                .lock()
                .unwrap()
                .insert(token, (path.to_path_buf(), 0));
            Ok(DirToken(token))
        }

        fn readdir(&self, token: DirToken) -> io::Result<Option<DirEntryRecord>> {
            let mut cursors = self.cursors.lock().unwrap();
            let (path, pos) = match cursors.get_mut(&token.0) {
                Some(c) => c,
                None => return Err(io::Error::from_raw_os_error(libc::EBADF)),
            };
            let listings = self.listings.lock().unwrap();
            let entries = &listings[&*path];
            if *pos >= entries.len() {
                return Ok(None);
            }
            let entry = entries[*pos].clone();
            *pos += 1;
            Ok(Some(entry))
        }

        fn closedir(&self, token: DirToken) -> io::Result<()> {
            self.closes.lock().unwrap().push(token);
            self.cursors.lock().unwrap().remove(&token.0);
            Ok(())
        }
    }

    fn engine_with(fs: Arc<ScriptedFs>, ledger: Arc<FolderLedger>) -> DirEngine {
        DirEngine::new(fs, ledger)
    }

    // ==================== Ordering ====================

    #[test]
    fn test_redirected_dir_serves_oracle_order() {
        // "OS" reports b, c, a; the oracle says a, b, c.
        let fs = Arc::new(ScriptedFs::with_listing("/fake", &["b", "c", "a"]));
        let ledger = Arc::new(FolderLedger::new());
        ledger.record("/fake", "a");
        ledger.record("/fake", "b");
        ledger.record("/fake", "c");

        let mut store = RedirectStore::new();
        store.redirect("/real", "/fake");

        let mut engine = engine_with(fs, ledger);
        let token = engine.open(Path::new("/real"), &store).unwrap();

        assert_eq!(engine.next(token).unwrap().unwrap().name, OsString::from("a"));
        assert_eq!(engine.next(token).unwrap().unwrap().name, OsString::from("b"));
        assert_eq!(engine.next(token).unwrap().unwrap().name, OsString::from("c"));
        assert!(engine.next(token).unwrap().is_none());
    }

    #[test]
    fn test_end_of_stream_is_sticky() {
        let fs = Arc::new(ScriptedFs::with_listing("/fake", &["x"]));
        let ledger = Arc::new(FolderLedger::new());
        ledger.record("/fake", "x");

        let mut store = RedirectStore::new();
        store.redirect("/real", "/fake");

        let mut engine = engine_with(fs, ledger);
        let token = engine.open(Path::new("/real"), &store).unwrap();

        assert!(engine.next(token).unwrap().is_some());
        for _ in 0..5 {
            assert!(engine.next(token).unwrap().is_none());
        }
    }

    #[test]
    fn test_reconciliation_is_tolerant_not_strict() {
        // "stray" exists on disk but not in the oracle; "ghost" is promised
        // by the oracle with no backing file. Neither may appear.
        let fs = Arc::new(ScriptedFs::with_listing("/fake", &["stray", "real"]));
        let ledger = Arc::new(FolderLedger::new());
        ledger.record("/fake", "ghost");
        ledger.record("/fake", "real");

        let mut store = RedirectStore::new();
        store.redirect("/real", "/fake");

        let mut engine = engine_with(fs, ledger);
        let token = engine.open(Path::new("/real"), &store).unwrap();

        assert_eq!(engine.next(token).unwrap().unwrap().name, OsString::from("real"));
        assert!(engine.next(token).unwrap().is_none());
    }

    #[test]
    fn test_name_matching_is_case_sensitive() {
        let fs = Arc::new(ScriptedFs::with_listing("/fake", &["File.json"]));
        let ledger = Arc::new(FolderLedger::new());
        ledger.record("/fake", "file.json");

        let mut store = RedirectStore::new();
        store.redirect("/real", "/fake");

        let mut engine = engine_with(fs, ledger);
        let token = engine.open(Path::new("/real"), &store).unwrap();
        assert!(engine.next(token).unwrap().is_none());
    }

    #[test]
    fn test_reconciliation_happens_once_per_handle() {
        let fs = Arc::new(ScriptedFs::with_listing("/fake", &["a", "b"]));
        let ledger = Arc::new(FolderLedger::new());
        ledger.record("/fake", "a");

        let mut store = RedirectStore::new();
        store.redirect("/real", "/fake");

        let mut engine = engine_with(fs, ledger.clone());
        let token = engine.open(Path::new("/real"), &store).unwrap();

        assert_eq!(engine.next(token).unwrap().unwrap().name, OsString::from("a"));
        // Oracle changes after the first read are not observed by this handle.
        ledger.record("/fake", "b");
        assert!(engine.next(token).unwrap().is_none());
    }

    // ==================== Known paths ====================

    #[test]
    fn test_known_path_enumerates_itself_in_oracle_order() {
        let fs = Arc::new(ScriptedFs::with_listing("/known", &["2", "1"]));
        let ledger = Arc::new(FolderLedger::new());
        ledger.record("/known", "1");
        ledger.record("/known", "2");

        let mut store = RedirectStore::new();
        store.mark_known("/known");

        let mut engine = engine_with(fs, ledger);
        let token = engine.open(Path::new("/known"), &store).unwrap();
        assert_eq!(engine.next(token).unwrap().unwrap().name, OsString::from("1"));
        assert_eq!(engine.next(token).unwrap().unwrap().name, OsString::from("2"));
        assert!(engine.next(token).unwrap().is_none());
    }

    // ==================== Passthrough ====================

    #[test]
    fn test_unredirected_dir_passes_through() {
        let fs = Arc::new(ScriptedFs::with_listing("/plain", &["n1", "n2"]));
        let store = RedirectStore::new();

        let mut engine = engine_with(fs.clone(), Arc::new(FolderLedger::new()));
        let token = engine.open(Path::new("/plain"), &store).unwrap();
        assert_eq!(engine.open_count(), 0);

        // Raw backend order, untouched.
        assert_eq!(engine.next(token).unwrap().unwrap().name, OsString::from("n1"));
        assert_eq!(engine.next(token).unwrap().unwrap().name, OsString::from("n2"));
        assert!(engine.next(token).unwrap().is_none());

        engine.close(token).unwrap();
        assert_eq!(fs.close_count(token), 1);
    }

    #[test]
    fn test_open_failure_propagates_unchanged() {
        let fs = Arc::new(ScriptedFs::with_listing("/fake", &[]));
        let mut store = RedirectStore::new();
        store.redirect("/real", "/missing-substitute");

        let mut engine = engine_with(fs, Arc::new(FolderLedger::new()));
        let err = engine.open(Path::new("/real"), &store).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
        assert_eq!(engine.open_count(), 0);
    }

    // ==================== Close semantics ====================

    #[test]
    fn test_close_always_reaches_real_primitive_once() {
        let fs = Arc::new(ScriptedFs::with_listing("/fake", &["a"]));
        let ledger = Arc::new(FolderLedger::new());
        ledger.record("/fake", "a");

        let mut store = RedirectStore::new();
        store.redirect("/real", "/fake");

        let mut engine = engine_with(fs.clone(), ledger);
        let token = engine.open(Path::new("/real"), &store).unwrap();
        assert_eq!(engine.open_count(), 1);

        engine.close(token).unwrap();
        assert_eq!(fs.close_count(token), 1);
        assert_eq!(engine.open_count(), 0);

        // A token without a shim record still reaches the real close.
        let raw = fs.opendir(Path::new("/fake")).unwrap();
        engine.close(raw).unwrap();
        assert_eq!(fs.close_count(raw), 1);
    }

    #[test]
    fn test_fresh_open_after_close_rescans() {
        let fs = Arc::new(ScriptedFs::with_listing("/fake", &["a"]));
        let ledger = Arc::new(FolderLedger::new());
        ledger.record("/fake", "a");

        let mut store = RedirectStore::new();
        store.redirect("/real", "/fake");

        let mut engine = engine_with(fs, ledger);
        let t1 = engine.open(Path::new("/real"), &store).unwrap();
        assert!(engine.next(t1).unwrap().is_some());
        assert!(engine.next(t1).unwrap().is_none());
        engine.close(t1).unwrap();

        let t2 = engine.open(Path::new("/real"), &store).unwrap();
        assert_eq!(engine.next(t2).unwrap().unwrap().name, OsString::from("a"));
        engine.close(t2).unwrap();
    }

    #[test]
    fn test_reset_reverts_open_handles_to_passthrough() {
        let fs = Arc::new(ScriptedFs::with_listing("/fake", &["b", "a"]));
        let ledger = Arc::new(FolderLedger::new());
        ledger.record("/fake", "a");

        let mut store = RedirectStore::new();
        store.redirect("/real", "/fake");

        let mut engine = engine_with(fs.clone(), ledger);
        let token = engine.open(Path::new("/real"), &store).unwrap();
        engine.reset();
        assert_eq!(engine.open_count(), 0);

        // The still-open real stream now serves raw backend order.
        assert_eq!(engine.next(token).unwrap().unwrap().name, OsString::from("b"));
        engine.close(token).unwrap();
        assert_eq!(fs.close_count(token), 1);
    }

    // ==================== Real host backend ====================

    #[test]
    fn test_oracle_order_wins_over_real_filesystem_order() {
        let temp = tempdir().unwrap();
        let fake = temp.path().join("fake");
        std::fs::create_dir(&fake).unwrap();
        for name in ["zz.json", "aa.json", "mm.json"] {
            std::fs::write(fake.join(name), b"{}").unwrap();
        }

        let ledger = Arc::new(FolderLedger::new());
        // Deliberately neither alphabetical nor creation order on disk.
        ledger.record(&fake, "mm.json");
        ledger.record(&fake, "zz.json");
        ledger.record(&fake, "aa.json");

        let mut store = RedirectStore::new();
        store.redirect("/virtual/drivers.d", &fake);

        let mut engine = DirEngine::new(Arc::new(HostOs::new()), ledger);
        let token = engine.open(Path::new("/virtual/drivers.d"), &store).unwrap();

        let mut served = Vec::new();
        while let Some(entry) = engine.next(token).unwrap() {
            served.push(entry.name.clone());
        }
        engine.close(token).unwrap();

        assert_eq!(
            served,
            vec![
                OsString::from("mm.json"),
                OsString::from("zz.json"),
                OsString::from("aa.json"),
            ]
        );
    }
}
