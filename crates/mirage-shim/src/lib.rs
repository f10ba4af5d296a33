//! # mirage-shim
//!
//! Session facade over the interception layers.
//!
//! A [`ShimSession`] owns every piece of virtualization state for one test
//! run: the redirection store, the directory engine and its ordering ledger,
//! the identity override, the registry overlay, and the fabricated adapter
//! catalogs. The intercepted entry points the hook glue routes here are
//! plain methods; the session consults its state and either reshapes the
//! answer or forwards to the real primitives untouched.
//!
//! Sessions are explicit objects rather than process-global state, so a
//! harness can drive several isolated sessions in one process and state from
//! one test can never leak into the next.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use mirage_adapters::{
    AdapterBus, AdapterDescriptor, AdapterFactory, BusAdapterInfo, GpuPreference,
};
use mirage_config::SearchPaths;
use mirage_core::host::{
    AccessMode, DirEntryRecord, DirPrimitives, DirToken, FilePrimitives, FileToken, HostOs,
    IdentityPrimitives,
};
use mirage_core::{fileops, DirEngine, FolderLedger, IdentityOverride, RedirectStore};
use mirage_registry::{MemRegistry, RegistryBackend, RegistryOverlay};

pub use mirage_adapters::{BusError, FactoryError, FakeAdapter, PropertyStatus};
pub use mirage_config::ManifestCategory;
pub use mirage_registry::OverlayError;

/// All virtualization state for one harness session.
pub struct ShimSession {
    search_paths: SearchPaths,
    store: RedirectStore,
    ledger: Arc<FolderLedger>,
    dirs: DirEngine,
    files: Arc<dyn FilePrimitives>,
    host_identity: Arc<dyn IdentityPrimitives>,
    identity: IdentityOverride,
    registry: RegistryOverlay,
    bus: AdapterBus,
    factory: AdapterFactory,
    app_package_path: Option<PathBuf>,
}

impl ShimSession {
    /// Production session: libc primitives, in-memory registry backend,
    /// search paths snapshotted from the environment.
    pub fn new() -> Self {
        let host = Arc::new(HostOs::new());
        Self::with_parts(
            host.clone(),
            host.clone(),
            host,
            Box::new(MemRegistry::new()),
            SearchPaths::from_env(),
        )
    }

    /// Session over injected primitives. Tests use this to script the "real"
    /// OS; the hook glue uses it to hand in the resolved originals of each
    /// preempted symbol.
    pub fn with_parts(
        dir_backend: Arc<dyn DirPrimitives>,
        files: Arc<dyn FilePrimitives>,
        host_identity: Arc<dyn IdentityPrimitives>,
        registry_backend: Box<dyn RegistryBackend>,
        search_paths: SearchPaths,
    ) -> Self {
        let ledger = Arc::new(FolderLedger::new());
        Self {
            search_paths,
            store: RedirectStore::new(),
            ledger: ledger.clone(),
            dirs: DirEngine::new(dir_backend, ledger),
            files,
            host_identity,
            identity: IdentityOverride::new(),
            registry: RegistryOverlay::new(registry_backend),
            bus: AdapterBus::new(),
            factory: AdapterFactory::new(),
            app_package_path: None,
        }
    }

    /// Default search locations the target program's discovery walks.
    pub fn search_paths(&self) -> &SearchPaths {
        &self.search_paths
    }

    /// The ordering ledger. The harness records each synthetic file here as
    /// it creates it; the directory engine serves that order back.
    pub fn ledger(&self) -> &Arc<FolderLedger> {
        &self.ledger
    }

    // ==================== Harness configuration ====================

    /// Redirect `real` to `substitute` for subsequent path operations.
    pub fn redirect_path(
        &mut self,
        real: impl Into<PathBuf>,
        substitute: impl Into<PathBuf>,
    ) {
        self.store.redirect(real, substitute);
    }

    pub fn remove_redirect(&mut self, real: &Path) {
        self.store.unredirect(real);
    }

    pub fn is_redirected(&self, real: &Path) -> bool {
        self.store.is_redirected(real)
    }

    /// Mark a real, unredirected directory as order-significant: it will be
    /// enumerated in the ledger's order rather than the OS order.
    pub fn mark_known(&mut self, path: impl Into<PathBuf>) {
        self.store.mark_known(path);
    }

    pub fn unmark_known(&mut self, path: &Path) {
        self.store.unmark_known(path);
    }

    pub fn set_fake_elevation(&mut self, elevated: bool) {
        self.identity.set_fake_elevation(elevated);
    }

    pub fn fake_elevation(&self) -> bool {
        self.identity.fake_elevation()
    }

    /// Path reported for the current application package, when simulated.
    pub fn set_app_package_path(&mut self, path: Option<PathBuf>) {
        self.app_package_path = path;
    }

    pub fn app_package_path(&self) -> Option<&Path> {
        self.app_package_path.as_deref()
    }

    /// Register a fabricated bus adapter backed by `owning_manifest`.
    pub fn add_bus_adapter(&mut self, info: BusAdapterInfo, owning_manifest: PathBuf) {
        self.bus.add_adapter(info, owning_manifest);
    }

    /// Register a fabricated factory adapter.
    pub fn add_factory_adapter(
        &mut self,
        descriptor: AdapterDescriptor,
        preference: GpuPreference,
    ) {
        self.factory.add_adapter(descriptor, preference);
    }

    /// Registry overlay, for setup/teardown and manifest registration.
    pub fn registry(&self) -> &RegistryOverlay {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut RegistryOverlay {
        &mut self.registry
    }

    /// Bus-adapter catalog, for intercepted enumeration queries.
    pub fn bus(&self) -> &AdapterBus {
        &self.bus
    }

    /// Factory-adapter catalog, for intercepted enumeration queries.
    pub fn factory(&self) -> &AdapterFactory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut AdapterFactory {
        &mut self.factory
    }

    /// Return the session to its initial state: redirects, known paths, the
    /// ledger, the identity flag, adapter catalogs, and the package path all
    /// clear. The registry overlay has its own setup/teardown lifecycle and
    /// is deliberately left alone.
    pub fn reset(&mut self) {
        self.store.reset();
        self.dirs.reset();
        self.ledger.clear();
        self.identity.reset();
        self.bus.reset();
        self.factory.reset();
        self.app_package_path = None;
        debug!("session reset");
    }

    // ==================== Intercepted surface ====================

    /// Intercepted `opendir`.
    pub fn opendir(&mut self, path: &Path) -> io::Result<DirToken> {
        self.dirs.open(path, &self.store)
    }

    /// Intercepted `readdir`.
    pub fn readdir(&mut self, token: DirToken) -> io::Result<Option<&DirEntryRecord>> {
        self.dirs.next(token)
    }

    /// Intercepted `closedir`.
    pub fn closedir(&mut self, token: DirToken) -> io::Result<()> {
        self.dirs.close(token)
    }

    /// Intercepted `fopen`: a file inside a redirected directory opens its
    /// counterpart in the substitute directory.
    pub fn fopen(&self, path: &Path, mode: &str) -> io::Result<FileToken> {
        match fileops::resolve_file_path(&self.store, path) {
            Some(rewritten) => self.files.fopen(&rewritten, mode),
            None => self.files.fopen(path, mode),
        }
    }

    /// Intercepted `fclose`.
    pub fn fclose(&self, token: FileToken) -> io::Result<()> {
        self.files.fclose(token)
    }

    /// Intercepted `access`, rewritten the same way as `fopen`.
    pub fn access(&self, path: &Path, mode: AccessMode) -> io::Result<()> {
        match fileops::resolve_file_path(&self.store, path) {
            Some(rewritten) => self.files.access(&rewritten, mode),
            None => self.files.access(path, mode),
        }
    }

    /// Intercepted effective-uid query.
    pub fn euid(&self) -> u32 {
        self.identity.euid(self.host_identity.as_ref())
    }

    /// Intercepted effective-gid query.
    pub fn egid(&self) -> u32 {
        self.identity.egid(self.host_identity.as_ref())
    }

    /// Intercepted secure-environment lookup.
    pub fn secure_getenv(&self, name: &str) -> Option<OsString> {
        self.identity.secure_getenv(self.host_identity.as_ref(), name)
    }
}

impl Default for ShimSession {
    fn default() -> Self {
        Self::new()
    }
}
