//! Session-scoped registry overlay.
//!
//! `setup` carves out a private namespace under the current-user root,
//! mirrors both predefined roots beneath it, and redirects lookups there.
//! The namespace id is random and probed for non-existence before commit,
//! so two live sessions (or stale leftovers from a crashed one) never
//! share state.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use mirage_config::ManifestCategory;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{Hive, RegValue, RegistryBackend, RegistryError};

/// Parent of every session namespace.
const NAMESPACE_ROOT: &str = "Software\\MirageHarness";

/// Vendor key discovery routines query under the local-machine root.
const VENDOR_KEY: &str = "SOFTWARE\\Mirage";

/// Collision retries before giving up. With 32-bit ids this bound is never
/// reached in practice.
const MAX_NAMESPACE_PROBES: u32 = 64;

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("registry overlay already active; teardown required before setup")]
    AlreadyActive,
    #[error("registry overlay not active")]
    NotActive,
    #[error("could not find a free overlay namespace after {0} probes")]
    NamespaceExhausted(u32),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug)]
enum OverlayState {
    Idle,
    Active { namespace: String },
}

/// Overlay lifecycle: `Idle → setup → Active → teardown → Idle`.
pub struct RegistryOverlay {
    backend: Box<dyn RegistryBackend>,
    state: OverlayState,
    /// Driver manifests in insertion order, consumed by adapter binding
    /// queries. Registry value enumeration order is not authoritative.
    driver_manifests: Vec<PathBuf>,
    preserve_for_debugging: bool,
}

impl RegistryOverlay {
    pub fn new(backend: Box<dyn RegistryBackend>) -> Self {
        Self {
            backend,
            state: OverlayState::Idle,
            driver_manifests: Vec::new(),
            preserve_for_debugging: false,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, OverlayState::Active { .. })
    }

    /// Namespace path under the current-user root, while active.
    pub fn namespace(&self) -> Option<&str> {
        match &self.state {
            OverlayState::Active { namespace } => Some(namespace),
            OverlayState::Idle => None,
        }
    }

    /// Leave the overlay in place at teardown for post-mortem inspection.
    pub fn set_preserve_for_debugging(&mut self, preserve: bool) {
        self.preserve_for_debugging = preserve;
    }

    /// Create the session namespace and redirect both predefined roots
    /// into it. Namespace collisions are retried locally with a fresh
    /// random id and never surfaced to the caller.
    pub fn setup(&mut self) -> Result<(), OverlayError> {
        if self.is_active() {
            return Err(OverlayError::AlreadyActive);
        }

        let mut rng = rand::thread_rng();
        let mut namespace = None;
        for _ in 0..MAX_NAMESPACE_PROBES {
            let id: u32 = rng.gen();
            let candidate = format!("{}\\{:08x}", NAMESPACE_ROOT, id);
            if !self.backend.key_exists(Hive::CurrentUser, &candidate) {
                namespace = Some(candidate);
                break;
            }
            debug!(candidate = %candidate, "overlay namespace collision, retrying");
        }
        let namespace = namespace.ok_or(OverlayError::NamespaceExhausted(MAX_NAMESPACE_PROBES))?;

        self.backend.create_key(Hive::CurrentUser, &namespace)?;
        let hkcu_mirror = format!("{}\\HKCU", namespace);
        let hklm_mirror = format!("{}\\HKLM", namespace);
        self.backend.create_key(Hive::CurrentUser, &hkcu_mirror)?;
        self.backend.create_key(Hive::CurrentUser, &hklm_mirror)?;

        // Diagnosability marker for anyone inspecting a preserved overlay.
        let stamp = humantime::format_rfc3339_seconds(SystemTime::now()).to_string();
        self.backend.set_value(
            Hive::CurrentUser,
            &namespace,
            "setup_time",
            RegValue::Sz(stamp),
        )?;

        self.backend.override_root(Hive::CurrentUser, &hkcu_mirror)?;
        self.backend.override_root(Hive::LocalMachine, &hklm_mirror)?;

        info!(namespace = %namespace, "registry overlay active");
        self.state = OverlayState::Active { namespace };
        Ok(())
    }

    /// Add a manifest entry under the overridden local-machine root. The
    /// value payload encodes enabled (0) or disabled (1). Driver manifests
    /// are additionally appended to the ordered driver list.
    pub fn add_manifest(
        &mut self,
        category: ManifestCategory,
        path: &Path,
        enabled: bool,
    ) -> Result<(), OverlayError> {
        if !self.is_active() {
            return Err(OverlayError::NotActive);
        }

        let key = Self::category_key(category);
        if !self.backend.key_exists(Hive::LocalMachine, &key) {
            self.backend.create_key(Hive::LocalMachine, &key)?;
        }
        let name = path.to_string_lossy();
        let payload = RegValue::Dword(if enabled { 0 } else { 1 });
        self.backend
            .set_value(Hive::LocalMachine, &key, &name, payload)?;

        if category == ManifestCategory::Driver {
            self.driver_manifests.push(path.to_path_buf());
        }
        debug!(category = ?category, manifest = %name, enabled, "manifest entry added");
        Ok(())
    }

    /// Remove a manifest entry; also drops driver manifests from the
    /// ordered list.
    pub fn remove_manifest(
        &mut self,
        category: ManifestCategory,
        path: &Path,
    ) -> Result<(), OverlayError> {
        if !self.is_active() {
            return Err(OverlayError::NotActive);
        }
        let key = Self::category_key(category);
        self.backend
            .delete_value(Hive::LocalMachine, &key, &path.to_string_lossy())?;
        if category == ManifestCategory::Driver {
            self.driver_manifests.retain(|p| p != path);
        }
        Ok(())
    }

    /// Manifest entries of `category` as `(path, enabled)` pairs, in the
    /// backend's enumeration order.
    pub fn manifest_entries(
        &self,
        category: ManifestCategory,
    ) -> Result<Vec<(String, bool)>, OverlayError> {
        if !self.is_active() {
            return Err(OverlayError::NotActive);
        }
        let key = Self::category_key(category);
        let values = self.backend.enumerate_values(Hive::LocalMachine, &key)?;
        Ok(values
            .into_iter()
            .map(|(name, value)| {
                let enabled = matches!(value, RegValue::Dword(0));
                (name, enabled)
            })
            .collect())
    }

    /// Ordered list of known driver manifest paths.
    pub fn driver_manifests(&self) -> &[PathBuf] {
        &self.driver_manifests
    }

    /// Read-side passthrough for intercepted key/value queries.
    pub fn backend(&self) -> &dyn RegistryBackend {
        self.backend.as_ref()
    }

    /// Revert the root overrides, delete the namespace subtree (unless
    /// preserved), and clear in-memory records. Idempotent; cleanup
    /// failures are logged and otherwise ignored; at teardown the test
    /// process is already shutting down and cannot usefully recover.
    pub fn teardown(&mut self) {
        let namespace = match std::mem::replace(&mut self.state, OverlayState::Idle) {
            OverlayState::Active { namespace } => namespace,
            OverlayState::Idle => return,
        };

        if let Err(err) = self.backend.revert_root(Hive::CurrentUser) {
            warn!(%err, "failed to revert current-user override");
        }
        if let Err(err) = self.backend.revert_root(Hive::LocalMachine) {
            warn!(%err, "failed to revert local-machine override");
        }

        if self.preserve_for_debugging {
            info!(namespace = %namespace, "overlay preserved for debugging");
        } else if let Err(err) = self.backend.delete_tree(Hive::CurrentUser, &namespace) {
            warn!(%err, namespace = %namespace, "failed to delete overlay namespace");
        }

        self.driver_manifests.clear();
    }

    /// Alias for [`Self::teardown`], matching the harness contract.
    pub fn clear(&mut self) {
        self.teardown();
    }

    fn category_key(category: ManifestCategory) -> String {
        format!("{}\\{}", VENDOR_KEY, category.registry_subkey())
    }
}

impl Drop for RegistryOverlay {
    fn drop(&mut self) {
        self.teardown();
    }
}
