//! # mirage-registry
//!
//! Registry virtualization for Windows-class discovery: a private,
//! namespaced overlay of the hierarchical key/value store, with
//! collision-free session isolation.
//!
//! The OS-level "override predefined key" capability is an injected
//! dependency ([`RegistryBackend`]); [`store::MemRegistry`] is the
//! in-process implementation the harness runs against, and the hook glue
//! may supply a real one on the target platform.

pub mod overlay;
pub mod store;

pub use overlay::{OverlayError, RegistryOverlay};
pub use store::MemRegistry;

use thiserror::Error;

/// Predefined root keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hive {
    CurrentUser,
    LocalMachine,
}

/// Value payload stored under a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegValue {
    Dword(u32),
    Sz(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry key not found: {path}")]
    KeyNotFound { path: String },
    #[error("registry value not found: {name}")]
    ValueNotFound { name: String },
}

/// Hierarchical key/value primitives, with root-override support.
///
/// All paths are backslash-separated and relative to a hive root. Lookups
/// against an overridden hive resolve into the override subtree; the
/// override target itself is always addressed raw (it was opened before the
/// override took effect, matching the OS capability this models).
pub trait RegistryBackend: Send + Sync {
    fn key_exists(&self, hive: Hive, path: &str) -> bool;
    /// Create `path` and any missing intermediate keys.
    fn create_key(&mut self, hive: Hive, path: &str) -> Result<(), RegistryError>;
    /// Delete `path` and everything beneath it.
    fn delete_tree(&mut self, hive: Hive, path: &str) -> Result<(), RegistryError>;
    fn set_value(
        &mut self,
        hive: Hive,
        path: &str,
        name: &str,
        value: RegValue,
    ) -> Result<(), RegistryError>;
    fn get_value(&self, hive: Hive, path: &str, name: &str) -> Result<RegValue, RegistryError>;
    fn delete_value(&mut self, hive: Hive, path: &str, name: &str) -> Result<(), RegistryError>;
    /// Values of `path` in deterministic (sorted) order.
    fn enumerate_values(
        &self,
        hive: Hive,
        path: &str,
    ) -> Result<Vec<(String, RegValue)>, RegistryError>;
    /// Redirect future lookups against `hive` to `target`, a raw path under
    /// the current-user root.
    fn override_root(&mut self, hive: Hive, target: &str) -> Result<(), RegistryError>;
    /// Undo [`Self::override_root`]. Reverting a non-overridden hive is a
    /// no-op.
    fn revert_root(&mut self, hive: Hive) -> Result<(), RegistryError>;
}
