//! # mirage-config
//!
//! Environment-derived discovery inputs for the Mirage shim.
//!
//! A discovery routine in the target program searches a fixed family of
//! directories (and registry keys) per manifest category. This crate computes
//! those default locations from the environment so the harness knows which
//! real paths to redirect. Inputs are consumed read-only:
//! 1. `$HOME` (via `dirs`)
//! 2. `XDG_CONFIG_HOME` / `XDG_CONFIG_DIRS`
//! 3. `XDG_DATA_HOME` / `XDG_DATA_DIRS`
//! 4. `MIRAGE_LAYER_PATH` (layer-path override; absence is not diagnosed)
//! 5. Compiled-in fallbacks

use std::env;
use std::path::PathBuf;
use tracing::debug;

pub mod logging;
pub mod testing;

/// Vendor directory component under each search root.
pub const VENDOR_DIR: &str = "mirage";

/// Layer-path override variable. Its absence is explicitly tolerated
/// without diagnostic; most runs never set it.
pub const LAYER_PATH_ENV: &str = "MIRAGE_LAYER_PATH";

/// Compiled-in fallback config roots, lowest priority.
const FALLBACK_CONFIG_DIRS: &[&str] = &["/etc/xdg", "/etc"];

/// Compiled-in fallback data roots, lowest priority.
const FALLBACK_DATA_DIRS: &[&str] = &["/usr/local/share", "/usr/share"];

/// The manifest categories a discovery routine searches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestCategory {
    Driver,
    ImplicitLayer,
    ExplicitLayer,
    Settings,
}

impl ManifestCategory {
    pub const ALL: [ManifestCategory; 4] = [
        ManifestCategory::Driver,
        ManifestCategory::ImplicitLayer,
        ManifestCategory::ExplicitLayer,
        ManifestCategory::Settings,
    ];

    /// Directory component searched under each root.
    pub fn folder_name(&self) -> &'static str {
        match self {
            ManifestCategory::Driver => "drivers.d",
            ManifestCategory::ImplicitLayer => "implicit_layers.d",
            ManifestCategory::ExplicitLayer => "explicit_layers.d",
            ManifestCategory::Settings => "settings.d",
        }
    }

    /// Registry subkey searched on Windows-class platforms, relative to the
    /// vendor root under the local-machine hive.
    pub fn registry_subkey(&self) -> &'static str {
        match self {
            ManifestCategory::Driver => "Drivers",
            ManifestCategory::ImplicitLayer => "ImplicitLayers",
            ManifestCategory::ExplicitLayer => "ExplicitLayers",
            ManifestCategory::Settings => "Settings",
        }
    }

    /// Layer categories honor the `MIRAGE_LAYER_PATH` override.
    pub fn is_layer(&self) -> bool {
        matches!(
            self,
            ManifestCategory::ImplicitLayer | ManifestCategory::ExplicitLayer
        )
    }
}

/// Ordered default search locations, computed once from the environment.
///
/// Malformed or absent variables contribute empty lists, never errors.
#[derive(Debug, Clone)]
pub struct SearchPaths {
    config_dirs: Vec<PathBuf>,
    data_dirs: Vec<PathBuf>,
    layer_override: Vec<PathBuf>,
}

impl SearchPaths {
    /// Snapshot the environment. Call once at session setup.
    pub fn from_env() -> Self {
        let home = dirs::home_dir();

        let mut config_dirs = Vec::new();
        match env::var_os("XDG_CONFIG_HOME") {
            Some(v) if !v.is_empty() => config_dirs.push(PathBuf::from(v)),
            _ => {
                if let Some(h) = &home {
                    config_dirs.push(h.join(".config"));
                }
            }
        }
        config_dirs.extend(split_path_list(env::var_os("XDG_CONFIG_DIRS")));
        if config_dirs.len() <= 1 {
            config_dirs.extend(FALLBACK_CONFIG_DIRS.iter().map(PathBuf::from));
        }

        let mut data_dirs = Vec::new();
        match env::var_os("XDG_DATA_HOME") {
            Some(v) if !v.is_empty() => data_dirs.push(PathBuf::from(v)),
            _ => {
                if let Some(h) = &home {
                    data_dirs.push(h.join(".local/share"));
                }
            }
        }
        data_dirs.extend(split_path_list(env::var_os("XDG_DATA_DIRS")));
        if data_dirs.len() <= 1 {
            data_dirs.extend(FALLBACK_DATA_DIRS.iter().map(PathBuf::from));
        }

        // Absence of the override is normal and not worth a diagnostic.
        let layer_override = split_path_list(env::var_os(LAYER_PATH_ENV));
        if !layer_override.is_empty() {
            debug!(
                dirs = layer_override.len(),
                "layer path override active"
            );
        }

        Self {
            config_dirs,
            data_dirs,
            layer_override,
        }
    }

    /// Build from explicit lists. Used by tests and harnesses that must not
    /// depend on the ambient environment.
    pub fn from_parts(
        config_dirs: Vec<PathBuf>,
        data_dirs: Vec<PathBuf>,
        layer_override: Vec<PathBuf>,
    ) -> Self {
        Self {
            config_dirs,
            data_dirs,
            layer_override,
        }
    }

    /// Ordered directories a discovery routine searches for `category`.
    ///
    /// Layer categories with an active override search only the override
    /// list; everything else searches config roots then data roots, each
    /// suffixed with `mirage/<category folder>`.
    pub fn search_dirs(&self, category: ManifestCategory) -> Vec<PathBuf> {
        if category.is_layer() && !self.layer_override.is_empty() {
            return self.layer_override.clone();
        }
        self.config_dirs
            .iter()
            .chain(self.data_dirs.iter())
            .map(|root| root.join(VENDOR_DIR).join(category.folder_name()))
            .collect()
    }

    /// The highest-priority search directory for `category`: the default
    /// redirection key the harness substitutes a synthetic folder for.
    pub fn primary_target(&self, category: ManifestCategory) -> Option<PathBuf> {
        self.search_dirs(category).into_iter().next()
    }
}

/// Split a colon-separated path list, dropping empty entries. Absent or
/// unparseable input yields an empty list.
fn split_path_list(value: Option<std::ffi::OsString>) -> Vec<PathBuf> {
    match value {
        Some(v) => env::split_paths(&v)
            .filter(|p| !p.as_os_str().is_empty())
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(parts: &[&str]) -> Vec<PathBuf> {
        parts.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_search_dirs_config_before_data() {
        let sp = SearchPaths::from_parts(
            paths(&["/home/u/.config", "/etc/xdg"]),
            paths(&["/usr/share"]),
            vec![],
        );
        let dirs = sp.search_dirs(ManifestCategory::Driver);
        assert_eq!(
            dirs,
            paths(&[
                "/home/u/.config/mirage/drivers.d",
                "/etc/xdg/mirage/drivers.d",
                "/usr/share/mirage/drivers.d",
            ])
        );
    }

    #[test]
    fn test_layer_override_wins_for_layers_only() {
        let sp = SearchPaths::from_parts(
            paths(&["/etc/xdg"]),
            paths(&["/usr/share"]),
            paths(&["/override/layers"]),
        );
        assert_eq!(
            sp.search_dirs(ManifestCategory::ExplicitLayer),
            paths(&["/override/layers"])
        );
        // Non-layer categories ignore the override.
        assert_eq!(
            sp.search_dirs(ManifestCategory::Settings),
            paths(&["/etc/xdg/mirage/settings.d", "/usr/share/mirage/settings.d"])
        );
    }

    #[test]
    fn test_primary_target_is_first_search_dir() {
        let sp = SearchPaths::from_parts(paths(&["/a", "/b"]), paths(&["/c"]), vec![]);
        assert_eq!(
            sp.primary_target(ManifestCategory::ImplicitLayer),
            Some(PathBuf::from("/a/mirage/implicit_layers.d"))
        );
    }

    #[test]
    fn test_split_path_list_drops_empty_entries() {
        let list = split_path_list(Some("/one::/two".into()));
        assert_eq!(list, paths(&["/one", "/two"]));
        assert!(split_path_list(None).is_empty());
    }

    #[test]
    fn test_category_folder_names() {
        assert_eq!(ManifestCategory::Driver.folder_name(), "drivers.d");
        assert_eq!(ManifestCategory::Settings.registry_subkey(), "Settings");
        assert!(ManifestCategory::ImplicitLayer.is_layer());
        assert!(!ManifestCategory::Driver.is_layer());
    }
}
