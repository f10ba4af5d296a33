//! In-memory hierarchical key/value store honoring root overrides.

use std::collections::{BTreeMap, HashMap};

use crate::{Hive, RegValue, RegistryBackend, RegistryError};

/// One hive's key tree. Key paths map to their value tables; intermediate
/// keys exist with empty tables.
#[derive(Debug, Default)]
struct HiveStore {
    keys: BTreeMap<String, BTreeMap<String, RegValue>>,
}

/// In-memory registry with the same observable semantics as the platform
/// store the shim overlays: hierarchical keys, named values, and
/// predefined-root overrides resolved on every access.
#[derive(Debug, Default)]
pub struct MemRegistry {
    current_user: HiveStore,
    local_machine: HiveStore,
    /// Override targets, stored as raw current-user paths.
    overrides: HashMap<Hive, String>,
}

impl MemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply at most one level of root override. The target was recorded as
    /// a raw path, so resolution never recurses.
    fn resolve(&self, hive: Hive, path: &str) -> (Hive, String) {
        match self.overrides.get(&hive) {
            Some(target) => (Hive::CurrentUser, format!("{}\\{}", target, path)),
            None => (hive, path.to_string()),
        }
    }

    fn store(&self, hive: Hive) -> &HiveStore {
        match hive {
            Hive::CurrentUser => &self.current_user,
            Hive::LocalMachine => &self.local_machine,
        }
    }

    fn store_mut(&mut self, hive: Hive) -> &mut HiveStore {
        match hive {
            Hive::CurrentUser => &mut self.current_user,
            Hive::LocalMachine => &mut self.local_machine,
        }
    }
}

impl RegistryBackend for MemRegistry {
    fn key_exists(&self, hive: Hive, path: &str) -> bool {
        let (hive, path) = self.resolve(hive, path);
        self.store(hive).keys.contains_key(&path)
    }

    fn create_key(&mut self, hive: Hive, path: &str) -> Result<(), RegistryError> {
        let (hive, path) = self.resolve(hive, path);
        let keys = &mut self.store_mut(hive).keys;
        let mut prefix = String::new();
        for component in path.split('\\') {
            if !prefix.is_empty() {
                prefix.push('\\');
            }
            prefix.push_str(component);
            keys.entry(prefix.clone()).or_default();
        }
        Ok(())
    }

    fn delete_tree(&mut self, hive: Hive, path: &str) -> Result<(), RegistryError> {
        let (hive, path) = self.resolve(hive, path);
        let keys = &mut self.store_mut(hive).keys;
        if !keys.contains_key(&path) {
            return Err(RegistryError::KeyNotFound { path });
        }
        let subtree_prefix = format!("{}\\", path);
        keys.retain(|k, _| k != &path && !k.starts_with(&subtree_prefix));
        Ok(())
    }

    fn set_value(
        &mut self,
        hive: Hive,
        path: &str,
        name: &str,
        value: RegValue,
    ) -> Result<(), RegistryError> {
        let (hive, path) = self.resolve(hive, path);
        match self.store_mut(hive).keys.get_mut(&path) {
            Some(values) => {
                values.insert(name.to_string(), value);
                Ok(())
            }
            None => Err(RegistryError::KeyNotFound { path }),
        }
    }

    fn get_value(&self, hive: Hive, path: &str, name: &str) -> Result<RegValue, RegistryError> {
        let (hive, path) = self.resolve(hive, path);
        let values = self
            .store(hive)
            .keys
            .get(&path)
            .ok_or(RegistryError::KeyNotFound { path })?;
        values
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::ValueNotFound {
                name: name.to_string(),
            })
    }

    fn delete_value(&mut self, hive: Hive, path: &str, name: &str) -> Result<(), RegistryError> {
        let (hive, path) = self.resolve(hive, path);
        let values = self
            .store_mut(hive)
            .keys
            .get_mut(&path)
            .ok_or(RegistryError::KeyNotFound { path })?;
        values
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::ValueNotFound {
                name: name.to_string(),
            })
    }

    fn enumerate_values(
        &self,
        hive: Hive,
        path: &str,
    ) -> Result<Vec<(String, RegValue)>, RegistryError> {
        let (hive, path) = self.resolve(hive, path);
        let values = self
            .store(hive)
            .keys
            .get(&path)
            .ok_or(RegistryError::KeyNotFound { path })?;
        Ok(values.iter().map(|(n, v)| (n.clone(), v.clone())).collect())
    }

    fn override_root(&mut self, hive: Hive, target: &str) -> Result<(), RegistryError> {
        // Target must exist raw before the override takes effect.
        if !self.current_user.keys.contains_key(target) {
            return Err(RegistryError::KeyNotFound {
                path: target.to_string(),
            });
        }
        self.overrides.insert(hive, target.to_string());
        Ok(())
    }

    fn revert_root(&mut self, hive: Hive) -> Result<(), RegistryError> {
        self.overrides.remove(&hive);
        Ok(())
    }
}
