//! Factory-style adapter enumeration.
//!
//! The factory fabricates caller-owned adapter objects on demand. Each
//! fabricated object supports describe and release, and its identity is
//! registered so a later "describe this adapter" query on that exact object
//! resolves to the right catalog entry. The catalog itself is only mutated
//! by explicit setup calls and by reset.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use std::collections::HashMap;
use tracing::debug;

/// Descriptor blob copied to callers on describe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterDescriptor {
    pub description: String,
    pub vendor_id: u32,
    pub device_id: u32,
    pub luid: u64,
}

/// Preference classes a factory-style enumeration may ask for. Only
/// `Unspecified` is modeled; no production caller requests the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuPreference {
    Unspecified,
    MinimumPower,
    HighPerformance,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FactoryError {
    #[error("adapter index {index} out of range ({count} adapters)")]
    InvalidCall { index: usize, count: usize },
    #[error("unknown adapter identity {0}")]
    UnknownIdentity(u64),
}

/// A fabricated, caller-owned adapter object.
///
/// Ownership transfers to the caller on creation; [`FakeAdapter::release`]
/// consumes the object, so a second release cannot compile. Releasing does
/// not touch the factory catalog or the identity map.
#[derive(Debug)]
pub struct FakeAdapter {
    identity: u64,
    descriptor: AdapterDescriptor,
}

impl FakeAdapter {
    /// Identity key registered with the factory at fabrication time.
    pub fn identity(&self) -> u64 {
        self.identity
    }

    /// Copy of the stored descriptor.
    pub fn describe(&self) -> AdapterDescriptor {
        self.descriptor.clone()
    }

    /// Free the fabricated object.
    pub fn release(self) {}
}

/// Catalog of descriptors plus the identity map for fabricated objects.
#[derive(Debug, Default)]
pub struct AdapterFactory {
    catalog: Vec<(AdapterDescriptor, GpuPreference)>,
    /// Fabricated-object identity → catalog index. Cleared on reset so
    /// stale objects from a previous test never match.
    identities: HashMap<u64, usize>,
    next_identity: u64,
}

impl AdapterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor. Enumeration order is insertion order.
    pub fn add_adapter(&mut self, descriptor: AdapterDescriptor, preference: GpuPreference) {
        debug!(description = %descriptor.description, "factory adapter added");
        self.catalog.push((descriptor, preference));
    }

    pub fn adapter_count(&self) -> usize {
        self.catalog.len()
    }

    /// Fabricate the adapter at `index`.
    pub fn enum_by_index(&mut self, index: usize) -> Result<FakeAdapter, FactoryError> {
        let (descriptor, _) = self
            .catalog
            .get(index)
            .ok_or(FactoryError::InvalidCall {
                index,
                count: self.catalog.len(),
            })?
            .clone();

        self.next_identity += 1;
        let identity = self.next_identity;
        self.identities.insert(identity, index);
        Ok(FakeAdapter {
            identity,
            descriptor,
        })
    }

    /// Fabricate the adapter at `index` under a preference class. Only
    /// `Unspecified` is modeled; anything else is a caller bug and fails
    /// loudly.
    pub fn enum_by_preference(
        &mut self,
        preference: GpuPreference,
        index: usize,
    ) -> Result<FakeAdapter, FactoryError> {
        assert!(
            preference == GpuPreference::Unspecified,
            "preference classes other than Unspecified are not modeled"
        );
        self.enum_by_index(index)
    }

    /// Resolve a previously fabricated object's identity to its stored
    /// descriptor.
    pub fn describe_by_identity(&self, identity: u64) -> Result<&AdapterDescriptor, FactoryError> {
        let index = self
            .identities
            .get(&identity)
            .ok_or(FactoryError::UnknownIdentity(identity))?;
        match self.catalog.get(*index) {
            Some((descriptor, _)) => Ok(descriptor),
            None => Err(FactoryError::UnknownIdentity(identity)),
        }
    }

    /// Clear the catalog and the identity map.
    pub fn reset(&mut self) {
        self.catalog.clear();
        self.identities.clear();
    }
}
