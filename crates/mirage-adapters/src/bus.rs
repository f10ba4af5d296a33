//! Low-level adapter-bus catalog.
//!
//! Answers "how many adapters are on the bus" and per-adapter property
//! queries with C-style buffer semantics: a zero-length buffer is a size
//! probe, an exact-size buffer receives the payload, anything else is a
//! buffer-overflow failure that reports the required size and writes
//! nothing.

use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// One fabricated bus adapter, as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusAdapterInfo {
    pub handle: u32,
    /// Locally-unique id, stable for the lifetime of the session.
    pub luid: u64,
    pub source_count: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("unknown adapter handle {0}")]
    InvalidHandle(u32),
    #[error("property buffer too small: {supplied} supplied, {required} required")]
    BufferOverflow { supplied: usize, required: usize },
}

/// Outcome of a successful property query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyStatus {
    /// Size probe: the payload needs this many bytes.
    Required(usize),
    /// Payload written; this many bytes.
    Written(usize),
}

#[derive(Debug)]
struct BusRecord {
    info: BusAdapterInfo,
    /// Property payload: the owning driver manifest path, as bytes.
    property: Vec<u8>,
}

/// Insertion-ordered catalog of fabricated bus adapters.
#[derive(Debug, Default)]
pub struct AdapterBus {
    records: Vec<BusRecord>,
    by_handle: HashMap<u32, usize>,
}

impl AdapterBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter. Enumeration order is insertion order; the
    /// owning manifest path becomes the adapter's property payload.
    pub fn add_adapter(&mut self, info: BusAdapterInfo, owning_manifest: PathBuf) {
        debug!(handle = info.handle, luid = info.luid, "bus adapter added");
        self.by_handle.insert(info.handle, self.records.len());
        self.records.push(BusRecord {
            info,
            property: owning_manifest.to_string_lossy().into_owned().into_bytes(),
        });
    }

    /// Bus-level enumeration: returns the adapter count and, when a buffer
    /// is supplied, fills one record per entry in insertion order. An empty
    /// catalog reports zero adapters successfully.
    pub fn enumerate(&self, out: Option<&mut Vec<BusAdapterInfo>>) -> usize {
        if let Some(out) = out {
            out.clear();
            out.extend(self.records.iter().map(|r| r.info.clone()));
        }
        self.records.len()
    }

    /// Per-adapter property query. See module docs for buffer semantics.
    pub fn query_property(&self, handle: u32, buf: &mut [u8]) -> Result<PropertyStatus, BusError> {
        let record = self
            .by_handle
            .get(&handle)
            .and_then(|idx| self.records.get(*idx))
            .ok_or(BusError::InvalidHandle(handle))?;
        let required = record.property.len();

        if buf.is_empty() {
            return Ok(PropertyStatus::Required(required));
        }
        if buf.len() != required {
            return Err(BusError::BufferOverflow {
                supplied: buf.len(),
                required,
            });
        }
        buf.copy_from_slice(&record.property);
        Ok(PropertyStatus::Written(required))
    }

    /// Clear the catalog.
    pub fn reset(&mut self) {
        self.records.clear();
        self.by_handle.clear();
    }
}
