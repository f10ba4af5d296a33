//! # mirage-adapters
//!
//! Adapter-enumeration virtualization: fabricated GPU adapters backed by
//! test-supplied data instead of real hardware.
//!
//! Two parallel catalogs answer two query styles. The [`bus::AdapterBus`]
//! answers low-level bus enumeration and per-adapter property queries; the
//! [`factory::AdapterFactory`] answers factory-style "enumerate adapters by
//! index/preference" queries with caller-owned fabricated objects.

pub mod bus;
pub mod factory;

pub use bus::{AdapterBus, BusAdapterInfo, BusError, PropertyStatus};
pub use factory::{AdapterDescriptor, AdapterFactory, FactoryError, FakeAdapter, GpuPreference};
