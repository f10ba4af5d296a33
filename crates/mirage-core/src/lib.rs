//! # mirage-core
//!
//! Redirection and virtualized-enumeration engine for the Mirage shim.
//!
//! The shim sits between an unmodified target program and a small set of OS
//! primitives. Each intercepted call consults the [`redirect::RedirectStore`]
//! and, where a path is redirected or order-significant, the
//! [`direngine::DirEngine`] reshapes the real OS answer into the view the
//! test harness asked for. Everything else passes through untouched.
//!
//! The "real" primitives are an injected strategy ([`host`]); the production
//! implementation binds them to libc, tests may substitute their own. The
//! hook-installation mechanism that routes the target program's calls here
//! (symbol preemption, interposition, detouring) is external to this crate.

pub mod direngine;
pub mod fileops;
pub mod host;
pub mod identity;
pub mod oracle;
pub mod redirect;

pub use direngine::DirEngine;
pub use host::{AccessMode, DirEntryRecord, DirToken, EntryKind, FileToken, HostOs};
pub use identity::IdentityOverride;
pub use oracle::{FolderLedger, OrderingOracle};
pub use redirect::RedirectStore;
