//! Privilege/identity interception.
//!
//! A single flag makes effective-uid/gid queries report the superuser
//! identity, and makes the secure-environment lookup report "not found";
//! the real OS refuses that lookup path for privileged processes.

use std::ffi::OsString;

use crate::host::IdentityPrimitives;

/// Superuser ids reported while fake elevation is active.
pub const ROOT_UID: u32 = 0;
pub const ROOT_GID: u32 = 0;

/// Boolean-gated identity override. Defaults to "not elevated"; persists
/// until explicitly changed or the session is reset.
#[derive(Debug, Default)]
pub struct IdentityOverride {
    fake_elevation: bool,
}

impl IdentityOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fake_elevation(&mut self, elevated: bool) {
        self.fake_elevation = elevated;
    }

    pub fn fake_elevation(&self) -> bool {
        self.fake_elevation
    }

    pub fn reset(&mut self) {
        self.fake_elevation = false;
    }

    /// Intercepted effective-uid query.
    pub fn euid(&self, host: &dyn IdentityPrimitives) -> u32 {
        if self.fake_elevation {
            ROOT_UID
        } else {
            host.euid()
        }
    }

    /// Intercepted effective-gid query.
    pub fn egid(&self, host: &dyn IdentityPrimitives) -> u32 {
        if self.fake_elevation {
            ROOT_GID
        } else {
            host.egid()
        }
    }

    /// Intercepted secure-environment lookup. Reports not-found whenever
    /// fake elevation is active, even for variables that exist.
    pub fn secure_getenv(&self, host: &dyn IdentityPrimitives, name: &str) -> Option<OsString> {
        if self.fake_elevation {
            None
        } else {
            host.secure_getenv(name)
        }
    }
}
