//! Host primitive strategy: the seam to the real OS.
//!
//! Every intercepted call eventually delegates to one of these traits. The
//! production implementation ([`HostOs`]) binds straight to libc; the hook
//! glue that resolves the real function behind each preempted symbol hands
//! the shim an instance of these traits, so symbol resolution stays outside
//! the core. Tests may inject scripted implementations.

use std::ffi::{CStr, CString, OsString};
use std::io;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::Path;

/// Opaque token for one live OS directory stream. In the libc host this is
/// the `DIR*` address, which is exactly the identity the target program
/// holds across `opendir`/`readdir`/`closedir`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirToken(pub u64);

/// Opaque token for one open file stream (`FILE*` address in the libc host).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileToken(pub u64);

/// What kind of entry the OS reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

/// One drained OS directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryRecord {
    pub name: OsString,
    pub kind: EntryKind,
}

/// Access-check mode bits, mirroring `access(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessMode(i32);

impl AccessMode {
    pub const EXISTS: AccessMode = AccessMode(libc::F_OK);
    pub const READ: AccessMode = AccessMode(libc::R_OK);
    pub const WRITE: AccessMode = AccessMode(libc::W_OK);
    pub const EXECUTE: AccessMode = AccessMode(libc::X_OK);

    pub fn bits(self) -> i32 {
        self.0
    }
}

impl std::ops::BitOr for AccessMode {
    type Output = AccessMode;
    fn bitor(self, rhs: AccessMode) -> AccessMode {
        AccessMode(self.0 | rhs.0)
    }
}

/// Real directory-enumeration primitives.
pub trait DirPrimitives: Send + Sync {
    fn opendir(&self, path: &Path) -> io::Result<DirToken>;
    /// One entry, or `None` at end of stream. An enumeration failure is
    /// propagated untouched, never converted into end-of-stream.
    fn readdir(&self, token: DirToken) -> io::Result<Option<DirEntryRecord>>;
    fn closedir(&self, token: DirToken) -> io::Result<()>;
}

/// Real single-file primitives.
pub trait FilePrimitives: Send + Sync {
    fn fopen(&self, path: &Path, mode: &str) -> io::Result<FileToken>;
    fn fclose(&self, token: FileToken) -> io::Result<()>;
    fn access(&self, path: &Path, mode: AccessMode) -> io::Result<()>;
}

/// Real identity and environment primitives.
pub trait IdentityPrimitives: Send + Sync {
    fn euid(&self) -> u32;
    fn egid(&self) -> u32;
    fn secure_getenv(&self, name: &str) -> Option<OsString>;
}

/// libc-backed host. Failures carry the OS errno via
/// `io::Error::last_os_error()` so passthrough reproduces them unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostOs;

impl HostOs {
    pub fn new() -> Self {
        HostOs
    }
}

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))
}

fn clear_errno() {
    #[cfg(target_os = "linux")]
    unsafe {
        *libc::__errno_location() = 0;
    }
    #[cfg(target_os = "macos")]
    unsafe {
        *libc::__error() = 0;
    }
}

fn errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

impl DirPrimitives for HostOs {
    fn opendir(&self, path: &Path) -> io::Result<DirToken> {
        let c = c_path(path)?;
        let dir = unsafe { libc::opendir(c.as_ptr()) };
        if dir.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(DirToken(dir as u64))
    }

    fn readdir(&self, token: DirToken) -> io::Result<Option<DirEntryRecord>> {
        // readdir signals both error and end-of-stream with NULL; errno
        // disambiguates, so it must be cleared first.
        clear_errno();
        let entry = unsafe { libc::readdir(token.0 as *mut libc::DIR) };
        if entry.is_null() {
            if errno() != 0 {
                return Err(io::Error::last_os_error());
            }
            return Ok(None);
        }
        let (name, d_type) = unsafe {
            let name = CStr::from_ptr((*entry).d_name.as_ptr());
            (OsString::from_vec(name.to_bytes().to_vec()), (*entry).d_type)
        };
        let kind = match d_type {
            libc::DT_DIR => EntryKind::Directory,
            libc::DT_REG => EntryKind::File,
            _ => EntryKind::Other,
        };
        Ok(Some(DirEntryRecord { name, kind }))
    }

    fn closedir(&self, token: DirToken) -> io::Result<()> {
        let rc = unsafe { libc::closedir(token.0 as *mut libc::DIR) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl FilePrimitives for HostOs {
    fn fopen(&self, path: &Path, mode: &str) -> io::Result<FileToken> {
        let c = c_path(path)?;
        let c_mode = CString::new(mode)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "mode contains NUL"))?;
        let file = unsafe { libc::fopen(c.as_ptr(), c_mode.as_ptr()) };
        if file.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(FileToken(file as u64))
    }

    fn fclose(&self, token: FileToken) -> io::Result<()> {
        let rc = unsafe { libc::fclose(token.0 as *mut libc::FILE) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn access(&self, path: &Path, mode: AccessMode) -> io::Result<()> {
        let c = c_path(path)?;
        let rc = unsafe { libc::access(c.as_ptr(), mode.bits()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl IdentityPrimitives for HostOs {
    fn euid(&self) -> u32 {
        unsafe { libc::geteuid() }
    }

    fn egid(&self) -> u32 {
        unsafe { libc::getegid() }
    }

    fn secure_getenv(&self, name: &str) -> Option<OsString> {
        std::env::var_os(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::tempdir;

    #[test]
    fn test_opendir_enumerates_real_entries() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("one.txt"), b"1").unwrap();
        std::fs::write(temp.path().join("two.txt"), b"2").unwrap();

        let host = HostOs::new();
        let token = host.opendir(temp.path()).unwrap();
        let mut names = HashSet::new();
        while let Some(entry) = host.readdir(token).unwrap() {
            names.insert(entry.name);
        }
        host.closedir(token).unwrap();

        assert!(names.contains(&OsString::from("one.txt")));
        assert!(names.contains(&OsString::from("two.txt")));
    }

    #[test]
    fn test_opendir_missing_path_propagates_errno() {
        let host = HostOs::new();
        let err = host.opendir(Path::new("/no/such/dir/mirage")).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn test_fopen_and_access() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("f.txt");
        std::fs::write(&file, b"data").unwrap();

        let host = HostOs::new();
        host.access(&file, AccessMode::EXISTS | AccessMode::READ)
            .unwrap();
        let token = host.fopen(&file, "r").unwrap();
        host.fclose(token).unwrap();

        let err = host
            .access(&temp.path().join("absent"), AccessMode::EXISTS)
            .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn test_access_mode_bits_combine() {
        let mode = AccessMode::READ | AccessMode::WRITE;
        assert_eq!(mode.bits(), libc::R_OK | libc::W_OK);
        assert_eq!(AccessMode::EXISTS.bits(), libc::F_OK);
    }
}
