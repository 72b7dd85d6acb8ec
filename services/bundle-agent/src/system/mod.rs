//! Filesystem collaborator used by the bundle lifecycle manager.
//!
//! The bundle code only talks to the host through the [`FileSystem`] trait,
//! so the install policy (rename, fall back to copy, set permissions) stays
//! host-agnostic and can be driven against [`FakeFileSystem`] in tests.
//!
//! - [`OsFileSystem`]: the real host, via `std::fs` and `nix`
//! - [`FakeFileSystem`]: in-memory tree with per-operation failure injection

mod fake;
mod os;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

pub use fake::{FakeFileSystem, FakeOp, FakeStat};
pub use os::OsFileSystem;

/// Kind of a filesystem entry, without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Dir,
    File,
    Symlink,
}

/// Owner applied to installed bundles, as `user:group`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub user: String,
    pub group: String,
}

impl Ownership {
    pub fn new(user: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            group: group.into(),
        }
    }
}

/// Platform default: privileged user, agent group.
impl Default for Ownership {
    fn default() -> Self {
        Self::new("root", "vcap")
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user, self.group)
    }
}

#[derive(Debug, Error)]
#[error("invalid ownership '{0}': expected user:group")]
pub struct OwnershipParseError(String);

impl FromStr for Ownership {
    type Err = OwnershipParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((user, group))
                if !user.is_empty() && !group.is_empty() && !group.contains(':') =>
            {
                Ok(Self::new(user, group))
            }
            _ => Err(OwnershipParseError(s.to_string())),
        }
    }
}

/// Filesystem primitives.
///
/// Every method is a single blocking operation. Implementations never retry.
pub trait FileSystem: Send + Sync {
    /// Create a directory and all missing parents.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Atomically move `from` to `to`. May fail across filesystem boundaries.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Recursively copy the contents of `src` into `dst`, creating `dst`.
    fn copy_dir_recursive(&self, src: &Path, dst: &Path) -> io::Result<()>;

    /// Remove a file, symlink or directory tree. Absent paths are not an error.
    fn remove_all(&self, path: &Path) -> io::Result<()>;

    /// Set permission bits (e.g. `0o755`).
    fn set_permissions(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Change owner and group by name.
    fn chown(&self, path: &Path, owner: &Ownership) -> io::Result<()>;

    /// Create a symlink at `link` pointing to `target`.
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Names of the direct children of a directory. Names that are not
    /// UTF-8 fail with `InvalidData` rather than being skipped.
    fn read_dir_names(&self, path: &Path) -> io::Result<Vec<String>>;

    /// Entry kind, or `None` when nothing exists at `path`.
    fn file_kind(&self, path: &Path) -> io::Result<Option<FileKind>>;

    fn exists(&self, path: &Path) -> bool {
        matches!(self.file_kind(path), Ok(Some(_)))
    }
}

/// A single, non-empty path component (no separators, not `.` or `..`).
pub(crate) fn is_path_component(value: &str) -> bool {
    !value.is_empty() && value != "." && value != ".." && !value.contains(['/', '\0'])
}
