//! Host filesystem implementation.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::unistd::{Group, User};
use tracing::debug;

use super::{FileKind, FileSystem, Ownership};

/// [`FileSystem`] backed by the local host.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl OsFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for OsFileSystem {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn copy_dir_recursive(&self, src: &Path, dst: &Path) -> io::Result<()> {
        debug!(src = %src.display(), dst = %dst.display(), "Copying directory");
        copy_tree(src, dst)
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> io::Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }

    fn chown(&self, path: &Path, owner: &Ownership) -> io::Result<()> {
        let user = User::from_name(&owner.user)?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("unknown user '{}'", owner.user),
            )
        })?;
        let group = Group::from_name(&owner.group)?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("unknown group '{}'", owner.group),
            )
        })?;

        nix::unistd::chown(path, Some(user.uid), Some(group.gid))?;
        Ok(())
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }

    fn read_dir_names(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            let name = entry?.file_name().into_string().map_err(|name| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{} holds non UTF-8 name {name:?}", path.display()),
                )
            })?;
            names.push(name);
        }
        Ok(names)
    }

    fn file_kind(&self, path: &Path) -> io::Result<Option<FileKind>> {
        match fs::symlink_metadata(path) {
            Ok(meta) => {
                let file_type = meta.file_type();
                let kind = if file_type.is_symlink() {
                    FileKind::Symlink
                } else if file_type.is_dir() {
                    FileKind::Dir
                } else {
                    FileKind::File
                };
                Ok(Some(kind))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Copy a tree, recreating symlinks rather than following them.
fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            let target = fs::read_link(&src_path)?;
            std::os::unix::fs::symlink(target, &dst_path)?;
        } else if file_type.is_dir() {
            copy_tree(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }

    // Carry the source directory's mode over; contents keep theirs via fs::copy.
    let mode = fs::metadata(src)?.permissions().mode();
    fs::set_permissions(dst, fs::Permissions::from_mode(mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_dir_recursive() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("bin")).unwrap();
        fs::write(src.join("bin/run"), "#!/bin/sh").unwrap();
        std::os::unix::fs::symlink("bin/run", src.join("run")).unwrap();

        let fs = OsFileSystem::new();
        let dst = temp.path().join("dst");
        fs.copy_dir_recursive(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("bin/run")).unwrap(), "#!/bin/sh");
        assert_eq!(
            fs.file_kind(&dst.join("run")).unwrap(),
            Some(FileKind::Symlink)
        );
        assert_eq!(fs.read_link(&dst.join("run")).unwrap(), PathBuf::from("bin/run"));
    }

    #[test]
    fn test_read_dir_names_rejects_non_utf8() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("nginx")).unwrap();
        fs::create_dir(temp.path().join(OsStr::from_bytes(b"bad\xff"))).unwrap();

        let err = OsFileSystem::new().read_dir_names(temp.path()).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_remove_all_missing_is_ok() {
        let temp = TempDir::new().unwrap();
        OsFileSystem::new()
            .remove_all(&temp.path().join("missing"))
            .unwrap();
    }

    #[test]
    fn test_remove_all_symlink_keeps_target() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("target");
        fs::create_dir_all(&target).unwrap();
        let link = temp.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let fs = OsFileSystem::new();
        fs.remove_all(&link).unwrap();

        assert!(!fs.exists(&link));
        assert_eq!(fs.file_kind(&target).unwrap(), Some(FileKind::Dir));
    }

    #[test]
    fn test_set_permissions() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("dir");
        fs::create_dir_all(&dir).unwrap();

        OsFileSystem::new().set_permissions(&dir, 0o750).unwrap();

        let mode = fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_chown_unknown_user() {
        let temp = TempDir::new().unwrap();
        let err = OsFileSystem::new()
            .chown(temp.path(), &Ownership::new("no-such-user-plfm", "root"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("no-such-user-plfm"));
    }
}
