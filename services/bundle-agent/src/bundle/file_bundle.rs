//! Single bundle version on disk.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::BundleError;
use crate::clock::Clock;
use crate::system::{FileKind, FileSystem, Ownership};

/// One bundle version: where it is installed and where it is enabled.
///
/// Construction performs no I/O. Calls for the same install path must be
/// serialized by the caller; there is no internal locking.
pub struct FileBundle {
    install_path: PathBuf,
    enable_path: PathBuf,
    mode: u32,
    ownership: Option<Ownership>,
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
}

impl FileBundle {
    /// Create a bundle that installs with `mode` and the platform default owner.
    pub fn new(
        install_path: impl Into<PathBuf>,
        enable_path: impl Into<PathBuf>,
        mode: u32,
        fs: Arc<dyn FileSystem>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            install_path: install_path.into(),
            enable_path: enable_path.into(),
            mode,
            ownership: Some(Ownership::default()),
            fs,
            clock,
        }
    }

    /// Override the owner applied after install. `None` leaves ownership as is.
    pub fn with_ownership(mut self, ownership: Option<Ownership>) -> Self {
        self.ownership = ownership;
        self
    }

    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    pub fn enable_path(&self) -> &Path {
        &self.enable_path
    }

    /// Move `source_path` into the install path and apply mode and owner.
    ///
    /// When the rename fails (e.g. across filesystems) the source is copied
    /// into a staging directory beside the install path, renamed into place,
    /// then removed. The install path therefore only ever holds a complete
    /// tree. An existing install is kept and the source is discarded.
    ///
    /// Content placed by this call is removed again if a later step fails.
    /// An existing install is never removed, even when reapplying owner or
    /// mode fails.
    pub fn install(&self, source_path: &Path) -> Result<PathBuf, BundleError> {
        let started_at = self.clock.now();
        debug!(
            source_path = %source_path.display(),
            install_path = %self.install_path.display(),
            "Installing bundle"
        );

        self.create_parent()?;

        let placed = if self.is_installed()? {
            debug!(
                install_path = %self.install_path.display(),
                "Bundle already installed, discarding source"
            );
            if source_path != self.install_path {
                self.fs
                    .remove_all(source_path)
                    .map_err(|source| BundleError::RemoveSource {
                        path: source_path.to_path_buf(),
                        source,
                    })?;
            }
            false
        } else {
            self.place(source_path)?;
            true
        };

        self.finish_install(placed)?;

        info!(
            install_path = %self.install_path.display(),
            duration_ms = (self.clock.now() - started_at).num_milliseconds(),
            "Bundle installed"
        );
        Ok(self.install_path.clone())
    }

    /// Create an empty install directory, for bundles without content.
    pub fn install_without_contents(&self) -> Result<PathBuf, BundleError> {
        self.create_parent()?;

        let created = !self.is_installed()?;
        if created {
            self.fs
                .create_dir_all(&self.install_path)
                .map_err(|source| BundleError::CreateParent {
                    path: self.install_path.clone(),
                    source,
                })?;
        }

        self.finish_install(created)?;

        info!(
            install_path = %self.install_path.display(),
            "Bundle installed without contents"
        );
        Ok(self.install_path.clone())
    }

    /// Whether the install path exists as a directory.
    pub fn is_installed(&self) -> Result<bool, BundleError> {
        let kind = self
            .fs
            .file_kind(&self.install_path)
            .map_err(|source| BundleError::Stat {
                path: self.install_path.clone(),
                source,
            })?;
        Ok(kind == Some(FileKind::Dir))
    }

    /// Point the enable path at this bundle's install path.
    ///
    /// The link is created beside the enable path and renamed over it, so
    /// readers see either the previous version or this one.
    pub fn enable(&self) -> Result<PathBuf, BundleError> {
        if !self.is_installed()? {
            return Err(BundleError::NotInstalled {
                path: self.install_path.clone(),
            });
        }

        if self.is_enabled()? {
            debug!(enable_path = %self.enable_path.display(), "Bundle already enabled");
            return Ok(self.enable_path.clone());
        }

        let enable_err = |source| BundleError::Enable {
            path: self.enable_path.clone(),
            source,
        };

        if let Some(parent) = self.enable_path.parent() {
            self.fs.create_dir_all(parent).map_err(enable_err)?;
        }

        let staging = self.staging_link_path();
        self.fs.remove_all(&staging).map_err(enable_err)?;
        self.fs
            .symlink(&self.install_path, &staging)
            .map_err(enable_err)?;
        if let Err(source) = self.fs.rename(&staging, &self.enable_path) {
            if let Err(cleanup) = self.fs.remove_all(&staging) {
                warn!(
                    path = %staging.display(),
                    error = %cleanup,
                    "Failed to remove staging link"
                );
            }
            return Err(enable_err(source));
        }

        info!(
            install_path = %self.install_path.display(),
            enable_path = %self.enable_path.display(),
            "Bundle enabled"
        );
        Ok(self.enable_path.clone())
    }

    /// Remove the enable path if it points at this bundle.
    ///
    /// A link to another version is left alone.
    pub fn disable(&self) -> Result<(), BundleError> {
        if !self.is_enabled()? {
            debug!(enable_path = %self.enable_path.display(), "Bundle not enabled");
            return Ok(());
        }

        self.fs
            .remove_all(&self.enable_path)
            .map_err(|source| BundleError::Disable {
                path: self.enable_path.clone(),
                source,
            })?;

        info!(enable_path = %self.enable_path.display(), "Bundle disabled");
        Ok(())
    }

    /// Remove the install path. Refuses while the bundle is enabled.
    pub fn uninstall(&self) -> Result<(), BundleError> {
        if self.is_enabled()? {
            return Err(BundleError::StillEnabled {
                install_path: self.install_path.clone(),
                enable_path: self.enable_path.clone(),
            });
        }

        self.fs
            .remove_all(&self.install_path)
            .map_err(|source| BundleError::Uninstall {
                path: self.install_path.clone(),
                source,
            })?;

        info!(install_path = %self.install_path.display(), "Bundle uninstalled");
        Ok(())
    }

    /// Whether the enable path is a symlink to this bundle's install path.
    pub fn is_enabled(&self) -> Result<bool, BundleError> {
        let stat_err = |source| BundleError::Stat {
            path: self.enable_path.clone(),
            source,
        };

        match self.fs.file_kind(&self.enable_path).map_err(stat_err)? {
            Some(FileKind::Symlink) => {
                let target = self.fs.read_link(&self.enable_path).map_err(stat_err)?;
                Ok(target == self.install_path)
            }
            _ => Ok(false),
        }
    }

    fn create_parent(&self) -> Result<(), BundleError> {
        let Some(parent) = self.install_path.parent() else {
            return Ok(());
        };
        self.fs
            .create_dir_all(parent)
            .map_err(|source| BundleError::CreateParent {
                path: parent.to_path_buf(),
                source,
            })
    }

    /// Rename, or copy through a staging directory and remove the source
    /// when rename is not possible.
    fn place(&self, source_path: &Path) -> Result<(), BundleError> {
        let rename_err = match self.fs.rename(source_path, &self.install_path) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        debug!(
            source_path = %source_path.display(),
            install_path = %self.install_path.display(),
            error = %rename_err,
            "Rename failed, falling back to copy"
        );

        let staging = self.staging_install_path();
        if let Err(source) = self.fs.copy_dir_recursive(source_path, &staging) {
            self.discard(&staging, "Failed to remove incomplete copy");
            return Err(BundleError::Copy {
                from: source_path.to_path_buf(),
                to: staging,
                source,
            });
        }

        // Same directory as the install path, so this rename does not cross devices.
        if let Err(source) = self.fs.rename(&staging, &self.install_path) {
            self.discard(&staging, "Failed to remove incomplete copy");
            return Err(BundleError::Copy {
                from: staging,
                to: self.install_path.clone(),
                source,
            });
        }

        if let Err(source) = self.fs.remove_all(source_path) {
            self.rollback();
            return Err(BundleError::RemoveSource {
                path: source_path.to_path_buf(),
                source,
            });
        }

        Ok(())
    }

    /// Apply owner then mode. On failure, content placed by this call is
    /// removed; an install that was already there stays.
    fn finish_install(&self, placed: bool) -> Result<(), BundleError> {
        let result = self.apply_permissions();
        if result.is_err() {
            if placed {
                self.rollback();
            } else {
                warn!(
                    install_path = %self.install_path.display(),
                    "Keeping existing install after failed permission update"
                );
            }
        }
        result
    }

    fn apply_permissions(&self) -> Result<(), BundleError> {
        if let Some(owner) = &self.ownership {
            self.fs
                .chown(&self.install_path, owner)
                .map_err(|source| BundleError::Ownership {
                    path: self.install_path.clone(),
                    owner: owner.clone(),
                    source,
                })?;
        }

        self.fs
            .set_permissions(&self.install_path, self.mode)
            .map_err(|source| BundleError::Permissions {
                path: self.install_path.clone(),
                mode: self.mode,
                source,
            })
    }

    fn rollback(&self) {
        warn!(
            install_path = %self.install_path.display(),
            "Removing incomplete install"
        );
        self.discard(&self.install_path, "Failed to remove incomplete install");
    }

    fn discard(&self, path: &Path, message: &str) {
        if let Err(e) = self.fs.remove_all(path) {
            warn!(path = %path.display(), error = %e, "{message}");
        }
    }

    /// `.<version>.<uuid>.tmp` beside the install path. Hidden names are
    /// skipped when listing installed versions.
    fn staging_install_path(&self) -> PathBuf {
        let mut name = OsString::from(".");
        name.push(self.install_path.file_name().unwrap_or_default());
        name.push(format!(".{}.tmp", Uuid::new_v4()));
        self.install_path.with_file_name(name)
    }

    fn staging_link_path(&self) -> PathBuf {
        let mut name = OsString::from(".");
        name.push(self.enable_path.file_name().unwrap_or_default());
        name.push(".tmp");
        self.enable_path.with_file_name(name)
    }
}
