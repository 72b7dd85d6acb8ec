//! Maps bundle definitions to their on-disk locations.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{BundleDefinition, BundleError, FileBundle};
use crate::clock::Clock;
use crate::system::{is_path_component, FileKind, FileSystem, Ownership};

/// All versions of one kind of bundle (packages, jobs) under a common root.
pub struct FileBundleCollection {
    install_root: PathBuf,
    enable_root: PathBuf,
    mode: u32,
    ownership: Option<Ownership>,
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
}

impl FileBundleCollection {
    pub fn new(
        install_root: impl Into<PathBuf>,
        enable_root: impl Into<PathBuf>,
        mode: u32,
        ownership: Option<Ownership>,
        fs: Arc<dyn FileSystem>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            install_root: install_root.into(),
            enable_root: enable_root.into(),
            mode,
            ownership,
            fs,
            clock,
        }
    }

    /// The bundle for `definition`, at `<install_root>/<name>/<version>`.
    pub fn get(&self, definition: &BundleDefinition) -> Result<FileBundle, BundleError> {
        definition.validate()?;

        let install_path = self
            .install_root
            .join(&definition.name)
            .join(&definition.version);
        let enable_path = self.enable_root.join(&definition.name);

        Ok(FileBundle::new(
            install_path,
            enable_path,
            self.mode,
            self.fs.clone(),
            self.clock.clone(),
        )
        .with_ownership(self.ownership.clone()))
    }

    /// Every installed bundle, sorted by name then version.
    pub fn list(&self) -> Result<Vec<BundleDefinition>, BundleError> {
        let mut definitions = Vec::new();

        for name in self.dir_names(&self.install_root)? {
            let name_dir = self.install_root.join(&name);
            if self.kind(&name_dir)? != Some(FileKind::Dir) {
                continue;
            }

            for version in self.dir_names(&name_dir)? {
                if self.kind(&name_dir.join(&version))? == Some(FileKind::Dir) {
                    definitions.push(BundleDefinition::new(name.clone(), version));
                }
            }
        }

        definitions.sort();
        Ok(definitions)
    }

    fn dir_names(&self, path: &Path) -> Result<Vec<String>, BundleError> {
        match self.fs.read_dir_names(path) {
            Ok(names) => Ok(names
                .into_iter()
                .filter(|name| is_path_component(name) && !name.starts_with('.'))
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(BundleError::List {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn kind(&self, path: &Path) -> Result<Option<FileKind>, BundleError> {
        self.fs.file_kind(path).map_err(|source| BundleError::Stat {
            path: path.to_path_buf(),
            source,
        })
    }
}
