//! Bundle install/enable lifecycle.
//!
//! A bundle is a versioned, immutable directory tree (a compiled package or a
//! rendered job template). Each version is materialized at its own install
//! path; a stable enable path points at the version currently in use.
//!
//! ```text
//! <install_root>/<name>/<version>   FileBundle::install_path
//! <enable_root>/<name> -> ...       FileBundle::enable_path (symlink)
//! ```

mod collection;
mod file_bundle;

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::system::{is_path_component, Ownership};

pub use collection::FileBundleCollection;
pub use file_bundle::FileBundle;

/// Errors from bundle lifecycle operations.
///
/// Every variant carries the path involved and the underlying I/O error.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Creating parent directory {}: {source}", .path.display())]
    CreateParent {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Copying {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Removing source {}: {source}", .path.display())]
    RemoveSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Setting mode {mode:o} on {}: {source}", .path.display())]
    Permissions {
        path: PathBuf,
        mode: u32,
        #[source]
        source: io::Error,
    },

    #[error("Setting owner {owner} on {}: {source}", .path.display())]
    Ownership {
        path: PathBuf,
        owner: Ownership,
        #[source]
        source: io::Error,
    },

    #[error("Checking {}: {source}", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Bundle at {} is not installed", .path.display())]
    NotInstalled { path: PathBuf },

    #[error("Enabling {}: {source}", .path.display())]
    Enable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Disabling {}: {source}", .path.display())]
    Disable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Uninstalling {}: {source}", .path.display())]
    Uninstall {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Bundle at {} is still enabled at {}", .install_path.display(), .enable_path.display())]
    StillEnabled {
        install_path: PathBuf,
        enable_path: PathBuf,
    },

    #[error("Invalid bundle definition: {0}")]
    InvalidDefinition(String),

    #[error("Listing bundles in {}: {source}", .path.display())]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Name and version identifying one bundle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BundleDefinition {
    pub name: String,
    pub version: String,
}

impl BundleDefinition {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Both parts must be a single, non-empty path component.
    pub fn validate(&self) -> Result<(), BundleError> {
        for (field, value) in [("name", &self.name), ("version", &self.version)] {
            if !is_path_component(value) {
                return Err(BundleError::InvalidDefinition(format!(
                    "{field} '{value}' must be a single path component"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for BundleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}
