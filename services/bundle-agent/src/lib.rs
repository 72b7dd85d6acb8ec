//! plfm-vt Bundle Agent Library
//!
//! The bundle agent runs on each host and materializes versioned software
//! bundles (compiled packages, rendered job templates) onto local disk. It
//! also implements the node-side actions the control plane can trigger.
//!
//! ## Architecture
//!
//! ```text
//! FileBundleCollection ── FileBundle(name, version)
//!                            ├── FileSystem  (OsFileSystem / FakeFileSystem)
//!                            └── Clock       (SystemClock / FakeClock)
//!
//! UploadBlobAction ── BlobStore (LocalBlobStore / MemoryBlobStore)
//! ```
//!
//! ## Modules
//!
//! - `bundle`: install, enable, disable and uninstall of bundle versions
//! - `action`: action capability flags and the blob upload action
//! - `blobstore`: blob store interface and the local directory store
//! - `system`: filesystem primitives the bundle code depends on
//! - `clock`: time source for bookkeeping
//! - `crypto`: checksum formats

pub mod action;
pub mod blobstore;
pub mod bundle;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod system;

// Re-export commonly used types
pub use action::{Action, ActionError, ActionKind, Capabilities, UploadBlobAction, UploadBlobSpec};
pub use blobstore::{BlobStore, BlobStoreError, LocalBlobStore};
pub use bundle::{BundleDefinition, BundleError, FileBundle, FileBundleCollection};
pub use clock::{Clock, SystemClock};
pub use system::{FileSystem, OsFileSystem, Ownership};
