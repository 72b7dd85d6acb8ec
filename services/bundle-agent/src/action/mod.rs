//! Remotely triggered actions.
//!
//! Every action type fixes five capability flags that a dispatcher reads
//! around invocation:
//!
//! | Flag         | Meaning                                                |
//! |--------------|--------------------------------------------------------|
//! | asynchronous | run must not block the request-acceptance path         |
//! | persistent   | invocation is recorded durably for resume-after-restart|
//! | loggable     | raw arguments may be recorded for audit                |
//! | resumable    | run accepts prior partial state                        |
//! | cancelable   | a cancel call can affect a running invocation          |
//!
//! The flags live in a static table keyed by [`ActionKind`], so they cannot
//! change at runtime. Transport and routing of requests are not part of this
//! module.

mod upload_blob;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::blobstore::BlobStoreError;

pub use upload_blob::{UploadBlobAction, UploadBlobSpec};

/// Capability flags of an action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    asynchronous: bool,
    persistent: bool,
    loggable: bool,
    resumable: bool,
    cancelable: bool,
}

impl Capabilities {
    pub const fn new(
        asynchronous: bool,
        persistent: bool,
        loggable: bool,
        resumable: bool,
        cancelable: bool,
    ) -> Self {
        Self {
            asynchronous,
            persistent,
            loggable,
            resumable,
            cancelable,
        }
    }

    pub const fn is_asynchronous(&self) -> bool {
        self.asynchronous
    }

    pub const fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub const fn is_loggable(&self) -> bool {
        self.loggable
    }

    pub const fn is_resumable(&self) -> bool {
        self.resumable
    }

    pub const fn is_cancelable(&self) -> bool {
        self.cancelable
    }
}

/// Every action type the agent implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    UploadBlob,
}

impl ActionKind {
    pub const ALL: &'static [ActionKind] = &[ActionKind::UploadBlob];

    /// Wire name of the action.
    pub const fn name(self) -> &'static str {
        match self {
            Self::UploadBlob => "upload_blob",
        }
    }

    pub const fn capabilities(self) -> Capabilities {
        match self {
            // Payload may carry sensitive content, so arguments are not loggable.
            Self::UploadBlob => Capabilities::new(true, false, false, false, false),
        }
    }
}

/// Errors returned by actions.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Decoding payload: {0}")]
    InvalidPayload(#[from] base64::DecodeError),

    #[error("Payload corrupted. Checksum mismatch. Expected '{expected}' but received '{actual}'")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Invalid arguments for {action}: {source}")]
    InvalidArguments {
        action: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Encoding result of {action}: {source}")]
    InvalidOutput {
        action: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Action {0} is not resumable")]
    NotResumable(&'static str),

    #[error("Action {0} is not cancelable")]
    NotCancelable(&'static str),

    /// Blob store failures surface with the store's own message.
    #[error(transparent)]
    BlobStore(#[from] BlobStoreError),
}

/// A single invocable operation.
///
/// A fresh value is built per request; implementations keep no state across
/// invocations.
#[async_trait]
pub trait Action: Send + Sync {
    type Args: DeserializeOwned + Send;
    type Output: Serialize + Send;

    const KIND: ActionKind;

    fn capabilities(&self) -> Capabilities {
        Self::KIND.capabilities()
    }

    async fn run(&self, args: Self::Args) -> Result<Self::Output, ActionError>;

    async fn resume(&self, _args: Self::Args) -> Result<Self::Output, ActionError> {
        Err(ActionError::NotResumable(Self::KIND.name()))
    }

    async fn cancel(&self) -> Result<(), ActionError> {
        Err(ActionError::NotCancelable(Self::KIND.name()))
    }
}

/// Decode JSON arguments, run the action and encode its result.
///
/// Arguments are only logged when the action is loggable.
pub async fn run_json<A: Action>(
    action: &A,
    args: serde_json::Value,
) -> Result<serde_json::Value, ActionError> {
    let name = A::KIND.name();
    if action.capabilities().is_loggable() {
        debug!(action = name, args = %args, "Running action");
    } else {
        debug!(action = name, "Running action");
    }

    let args: A::Args = serde_json::from_value(args)
        .map_err(|source| ActionError::InvalidArguments { action: name, source })?;
    let output = action.run(args).await?;

    serde_json::to_value(output).map_err(|source| ActionError::InvalidOutput { action: name, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_blob_capabilities() {
        let caps = ActionKind::UploadBlob.capabilities();
        assert!(caps.is_asynchronous());
        assert!(!caps.is_persistent());
        assert!(!caps.is_loggable());
        assert!(!caps.is_resumable());
        assert!(!caps.is_cancelable());
    }

    #[test]
    fn test_kind_names_are_unique() {
        let mut names: Vec<_> = ActionKind::ALL.iter().map(|k| k.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ActionKind::ALL.len());
    }

    #[test]
    fn test_checksum_mismatch_text() {
        let err = ActionError::ChecksumMismatch {
            expected: "a".to_string(),
            actual: "b".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Payload corrupted. Checksum mismatch. Expected 'a' but received 'b'"
        );
    }

    #[test]
    fn test_blob_store_error_is_transparent() {
        let err = ActionError::from(BlobStoreError::Backend("blob write error".to_string()));
        assert_eq!(err.to_string(), "blob write error");
    }
}
