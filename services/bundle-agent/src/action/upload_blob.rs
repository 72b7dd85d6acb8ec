//! Integrity-checked blob upload.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Action, ActionError, ActionKind};
use crate::blobstore::BlobStore;
use crate::crypto::Checksum;

/// Arguments of `upload_blob`.
///
/// Fields are written in snake_case; the capitalized controller spelling
/// (`Payload`, `Checksum`, `BlobID`) is accepted on input.
#[derive(Clone, Serialize, Deserialize)]
pub struct UploadBlobSpec {
    /// Base64 encoded blob content.
    #[serde(alias = "Payload")]
    pub payload: String,
    /// Digest of the decoded content; the format selects the algorithm.
    #[serde(alias = "Checksum")]
    pub checksum: String,
    #[serde(alias = "BlobID")]
    pub blob_id: String,
}

// Keep the payload out of logs and panics.
impl fmt::Debug for UploadBlobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadBlobSpec")
            .field("payload", &format_args!("<{} bytes>", self.payload.len()))
            .field("checksum", &self.checksum)
            .field("blob_id", &self.blob_id)
            .finish()
    }
}

/// Decodes a payload, verifies its checksum and writes it to the blob store.
pub struct UploadBlobAction {
    blob_store: Arc<dyn BlobStore>,
}

impl UploadBlobAction {
    pub fn new(blob_store: Arc<dyn BlobStore>) -> Self {
        Self { blob_store }
    }
}

#[async_trait]
impl Action for UploadBlobAction {
    type Args = UploadBlobSpec;
    type Output = String;

    const KIND: ActionKind = ActionKind::UploadBlob;

    async fn run(&self, spec: UploadBlobSpec) -> Result<String, ActionError> {
        let content = base64::engine::general_purpose::STANDARD.decode(spec.payload.as_bytes())?;

        let checksum = Checksum::parse(&spec.checksum);
        let computed = checksum.compute(&content);
        if !checksum.matches(&computed) {
            return Err(ActionError::ChecksumMismatch {
                expected: spec.checksum,
                actual: computed,
            });
        }

        self.blob_store.write(&spec.blob_id, &content).await?;

        info!(
            blob_id = %spec.blob_id,
            size_bytes = content.len(),
            "Blob uploaded"
        );
        Ok("OK".to_string())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use sha1::{Digest, Sha1};

    use super::*;
    use crate::action::run_json;
    use crate::blobstore::MemoryBlobStore;

    const PAYLOAD: &str = "Y2xvdWRmb3VuZHJ5";
    const CHECKSUM: &str = "e578935e2f0613d68ba6a4fcc0d32754b52d334d";

    fn setup() -> (Arc<MemoryBlobStore>, UploadBlobAction) {
        let store = Arc::new(MemoryBlobStore::new());
        let action = UploadBlobAction::new(store.clone());
        (store, action)
    }

    fn spec(checksum: &str) -> UploadBlobSpec {
        UploadBlobSpec {
            payload: PAYLOAD.to_string(),
            checksum: checksum.to_string(),
            blob_id: "id".to_string(),
        }
    }

    #[test]
    fn test_capabilities() {
        let (_store, action) = setup();
        let caps = action.capabilities();
        assert!(caps.is_asynchronous());
        assert!(!caps.is_persistent());
        assert!(!caps.is_loggable());
        assert!(!caps.is_resumable());
        assert!(!caps.is_cancelable());
    }

    #[tokio::test]
    async fn test_run_validates_checksum() {
        let (_store, action) = setup();
        let result = action.run(spec(CHECKSUM)).await.unwrap();
        assert_eq!(result, "OK");
    }

    #[tokio::test]
    async fn test_run_rejects_bad_checksum() {
        let (store, action) = setup();

        let err = action.run(spec("badChecksum")).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Payload corrupted. Checksum mismatch. Expected 'badChecksum' but received 'e578935e2f0613d68ba6a4fcc0d32754b52d334d'"
        );
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_run_writes_once() {
        let (store, action) = setup();

        action.run(spec(CHECKSUM)).await.unwrap();

        assert_eq!(
            store.writes(),
            vec![("id".to_string(), b"cloudfoundry".to_vec())]
        );
    }

    #[tokio::test]
    async fn test_run_returns_blob_store_error() {
        let (store, action) = setup();
        store.fail_writes("blob write error");

        let err = action.run(spec(CHECKSUM)).await.unwrap_err();

        assert_eq!(err.to_string(), "blob write error");
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_base64() {
        let (store, action) = setup();
        let mut spec = spec(CHECKSUM);
        spec.payload = "not base64!".to_string();

        let err = action.run(spec).await.unwrap_err();

        assert!(matches!(err, ActionError::InvalidPayload(_)));
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_run_accepts_sha256() {
        let (store, action) = setup();
        let checksum = Checksum::parse("sha256:").compute(b"cloudfoundry");

        action.run(spec(&checksum)).await.unwrap();

        assert_eq!(store.get("id"), Some(b"cloudfoundry".to_vec()));
    }

    #[tokio::test]
    async fn test_resume_and_cancel_unsupported() {
        let (_store, action) = setup();

        let err = action.resume(spec(CHECKSUM)).await.unwrap_err();
        assert!(matches!(err, ActionError::NotResumable("upload_blob")));

        let err = action.cancel().await.unwrap_err();
        assert!(matches!(err, ActionError::NotCancelable("upload_blob")));
    }

    #[tokio::test]
    async fn test_run_json() {
        let (store, action) = setup();
        let args = serde_json::json!({
            "payload": PAYLOAD,
            "checksum": CHECKSUM,
            "blob_id": "id",
        });

        let result = run_json(&action, args).await.unwrap();

        assert_eq!(result, serde_json::json!("OK"));
        assert_eq!(store.get("id"), Some(b"cloudfoundry".to_vec()));
    }

    #[tokio::test]
    async fn test_run_json_rejects_missing_fields() {
        let (store, action) = setup();

        let err = run_json(&action, serde_json::json!({ "payload": PAYLOAD }))
            .await
            .unwrap_err();

        assert!(matches!(err, ActionError::InvalidArguments { .. }));
        assert!(store.writes().is_empty());
    }

    fn encode(content: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(content)
    }

    fn flip_first_digit(checksum: &str) -> String {
        let replacement = if checksum.starts_with('0') { "1" } else { "0" };
        format!("{replacement}{}", &checksum[1..])
    }

    #[rstest]
    #[case::empty(Vec::new())]
    #[case::single_zero_byte(vec![0u8])]
    #[case::text(b"cloudfoundry".to_vec())]
    #[case::every_byte_value((0..=255u8).collect())]
    #[case::large(b"package go\n".repeat(4096))]
    #[tokio::test]
    async fn test_run_stores_exact_bytes(#[case] content: Vec<u8>) {
        let (store, action) = setup();
        let checksum = hex::encode(Sha1::digest(&content));

        let result = action
            .run(UploadBlobSpec {
                payload: encode(&content),
                checksum,
                blob_id: "blob".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(result, "OK");
        assert_eq!(store.writes(), vec![("blob".to_string(), content)]);
    }

    #[rstest]
    #[case::empty(Vec::new())]
    #[case::single_zero_byte(vec![0u8])]
    #[case::text(b"cloudfoundry".to_vec())]
    #[case::every_byte_value((0..=255u8).collect())]
    #[tokio::test]
    async fn test_run_rejects_altered_checksum(#[case] content: Vec<u8>) {
        let (store, action) = setup();
        let actual = hex::encode(Sha1::digest(&content));
        let expected = flip_first_digit(&actual);

        let err = action
            .run(UploadBlobSpec {
                payload: encode(&content),
                checksum: expected.clone(),
                blob_id: "blob".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            format!(
                "Payload corrupted. Checksum mismatch. Expected '{expected}' but received '{actual}'"
            )
        );
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_empty_payload_checksum() {
        let (store, action) = setup();
        let mut spec = spec("da39a3ee5e6b4b0d3255bfef95601890afd80709");
        spec.payload = String::new();

        action.run(spec).await.unwrap();

        assert_eq!(store.get("id"), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_run_json_accepts_capitalized_fields() {
        let (store, action) = setup();
        let args = serde_json::json!({
            "Payload": PAYLOAD,
            "Checksum": CHECKSUM,
            "BlobID": "id",
        });

        run_json(&action, args).await.unwrap();

        assert_eq!(store.get("id"), Some(b"cloudfoundry".to_vec()));
    }

    #[test]
    fn test_debug_hides_payload() {
        let rendered = format!("{:?}", spec(CHECKSUM));
        assert!(!rendered.contains(PAYLOAD));
        assert!(rendered.contains("<16 bytes>"));
    }
}
