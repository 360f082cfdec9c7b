//! Upload payloads for remote delivery

use crate::error::RenderError;
use folio_asset::ContentHash;
use folio_codec::ManifestEntry;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// External asset shipped alongside an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub hash: ContentHash,
    pub mime_type: String,
    /// Relative path the document refers to the asset by
    pub path: String,
    pub data: Arc<[u8]>,
}

/// Everything a remote service needs to host a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPayload {
    /// Encoded document
    pub document: Vec<u8>,
    /// Digest of `document`
    pub digest: ContentHash,
    pub manifest: Vec<ManifestEntry>,
    /// External assets, sorted by hash
    pub attachments: Vec<Attachment>,
}

impl UploadPayload {
    /// Total bytes sent: document plus attachments
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.document.len() + self.attachments.iter().map(|a| a.data.len()).sum::<usize>()
    }
}

/// Where an upload ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub location: String,
    pub digest: ContentHash,
}

/// Delivery channel for upload payloads
///
/// The remote service itself is out of scope; implementations wrap whatever
/// transport the host provides.
#[async_trait::async_trait]
pub trait UploadTransport: Send + Sync {
    /// Deliver `payload`
    ///
    /// # Errors
    /// Transport-specific failure
    async fn upload(&self, payload: &UploadPayload) -> Result<UploadReceipt, RenderError>;
}

/// Transport that lays payloads out in a local directory
///
/// Each payload lands in `<root>/<digest>/` as `document.json`,
/// `manifest.json` and its attachments. The directory is assembled under a
/// temporary name and renamed into place, so a reader never sees a partial
/// upload. Uploading the same digest twice is a no-op, including when two
/// uploads race. Attachment paths must stay inside the payload directory.
#[derive(Debug, Clone)]
pub struct DirectoryTransport {
    root: PathBuf,
}

impl DirectoryTransport {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait::async_trait]
impl UploadTransport for DirectoryTransport {
    async fn upload(&self, payload: &UploadPayload) -> Result<UploadReceipt, RenderError> {
        if let Some(bad) = payload.attachments.iter().find(|a| !is_contained(&a.path)) {
            return Err(RenderError::UnsafePath(bad.path.clone()));
        }
        let target = self.root.join(payload.digest.to_hex());
        let receipt = UploadReceipt {
            location: target.display().to_string(),
            digest: payload.digest,
        };
        if tokio::fs::try_exists(&target)
            .await
            .map_err(|e| RenderError::io(&target, e))?
        {
            tracing::debug!(digest = %payload.digest.short(), "payload already uploaded");
            return Ok(receipt);
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| RenderError::io(&self.root, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".upload-")
            .tempdir_in(&self.root)
            .map_err(|e| RenderError::io(&self.root, e))?;

        let manifest = serde_json::to_vec(&payload.manifest)
            .map_err(|e| RenderError::Malformed(e.to_string()))?;
        write(staging.path().join("document.json"), &payload.document).await?;
        write(staging.path().join("manifest.json"), &manifest).await?;
        for attachment in &payload.attachments {
            write(staging.path().join(&attachment.path), &attachment.data).await?;
        }

        if let Err(e) = tokio::fs::rename(staging.path(), &target).await {
            // A concurrent upload of the same digest got there first.
            if tokio::fs::try_exists(&target).await.unwrap_or(false) {
                tracing::debug!(digest = %payload.digest.short(), "payload uploaded concurrently");
                return Ok(receipt);
            }
            return Err(RenderError::io(&target, e));
        }

        tracing::info!(
            digest = %payload.digest.short(),
            attachments = payload.attachments.len(),
            bytes = payload.total_bytes(),
            location = %receipt.location,
            "payload uploaded"
        );
        Ok(receipt)
    }
}

/// Whether `path` is relative and never leaves the directory it is joined to
pub(crate) fn is_contained(path: &str) -> bool {
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

async fn write(path: PathBuf, data: &[u8]) -> Result<(), RenderError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RenderError::io(parent, e))?;
    }
    tokio::fs::write(&path, data)
        .await
        .map_err(|e| RenderError::io(&path, e))
}
