//! Renderer
//!
//! Turns a [`Report`] into its terminal artifact. Every render first
//! negotiates the schema version with the target profile and validates the
//! document under it; nothing is written unless the whole artifact was
//! produced.

use crate::cloud::{Attachment, UploadPayload, UploadReceipt, UploadTransport};
use crate::error::RenderError;
use crate::local::{self, EMBED_PREFIX, TEMPLATE, VIEWER_CSS, VIEWER_JS};
use crate::report::{Report, Target, TargetProfile};
use folio_asset::{AssetError, ContentHash};
use folio_codec::{encode, CodecOptions};
use folio_schema::Validator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// Renderer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Largest single asset a LOCAL file will embed
    pub local_embed_limit: usize,
    /// CLOUD assets below this size travel inside the document
    pub inline_threshold: usize,
    /// Path prefix for CLOUD attachments
    pub attachment_prefix: String,
}

impl RenderOptions {
    /// Default LOCAL embed limit (25 MiB)
    pub const DEFAULT_LOCAL_EMBED_LIMIT: usize = 25 * 1024 * 1024;

    #[must_use]
    pub fn with_local_embed_limit(mut self, bytes: usize) -> Self {
        self.local_embed_limit = bytes;
        self
    }

    #[must_use]
    pub fn with_inline_threshold(mut self, bytes: usize) -> Self {
        self.inline_threshold = bytes;
        self
    }

    #[must_use]
    pub fn with_attachment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.attachment_prefix = prefix.into();
        self
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            local_embed_limit: Self::DEFAULT_LOCAL_EMBED_LIMIT,
            inline_threshold: CodecOptions::DEFAULT_INLINE_THRESHOLD,
            attachment_prefix: "attachments/".to_string(),
        }
    }
}

/// Where a LOCAL render writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub output_dir: PathBuf,
    /// File name without extension
    pub name: String,
}

impl RenderRequest {
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            name: name.into(),
        }
    }

    /// Final artifact path
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.html", self.name))
    }
}

/// Written LOCAL file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifact {
    pub path: PathBuf,
    /// Size of the HTML file
    pub size: usize,
    /// Digest of the embedded document bytes
    pub digest: ContentHash,
}

/// LOCAL HTML rendered in memory, not yet written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPage {
    html: String,
    digest: ContentHash,
    assets: usize,
}

impl LocalPage {
    /// Digest of the embedded document bytes
    #[inline]
    #[must_use]
    pub fn digest(&self) -> ContentHash {
        self.digest
    }

    #[inline]
    #[must_use]
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Write the page to `path` through a temporary file in the same
    /// directory
    ///
    /// # Errors
    /// `RenderError::Io` for filesystem failures
    pub fn write(&self, path: &Path) -> Result<LocalArtifact, RenderError> {
        write_atomic(path, self.html.as_bytes())?;
        tracing::info!(
            path = %path.display(),
            size = self.html.len(),
            assets = self.assets,
            digest = %self.digest.short(),
            "local report written"
        );
        Ok(LocalArtifact {
            path: path.to_path_buf(),
            size: self.html.len(),
            digest: self.digest,
        })
    }
}

/// Terminal artifact of a render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Local(LocalArtifact),
    Cloud(UploadPayload),
}

/// Report renderer
#[derive(Debug, Clone)]
pub struct Renderer {
    options: RenderOptions,
    local: TargetProfile,
    cloud: TargetProfile,
    template: String,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            options: RenderOptions::default(),
            local: TargetProfile::local(),
            cloud: TargetProfile::cloud(),
            template: TEMPLATE.to_string(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the profile for the profile's target
    #[must_use]
    pub fn with_profile(mut self, profile: TargetProfile) -> Self {
        match profile.target() {
            Target::Local => self.local = profile,
            Target::Cloud => self.cloud = profile,
        }
        self
    }

    /// Use a custom HTML template; checked at render time
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    #[must_use]
    pub fn profile(&self, target: Target) -> &TargetProfile {
        match target {
            Target::Local => &self.local,
            Target::Cloud => &self.cloud,
        }
    }

    /// Render `report` for its own target
    ///
    /// # Errors
    /// See [`render_local`](Self::render_local) and
    /// [`render_cloud`](Self::render_cloud)
    pub fn render(&self, report: &Report, request: &RenderRequest) -> Result<Artifact, RenderError> {
        match report.target() {
            Target::Local => self
                .render_local(report, &request.path())
                .map(Artifact::Local),
            Target::Cloud => self.render_cloud(report).map(Artifact::Cloud),
        }
    }

    /// Write `report` as one self-contained HTML file at `path`
    ///
    /// Same as [`render_page`](Self::render_page) followed by
    /// [`LocalPage::write`].
    ///
    /// # Errors
    /// Any [`render_page`](Self::render_page) failure, or `RenderError::Io`
    /// for filesystem failures
    pub fn render_local(&self, report: &Report, path: &Path) -> Result<LocalArtifact, RenderError> {
        self.render_page(report)?.write(path)
    }

    /// Render `report` as one self-contained HTML page, in memory
    ///
    /// # Errors
    /// - `RenderError::UnsupportedSchema` / `RenderError::Invalid` if the
    ///   document cannot be displayed
    /// - `RenderError::Asset(OversizedWithoutExternalTarget)` for assets over
    ///   the embed limit
    /// - `RenderError::TemplateFailure` for a broken template
    pub fn render_page(&self, report: &Report) -> Result<LocalPage, RenderError> {
        self.check(report, Target::Local)?;

        let limit = self.options.local_embed_limit;
        if let Some(asset) = report.assets().find(|a| a.meta.size > limit) {
            return Err(AssetError::OversizedWithoutExternalTarget {
                hash: asset.meta.hash,
                size: asset.meta.size,
                limit,
            }
            .into());
        }

        // Every asset is external to the document and embedded in the file.
        let codec = CodecOptions::default()
            .with_inline_threshold(0)
            .with_external_prefix(EMBED_PREFIX);
        let encoded = encode(report.document(), report, &codec)?;
        let digest = ContentHash::compute(&encoded.bytes);

        let assets = local::asset_tags(
            report
                .assets()
                .map(|a| (&a.meta.hash, a.meta.mime_type.as_str(), &a.data[..])),
        );
        let values: BTreeMap<&str, String> = [
            ("title", local::escape_html(report.document().title())),
            ("viewer_css", VIEWER_CSS.to_string()),
            ("document", local::embed_json(&encoded.bytes)?),
            ("assets", assets),
            ("viewer_js", VIEWER_JS.to_string()),
        ]
        .into_iter()
        .collect();
        let html = local::fill(&self.template, &values)?;

        Ok(LocalPage {
            html,
            digest,
            assets: report.asset_count(),
        })
    }

    /// Build the upload payload for `report`
    ///
    /// # Errors
    /// - `RenderError::UnsupportedSchema` / `RenderError::Invalid` if the
    ///   document cannot be displayed
    /// - `RenderError::UnsafePath` if the attachment prefix is absolute or
    ///   contains `..`
    /// - `RenderError::Codec` if encoding fails
    pub fn render_cloud(&self, report: &Report) -> Result<UploadPayload, RenderError> {
        self.check(report, Target::Cloud)?;
        if !crate::cloud::is_contained(&self.options.attachment_prefix) {
            return Err(RenderError::UnsafePath(self.options.attachment_prefix.clone()));
        }

        let codec = CodecOptions::default()
            .with_inline_threshold(self.options.inline_threshold)
            .with_external_prefix(self.options.attachment_prefix.clone());
        let encoded = encode(report.document(), report, &codec)?;

        let mut attachments = Vec::new();
        for entry in encoded.external() {
            let asset = report
                .asset(&entry.hash)
                .ok_or(RenderError::MissingAsset(entry.hash))?;
            attachments.push(Attachment {
                hash: entry.hash,
                mime_type: entry.mime_type.clone(),
                path: entry.location.path().unwrap_or_default().to_string(),
                data: asset.data.clone(),
            });
        }

        let digest = ContentHash::compute(&encoded.bytes);
        tracing::debug!(
            digest = %digest.short(),
            attachments = attachments.len(),
            "cloud payload built"
        );
        Ok(UploadPayload {
            document: encoded.bytes,
            digest,
            manifest: encoded.manifest,
            attachments,
        })
    }

    /// Render for CLOUD and hand the payload to `transport`
    ///
    /// # Errors
    /// Any [`render_cloud`](Self::render_cloud) failure, or the transport's
    pub async fn publish(
        &self,
        report: &Report,
        transport: &dyn UploadTransport,
    ) -> Result<UploadReceipt, RenderError> {
        let payload = self.render_cloud(report)?;
        transport.upload(&payload).await
    }

    fn check(&self, report: &Report, target: Target) -> Result<(), RenderError> {
        let version = self.profile(target).negotiate(report.document())?;
        let document = report.document();
        Validator::builtin()
            .with_max_depth(document.max_depth())
            .validate(document, version)?;
        Ok(())
    }
}

/// Write `data` to `path` through a temporary file in the same directory
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), RenderError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| RenderError::io(dir, e))?;

    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| RenderError::io(dir, e))?;
    temp.write_all(data)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| RenderError::io(temp.path(), e))?;
    temp.persist(path)
        .map_err(|e| RenderError::io(path, e.error))?;
    Ok(())
}
