//! Script output to terminal artifact
//!
//! `TreeSpec` → `TreeBuilder` → finalize → validate → `Report` → render.
//!
//! Work happens in two steps. [`stage`] builds and renders in memory on the
//! blocking pool and can be abandoned at any point. [`Staged::deliver`]
//! writes or uploads the result; it is the only step with visible effects.

use crate::error::RunnerError;
use crate::tree_spec::TreeSpec;
use folio_asset::{AssetStore, ContentHash};
use folio_render::{
    DirectoryTransport, LocalPage, RenderRequest, Renderer, Report, Target, UploadPayload,
    UploadTransport,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Where a rendered report ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Published {
    pub target: Target,
    /// HTML file for LOCAL, upload directory for CLOUD
    pub location: String,
    pub digest: ContentHash,
    pub blocks: usize,
    pub assets: usize,
}

/// Report rendered in memory, not yet delivered
#[derive(Debug)]
pub struct Staged {
    blocks: usize,
    assets: usize,
    artifact: StagedArtifact,
}

#[derive(Debug)]
enum StagedArtifact {
    Local(LocalPage),
    Cloud(UploadPayload),
}

impl Staged {
    #[inline]
    #[must_use]
    pub fn target(&self) -> Target {
        match self.artifact {
            StagedArtifact::Local(_) => Target::Local,
            StagedArtifact::Cloud(_) => Target::Cloud,
        }
    }

    /// Write the LOCAL page, or upload the CLOUD payload under
    /// `request.output_dir`
    ///
    /// # Errors
    /// Filesystem or transport failures
    pub async fn deliver(self, request: &RenderRequest) -> Result<Published, RunnerError> {
        let Self {
            blocks,
            assets,
            artifact,
        } = self;
        let published = match artifact {
            StagedArtifact::Local(page) => {
                let path = request.path();
                let written = blocking(move || Ok(page.write(&path)?)).await?;
                Published {
                    target: Target::Local,
                    location: written.path.display().to_string(),
                    digest: written.digest,
                    blocks,
                    assets,
                }
            }
            StagedArtifact::Cloud(payload) => {
                let transport = DirectoryTransport::new(&request.output_dir);
                let receipt = transport.upload(&payload).await?;
                Published {
                    target: Target::Cloud,
                    location: receipt.location,
                    digest: receipt.digest,
                    blocks,
                    assets,
                }
            }
        };
        tracing::info!(
            delivery = %published.target,
            location = %published.location,
            blocks,
            assets,
            "report published"
        );
        Ok(published)
    }
}

/// Build, validate and render `tree` in memory
///
/// Runs on the blocking pool: path assets are read from disk while the tree
/// is built. Assets are interned into a store owned by this call, so nothing
/// outlives a failed build.
///
/// # Errors
/// Any authoring, validation, asset or render failure
pub async fn stage(
    tree: TreeSpec,
    workdir: PathBuf,
    target: Target,
    renderer: Renderer,
) -> Result<Staged, RunnerError> {
    blocking(move || {
        let store = AssetStore::new();
        let document = tree.build(&store, &workdir, None)?;
        folio_schema::validate(&document, document.schema_version())?;

        let blocks = document.block_count();
        let report = Report::assemble(document, &store, target)?;
        let artifact = match target {
            Target::Local => StagedArtifact::Local(renderer.render_page(&report)?),
            Target::Cloud => StagedArtifact::Cloud(renderer.render_cloud(&report)?),
        };
        Ok(Staged {
            blocks,
            assets: report.asset_count(),
            artifact,
        })
    })
    .await
}

/// Build, validate, render and deliver `tree`
///
/// # Errors
/// Any [`stage`] or [`Staged::deliver`] failure
pub async fn render_tree(
    tree: &TreeSpec,
    workdir: &Path,
    target: Target,
    request: &RenderRequest,
    renderer: &Renderer,
) -> Result<Published, RunnerError> {
    stage(tree.clone(), workdir.to_path_buf(), target, renderer.clone())
        .await?
        .deliver(request)
        .await
}

async fn blocking<T, F>(work: F) -> Result<T, RunnerError>
where
    F: FnOnce() -> Result<T, RunnerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RunnerError::Internal(format!("blocking task failed: {e}")))?
}

/// Read and parse the tree a script left at `output`
///
/// # Errors
/// `RunnerError::ScriptFailure` if the script wrote nothing usable
pub async fn read_tree(output: &Path) -> Result<TreeSpec, RunnerError> {
    let bytes = match tokio::fs::read(output).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RunnerError::script(format!(
                "script did not write {}",
                output.display()
            )))
        }
        Err(e) => return Err(RunnerError::io(PathBuf::from(output), e)),
    };
    TreeSpec::from_slice(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn renders_local_and_cloud() {
        let dir = tempfile::tempdir().unwrap();
        let tree: TreeSpec = serde_json::from_value(json!({
            "title": "Pipeline",
            "blocks": [
                {"kind": "table", "asset": {"mime_type": "text/csv", "text": "a\n1\n"}},
                {"kind": "text", "attributes": {"text": "hello"}}
            ]
        }))
        .unwrap();
        let renderer = Renderer::new();

        let request = RenderRequest::new(dir.path().join("html"), "report");
        let local = render_tree(&tree, dir.path(), Target::Local, &request, &renderer)
            .await
            .unwrap();
        assert_eq!(local.blocks, 3);
        assert_eq!(local.assets, 1);
        assert!(request.path().exists());

        let request = RenderRequest::new(dir.path().join("cloud"), "unused");
        let cloud = render_tree(&tree, dir.path(), Target::Cloud, &request, &renderer)
            .await
            .unwrap();
        assert!(Path::new(&cloud.location).join("document.json").exists());
    }

    #[tokio::test]
    async fn invalid_tree_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let tree: TreeSpec = serde_json::from_value(json!({
            "title": "Bad",
            "blocks": [{"kind": "text", "attributes": {"text": "  "}}]
        }))
        .unwrap();
        let request = RenderRequest::new(dir.path().join("out"), "report");
        let err = render_tree(&tree, dir.path(), Target::Local, &request, &Renderer::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Invalid(_)));
        assert!(!request.path().exists());
    }

    #[tokio::test]
    async fn staging_writes_nothing_until_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let tree: TreeSpec = serde_json::from_value(json!({
            "title": "Staged",
            "blocks": [{"kind": "text", "attributes": {"text": "later"}}]
        }))
        .unwrap();
        let staged = stage(tree, dir.path().to_path_buf(), Target::Local, Renderer::new())
            .await
            .unwrap();
        assert_eq!(staged.target(), Target::Local);

        let request = RenderRequest::new(dir.path().join("out"), "staged");
        assert!(!request.path().exists());
        let published = staged.deliver(&request).await.unwrap();
        assert_eq!(Path::new(&published.location), request.path());
        assert!(request.path().exists());
    }

    #[tokio::test]
    async fn missing_output_is_a_script_failure() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_tree(&dir.path().join("nope.json")).await,
            Err(RunnerError::ScriptFailure { .. })
        ));
    }
}
