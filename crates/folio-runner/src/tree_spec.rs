//! Script output contract
//!
//! A job script writes a JSON [`TreeSpec`] to the path in `FOLIO_OUTPUT`:
//!
//! ```json
//! {"title": "Sales", "blocks": [
//!   {"kind": "table", "caption": "Q1",
//!    "asset": {"mime_type": "text/csv", "path": "q1.csv"}},
//!   {"kind": "text", "attributes": {"text": "## Notes"}}
//! ]}
//! ```
//!
//! Assets are given as inline `text`, `base64` or a `path` relative to the
//! job's working directory. Paths that leave the working directory are
//! rejected.

use crate::error::RunnerError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use folio_asset::{AssetError, AssetStore, ContentHash};
use folio_block::{AttrValue, BlockHandle, BlockKind, BlockSpec, Context, Document, TreeBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Document description produced by a script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSpec {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// `major.minor`; the current schema when absent
    #[serde(default)]
    pub schema_version: Option<String>,
    pub blocks: Vec<BlockNode>,
}

/// One block and its subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockNode {
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub asset: Option<AssetSource>,
    #[serde(default)]
    pub children: Vec<BlockNode>,
}

/// Asset payload; exactly one of `text`, `base64`, `path`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSource {
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl AssetSource {
    fn intern(&self, store: &AssetStore, workdir: &Path) -> Result<ContentHash, RunnerError> {
        match (&self.text, &self.base64, &self.path) {
            (Some(text), None, None) => Ok(store.intern(text.as_bytes(), &self.mime_type)?),
            (None, Some(encoded), None) => {
                let bytes = STANDARD
                    .decode(encoded)
                    .map_err(|e| AssetError::unreadable("base64", e))?;
                Ok(store.intern(bytes, &self.mime_type)?)
            }
            (None, None, Some(path)) => {
                let path = confine(workdir, path)?;
                Ok(store.intern_file(path, &self.mime_type)?)
            }
            _ => Err(RunnerError::script(
                "asset must set exactly one of text, base64 or path",
            )),
        }
    }
}

/// Resolve `path` under `workdir`, refusing anything that leaves it
fn confine(workdir: &Path, path: &Path) -> Result<PathBuf, RunnerError> {
    let violation = || RunnerError::SandboxViolation {
        path: path.to_path_buf(),
    };
    let lexically_inside = path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !lexically_inside {
        return Err(violation());
    }

    // Symlinks may still point outside.
    let root = workdir
        .canonicalize()
        .map_err(|e| RunnerError::io(workdir, e))?;
    let joined = root.join(path);
    let resolved = joined
        .canonicalize()
        .map_err(|e| AssetError::unreadable_path(&joined, &e))?;
    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(violation())
    }
}

impl TreeSpec {
    /// Parse script output
    ///
    /// # Errors
    /// `RunnerError::ScriptFailure` if the bytes are not a tree description
    pub fn from_slice(bytes: &[u8]) -> Result<Self, RunnerError> {
        serde_json::from_slice(bytes)
            .map_err(|e| RunnerError::script(format!("malformed script output: {e}")))
    }

    /// Build and finalize the document
    ///
    /// Assets are interned into `store`; on failure the references taken so
    /// far are left for the caller to discard with the store.
    ///
    /// # Errors
    /// - `RunnerError::SandboxViolation` for asset paths outside `workdir`
    /// - `RunnerError::Asset` for unreadable assets
    /// - `RunnerError::Authoring` for malformed trees
    /// - `RunnerError::ScriptFailure` for unknown kinds or bad values
    pub fn build(
        &self,
        store: &AssetStore,
        workdir: &Path,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<Document, RunnerError> {
        let mut context = Context::new(&self.title);
        if let Some(author) = &self.author {
            context = context.with_author(author);
        }
        if let Some(description) = &self.description {
            context = context.with_description(description);
        }
        if let Some(version) = &self.schema_version {
            let version = version
                .parse()
                .map_err(|e| RunnerError::script(format!("{e}")))?;
            context = context.with_schema_version(version);
        }
        if let Some(at) = created_at {
            context = context.with_created_at(at);
        }

        let mut builder = TreeBuilder::new();
        let mut roots = Vec::with_capacity(self.blocks.len());
        for node in &self.blocks {
            roots.push(add_node(&mut builder, node, store, workdir)?);
        }
        Ok(builder.finalize(&roots, &context)?)
    }
}

fn add_node(
    builder: &mut TreeBuilder,
    node: &BlockNode,
    store: &AssetStore,
    workdir: &Path,
) -> Result<BlockHandle, RunnerError> {
    let kind: BlockKind = node
        .kind
        .parse()
        .map_err(|e| RunnerError::script(format!("{e}")))?;
    let mut spec = BlockSpec::new(kind);
    if let Some(id) = &node.id {
        spec = spec.with_id(id);
    }
    for (key, value) in &node.attributes {
        spec = spec.with_attr(key, attr_value(key, value)?);
    }
    if let Some(caption) = &node.caption {
        spec = spec.with_caption(caption);
    }
    if let Some(asset) = &node.asset {
        spec = spec.with_asset(asset.intern(store, workdir)?);
    }

    let handle = builder.add_block(spec)?;
    for child in &node.children {
        let child = add_node(builder, child, store, workdir)?;
        builder.add_child(handle, child)?;
    }
    Ok(handle)
}

fn attr_value(key: &str, value: &serde_json::Value) -> Result<AttrValue, RunnerError> {
    use serde_json::Value;
    match value {
        Value::String(s) => Ok(s.as_str().into()),
        Value::Bool(b) => Ok((*b).into()),
        Value::Number(n) => n
            .as_i64()
            .map(AttrValue::from)
            .or_else(|| n.as_f64().map(AttrValue::from))
            .ok_or_else(|| RunnerError::script(format!("attribute '{key}': number out of range"))),
        Value::Null | Value::Array(_) | Value::Object(_) => Err(RunnerError::script(format!(
            "attribute '{key}' must be a string, number or boolean"
        ))),
    }
}
