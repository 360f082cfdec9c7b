//! Reports: documents bundled with their assets and a target

use crate::error::RenderError;
use folio_asset::{AssetMeta, AssetStore, ContentHash};
use folio_block::{Document, SchemaVersion};
use folio_codec::AssetResolver;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Where a report is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Self-contained HTML file
    #[default]
    Local,
    /// Payload handed to a remote service
    Cloud,
}

impl Target {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "cloud" => Ok(Self::Cloud),
            other => Err(format!("unknown target: '{other}'")),
        }
    }
}

/// Schema versions a target can display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetProfile {
    target: Target,
    versions: Vec<SchemaVersion>,
}

impl TargetProfile {
    #[must_use]
    pub fn new(target: Target, versions: impl IntoIterator<Item = SchemaVersion>) -> Self {
        let mut versions: Vec<_> = versions.into_iter().collect();
        versions.sort_unstable();
        versions.dedup();
        Self { target, versions }
    }

    /// Bundled viewer: every released schema
    #[must_use]
    pub fn local() -> Self {
        Self::new(
            Target::Local,
            [SchemaVersion::V1_0, SchemaVersion::V1_1, SchemaVersion::V1_2],
        )
    }

    /// Remote service: every released schema
    #[must_use]
    pub fn cloud() -> Self {
        Self::new(
            Target::Cloud,
            [SchemaVersion::V1_0, SchemaVersion::V1_1, SchemaVersion::V1_2],
        )
    }

    #[inline]
    #[must_use]
    pub fn target(&self) -> Target {
        self.target
    }

    #[inline]
    #[must_use]
    pub fn versions(&self) -> &[SchemaVersion] {
        &self.versions
    }

    #[must_use]
    pub fn supports(&self, version: SchemaVersion) -> bool {
        self.versions.binary_search(&version).is_ok()
    }

    /// Version to render `document` under
    ///
    /// # Errors
    /// `RenderError::UnsupportedSchema` if the document's version is not
    /// displayable by this target
    pub fn negotiate(&self, document: &Document) -> Result<SchemaVersion, RenderError> {
        let version = document.schema_version();
        if self.supports(version) {
            Ok(version)
        } else {
            Err(RenderError::UnsupportedSchema {
                version,
                target: self.target,
            })
        }
    }
}

/// Asset payload resolved from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub meta: AssetMeta,
    pub data: Arc<[u8]>,
}

/// A document with every referenced asset resolved, bound to a target
///
/// Holds its own copies of asset payloads (shared `Arc`s), so later store
/// garbage collection does not affect it.
#[derive(Debug, Clone)]
pub struct Report {
    document: Document,
    assets: BTreeMap<ContentHash, ResolvedAsset>,
    target: Target,
}

impl Report {
    /// Resolve all assets `document` references
    ///
    /// # Errors
    /// `RenderError::MissingAsset` for the first reference (by hash) the store
    /// cannot resolve
    pub fn assemble(
        document: Document,
        store: &AssetStore,
        target: Target,
    ) -> Result<Self, RenderError> {
        let mut assets = BTreeMap::new();
        for hash in document.unique_assets() {
            let (Some(meta), Some(data)) = (store.meta(&hash), store.bytes(&hash)) else {
                return Err(RenderError::MissingAsset(hash));
            };
            assets.insert(hash, ResolvedAsset { meta, data });
        }
        Ok(Self {
            document,
            assets,
            target,
        })
    }

    #[inline]
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    #[inline]
    #[must_use]
    pub fn target(&self) -> Target {
        self.target
    }

    /// Resolved assets, sorted by hash
    pub fn assets(&self) -> impl Iterator<Item = &ResolvedAsset> {
        self.assets.values()
    }

    #[must_use]
    pub fn asset(&self, hash: &ContentHash) -> Option<&ResolvedAsset> {
        self.assets.get(hash)
    }

    #[must_use]
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    #[must_use]
    pub fn total_asset_bytes(&self) -> usize {
        self.assets.values().map(|a| a.meta.size).sum()
    }
}

impl AssetResolver for Report {
    fn meta(&self, hash: &ContentHash) -> Option<AssetMeta> {
        self.assets.get(hash).map(|a| a.meta.clone())
    }

    fn bytes(&self, hash: &ContentHash) -> Option<Arc<[u8]>> {
        self.assets.get(hash).map(|a| Arc::clone(&a.data))
    }
}
