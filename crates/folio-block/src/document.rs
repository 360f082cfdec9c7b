//! Frozen documents and the context they are finalized with

use crate::block::Block;
use crate::visitor::{walk, BlockVisitor, VisitContext};
use chrono::{DateTime, Timelike, Utc};
use folio_asset::{AssetError, AssetStore, ContentHash};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Document schema version (`major.minor`)
///
/// Ordered; released versions only ever increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    pub major: u16,
    pub minor: u16,
}

impl SchemaVersion {
    /// First released schema: the nine core block kinds
    pub const V1_0: Self = Self::new(1, 0);
    /// Adds `toggle` and `divider`
    pub const V1_1: Self = Self::new(1, 1);
    /// Adds `html`, `code`, `formula`, `bignumber`, `empty` and `datatable`
    pub const V1_2: Self = Self::new(1, 2);
    /// Version new documents are finalized against by default
    pub const CURRENT: Self = Self::V1_2;

    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Malformed `major.minor` string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid schema version: '{0}'")]
pub struct ParseVersionError(pub String);

impl FromStr for SchemaVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseVersionError(s.to_string());
        let (major, minor) = s.split_once('.').ok_or_else(err)?;
        // Reject "+1", "01" and friends so every version has one spelling.
        let canonical = |part: &str| {
            !part.is_empty()
                && part.bytes().all(|b| b.is_ascii_digit())
                && (part == "0" || !part.starts_with('0'))
        };
        if !canonical(major) || !canonical(minor) {
            return Err(err());
        }
        Ok(Self::new(
            major.parse().map_err(|_| err())?,
            minor.parse().map_err(|_| err())?,
        ))
    }
}

impl Serialize for SchemaVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SchemaVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Explicit build context threaded through finalization
///
/// Carries everything that would otherwise come from ambient session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub schema_version: SchemaVersion,
    /// Fixed creation time, for reproducible builds; `None` uses the clock
    pub created_at: Option<DateTime<Utc>>,
    /// Maximum nesting depth, pages included
    pub max_depth: usize,
}

impl Context {
    /// Default maximum nesting depth
    pub const DEFAULT_MAX_DEPTH: usize = 32;

    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: None,
            description: None,
            schema_version: SchemaVersion::CURRENT,
            created_at: None,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }

    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_schema_version(mut self, version: SchemaVersion) -> Self {
        self.schema_version = version;
        self
    }

    #[must_use]
    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Creation timestamp, truncated to whole seconds
    pub(crate) fn timestamp(&self) -> DateTime<Utc> {
        let at = self.created_at.unwrap_or_else(Utc::now);
        at.with_nanosecond(0).unwrap_or(at)
    }
}

/// Finalized, immutable report document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    title: String,
    author: Option<String>,
    description: Option<String>,
    created_at: DateTime<Utc>,
    schema_version: SchemaVersion,
    pages: Vec<Arc<Block>>,
    max_depth: usize,
}

/// Header fields of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub schema_version: SchemaVersion,
}

impl Document {
    /// Assemble a document from parts without checks
    ///
    /// Used by decoders and tests; such documents must be validated before
    /// rendering.
    #[must_use]
    pub fn from_parts(meta: DocumentMeta, pages: Vec<Arc<Block>>) -> Self {
        Self {
            title: meta.title,
            author: meta.author,
            description: meta.description,
            created_at: meta.created_at,
            schema_version: meta.schema_version,
            pages,
            max_depth: Context::DEFAULT_MAX_DEPTH,
        }
    }

    /// Nesting bound the document was finalized under
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Nesting bound checked when the document is validated
    #[inline]
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    #[inline]
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[inline]
    #[must_use]
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[inline]
    #[must_use]
    pub fn schema_version(&self) -> SchemaVersion {
        self.schema_version
    }

    #[inline]
    #[must_use]
    pub fn pages(&self) -> &[Arc<Block>] {
        &self.pages
    }

    /// Header fields, cloned
    #[must_use]
    pub fn meta(&self) -> DocumentMeta {
        DocumentMeta {
            title: self.title.clone(),
            author: self.author.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
            schema_version: self.schema_version,
        }
    }

    /// Total number of blocks, pages included
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.pages.iter().map(|p| p.subtree_len()).sum()
    }

    /// Find a block by id (pre-order, first match)
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&Block> {
        fn search<'a>(blocks: &'a [Arc<Block>], id: &str) -> Option<&'a Block> {
            blocks.iter().find_map(|b| {
                if b.id() == id {
                    Some(b.as_ref())
                } else {
                    search(b.children(), id)
                }
            })
        }
        search(&self.pages, id)
    }

    /// Every asset reference in pre-order, one entry per referencing block
    #[must_use]
    pub fn asset_refs(&self) -> Vec<ContentHash> {
        struct Collect(Vec<ContentHash>);

        impl BlockVisitor for Collect {
            type Error = Infallible;

            fn visit(&mut self, block: &Block, _cx: &VisitContext<'_>) -> Result<(), Infallible> {
                if let Some(hash) = block.asset() {
                    self.0.push(*hash);
                }
                Ok(())
            }
        }

        let mut collect = Collect(Vec::new());
        match walk(&self.pages, &mut collect) {
            Ok(()) | Err(_) => collect.0,
        }
    }

    /// Distinct referenced assets, sorted by hash
    #[must_use]
    pub fn unique_assets(&self) -> BTreeSet<ContentHash> {
        self.asset_refs().into_iter().collect()
    }

    /// Drop this document's hold on its assets
    ///
    /// Releases once per referencing block, mirroring how the assets were
    /// interned. Entries reaching zero become reclaimable.
    ///
    /// # Errors
    /// `AssetError::UnknownAsset` or `AssetError::AlreadyReleased` if the
    /// store does not hold a matching reference
    pub fn release_assets(&self, store: &AssetStore) -> Result<(), AssetError> {
        store.release_all(self.asset_refs())
    }
}
