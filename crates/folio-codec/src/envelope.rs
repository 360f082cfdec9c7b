//! Wire shapes of the interchange document
//!
//! Field order in these structs is the key order on the wire.

use chrono::{DateTime, Utc};
use folio_asset::ContentHash;
use folio_block::{Attributes, SchemaVersion};
use serde::{Deserialize, Serialize};

/// Value of the envelope's `format` field
pub const FORMAT: &str = "folio.document";

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Envelope {
    pub(crate) format: String,
    pub(crate) version: SchemaVersion,
    pub(crate) document: DocumentRepr,
    pub(crate) manifest: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DocumentRepr {
    pub(crate) title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) description: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) pages: Vec<BlockRepr>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct BlockRepr {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    pub(crate) id: String,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub(crate) attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) asset: Option<AssetRefRepr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) children: Vec<BlockRepr>,
}

/// Asset reference on a block; `data` appears on the first reference to an
/// inline asset only
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AssetRefRepr {
    #[serde(rename = "ref")]
    pub(crate) hash: ContentHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) data: Option<String>,
}

/// Manifest record for one distinct asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub hash: ContentHash,
    pub mime_type: String,
    pub size: usize,
    pub location: AssetLocation,
}

/// Where an asset's bytes live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AssetLocation {
    /// Base64 payload carried in the document
    Inline,
    /// Stored outside the document at `path`
    External { path: String },
}

impl AssetLocation {
    #[inline]
    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline)
    }

    /// External path, if any
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Inline => None,
            Self::External { path } => Some(path),
        }
    }
}
