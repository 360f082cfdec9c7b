//! Canonical encoder and decoder
//!
//! Output is compact JSON with a fixed key order, attributes sorted by key
//! and the manifest sorted by hash, so one document always encodes to the
//! same bytes regardless of how it was authored.

use crate::envelope::{
    AssetLocation, AssetRefRepr, BlockRepr, DocumentRepr, Envelope, ManifestEntry, FORMAT,
};
use crate::error::CodecError;
use crate::resolver::AssetResolver;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use folio_asset::{AssetError, AssetMeta, ContentHash};
use folio_block::{Block, BlockKind, Document, DocumentMeta};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Encoder settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecOptions {
    /// Assets strictly smaller than this are inlined as base64
    pub inline_threshold: usize,
    /// Prefix for external asset paths; `None` forbids external assets
    pub external_prefix: Option<String>,
}

impl CodecOptions {
    /// Default inline threshold (256 KiB)
    pub const DEFAULT_INLINE_THRESHOLD: usize = 256 * 1024;

    #[must_use]
    pub fn with_inline_threshold(mut self, bytes: usize) -> Self {
        self.inline_threshold = bytes;
        self
    }

    #[must_use]
    pub fn with_external_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.external_prefix = Some(prefix.into());
        self
    }
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            inline_threshold: Self::DEFAULT_INLINE_THRESHOLD,
            external_prefix: None,
        }
    }
}

/// Encoded document with its manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub manifest: Vec<ManifestEntry>,
}

impl Encoded {
    /// Manifest entries stored outside the document
    pub fn external(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.manifest.iter().filter(|e| !e.location.is_inline())
    }
}

/// Encode `document`, returning bytes and manifest
///
/// # Errors
/// - `CodecError::MissingAsset` if the resolver lacks a referenced asset
/// - `CodecError::Asset(OversizedWithoutExternalTarget)` if an asset is at
///   or above the inline threshold and no external prefix is set
/// - `CodecError::Malformed` if JSON encoding fails
pub fn encode(
    document: &Document,
    resolver: &dyn AssetResolver,
    options: &CodecOptions,
) -> Result<Encoded, CodecError> {
    let mut encoder = Encoder {
        resolver,
        options,
        manifest: BTreeMap::new(),
    };
    let pages = document
        .pages()
        .iter()
        .map(|page| encoder.block(page))
        .collect::<Result<Vec<_>, _>>()?;

    let manifest: Vec<ManifestEntry> = encoder.manifest.into_values().collect();
    let envelope = Envelope {
        format: FORMAT.to_string(),
        version: document.schema_version(),
        document: DocumentRepr {
            title: document.title().to_string(),
            author: document.author().map(str::to_string),
            description: document.description().map(str::to_string),
            created_at: document.created_at(),
            pages,
        },
        manifest,
    };
    let bytes = serde_json::to_vec(&envelope)?;

    tracing::debug!(
        size = bytes.len(),
        assets = envelope.manifest.len(),
        "encoded document"
    );
    Ok(Encoded {
        bytes,
        manifest: envelope.manifest,
    })
}

/// Encode `document` to canonical bytes
///
/// # Errors
/// See [`encode`]
pub fn serialize(
    document: &Document,
    resolver: &dyn AssetResolver,
    options: &CodecOptions,
) -> Result<Vec<u8>, CodecError> {
    encode(document, resolver, options).map(|encoded| encoded.bytes)
}

/// Decode bytes produced by [`serialize`] back into a document
///
/// # Errors
/// See [`decode`]
pub fn deserialize(bytes: &[u8]) -> Result<Document, CodecError> {
    decode(bytes).map(Decoded::into_document)
}

/// Blake3 digest of encoded bytes, usable as a cache key
#[must_use]
pub fn document_digest(bytes: &[u8]) -> ContentHash {
    ContentHash::compute(bytes)
}

/// Decoded document with its manifest and verified inline payloads
#[derive(Debug, Clone)]
pub struct Decoded {
    document: Document,
    manifest: Vec<ManifestEntry>,
    payloads: HashMap<ContentHash, Arc<[u8]>>,
}

impl Decoded {
    #[inline]
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    #[must_use]
    pub fn into_document(self) -> Document {
        self.document
    }

    #[inline]
    #[must_use]
    pub fn manifest(&self) -> &[ManifestEntry] {
        &self.manifest
    }

    /// Inline payload for `hash`
    #[must_use]
    pub fn payload(&self, hash: &ContentHash) -> Option<&[u8]> {
        self.payloads.get(hash).map(|p| &p[..])
    }

    fn entry(&self, hash: &ContentHash) -> Option<&ManifestEntry> {
        self.manifest
            .binary_search_by(|e| e.hash.cmp(hash))
            .ok()
            .map(|i| &self.manifest[i])
    }
}

impl AssetResolver for Decoded {
    fn meta(&self, hash: &ContentHash) -> Option<AssetMeta> {
        self.entry(hash).map(|e| AssetMeta {
            hash: e.hash,
            mime_type: e.mime_type.clone(),
            size: e.size,
        })
    }

    fn bytes(&self, hash: &ContentHash) -> Option<Arc<[u8]>> {
        self.payloads.get(hash).cloned()
    }
}

/// Decode an interchange document
///
/// Inline payloads are base64-decoded and checked against their hash and
/// recorded size.
///
/// # Errors
/// - `CodecError::Malformed` for invalid JSON or missing fields
/// - `CodecError::UnsupportedFormat` if `format` is not `folio.document`
/// - `CodecError::UnknownBlockType` for unrecognised block types
/// - `CodecError::InvalidAssetRef` for references missing from the manifest,
///   duplicate or unsorted manifest entries, or inline assets without data
/// - `CodecError::Asset(Unreadable)` if inline data is corrupt
pub fn decode(bytes: &[u8]) -> Result<Decoded, CodecError> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    if envelope.format != FORMAT {
        return Err(CodecError::UnsupportedFormat(envelope.format));
    }
    for pair in envelope.manifest.windows(2) {
        if pair[0].hash >= pair[1].hash {
            return Err(CodecError::invalid_ref(
                pair[1].hash,
                "manifest entries must be unique and sorted by hash",
            ));
        }
    }

    let mut decoder = Decoder {
        manifest: &envelope.manifest,
        payloads: HashMap::new(),
    };
    let pages = envelope
        .document
        .pages
        .into_iter()
        .map(|page| decoder.block(page))
        .collect::<Result<Vec<_>, _>>()?;
    let payloads = decoder.payloads;

    if let Some(entry) = envelope
        .manifest
        .iter()
        .find(|e| e.location.is_inline() && !payloads.contains_key(&e.hash))
    {
        return Err(CodecError::invalid_ref(entry.hash, "inline asset has no data"));
    }

    let meta = DocumentMeta {
        title: envelope.document.title,
        author: envelope.document.author,
        description: envelope.document.description,
        created_at: envelope.document.created_at,
        schema_version: envelope.version,
    };
    Ok(Decoded {
        document: Document::from_parts(meta, pages),
        manifest: envelope.manifest,
        payloads,
    })
}

struct Encoder<'a> {
    resolver: &'a dyn AssetResolver,
    options: &'a CodecOptions,
    manifest: BTreeMap<ContentHash, ManifestEntry>,
}

impl Encoder<'_> {
    fn block(&mut self, block: &Block) -> Result<BlockRepr, CodecError> {
        // Pre-order: the block's own asset is registered before its children's.
        let asset = block.asset().map(|hash| self.asset(*hash)).transpose()?;
        let children = block
            .children()
            .iter()
            .map(|child| self.block(child))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BlockRepr {
            kind: block.kind().as_str().to_string(),
            id: block.id().to_string(),
            attributes: block.attributes().clone(),
            caption: block.caption().map(str::to_string),
            asset,
            children,
        })
    }

    fn asset(&mut self, hash: ContentHash) -> Result<AssetRefRepr, CodecError> {
        if self.manifest.contains_key(&hash) {
            return Ok(AssetRefRepr { hash, data: None });
        }

        let meta = self
            .resolver
            .meta(&hash)
            .ok_or(CodecError::MissingAsset(hash))?;
        let threshold = self.options.inline_threshold;

        let (location, data) = if meta.size < threshold {
            let bytes = self
                .resolver
                .bytes(&hash)
                .ok_or(CodecError::MissingAsset(hash))?;
            (AssetLocation::Inline, Some(STANDARD.encode(&bytes)))
        } else {
            let prefix = self.options.external_prefix.as_deref().ok_or(
                AssetError::OversizedWithoutExternalTarget {
                    hash,
                    size: meta.size,
                    limit: threshold,
                },
            )?;
            let path = format!("{prefix}{hash}");
            (AssetLocation::External { path }, None)
        };

        self.manifest.insert(
            hash,
            ManifestEntry {
                hash,
                mime_type: meta.mime_type,
                size: meta.size,
                location,
            },
        );
        Ok(AssetRefRepr { hash, data })
    }
}

struct Decoder<'a> {
    manifest: &'a [ManifestEntry],
    payloads: HashMap<ContentHash, Arc<[u8]>>,
}

impl Decoder<'_> {
    fn block(&mut self, repr: BlockRepr) -> Result<Arc<Block>, CodecError> {
        let kind: BlockKind = repr
            .kind
            .parse()
            .map_err(|_| CodecError::UnknownBlockType(repr.kind.clone()))?;
        let asset = repr.asset.map(|r| self.asset(r)).transpose()?;
        let children = repr
            .children
            .into_iter()
            .map(|child| self.block(child))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Arc::new(Block::from_parts(
            kind,
            repr.id,
            repr.attributes,
            repr.caption,
            asset,
            children,
        )))
    }

    fn asset(&mut self, repr: AssetRefRepr) -> Result<ContentHash, CodecError> {
        let hash = repr.hash;
        let entry = self
            .manifest
            .binary_search_by(|e| e.hash.cmp(&hash))
            .map(|i| &self.manifest[i])
            .map_err(|_| CodecError::invalid_ref(hash, "not listed in manifest"))?;

        let Some(data) = repr.data else {
            return Ok(hash);
        };
        if !entry.location.is_inline() {
            return Err(CodecError::invalid_ref(hash, "external asset carries inline data"));
        }
        if self.payloads.contains_key(&hash) {
            return Err(CodecError::invalid_ref(hash, "inline data repeated"));
        }

        let origin = format!("inline asset {}", hash.short());
        let bytes = STANDARD
            .decode(data)
            .map_err(|e| AssetError::unreadable(origin.clone(), e))?;
        if ContentHash::compute(&bytes) != hash {
            return Err(AssetError::unreadable(origin, "content does not match hash").into());
        }
        if bytes.len() != entry.size {
            return Err(CodecError::invalid_ref(
                hash,
                format!("size {} does not match manifest size {}", bytes.len(), entry.size),
            ));
        }
        self.payloads.insert(hash, Arc::from(bytes));
        Ok(hash)
    }
}
