//! Content-addressed asset store
//!
//! Stores payloads by their [`ContentHash`], enabling:
//! - Deduplication (same bytes = same hash = single entry)
//! - Reference counting per interning call site
//! - Explicit garbage collection of unreferenced payloads
//!
//! All mutation goes through [`AssetStore::intern`], [`AssetStore::retain`],
//! [`AssetStore::release`] and [`AssetStore::collect_garbage`]. The backing
//! map is a [`DashMap`], so concurrent report builds in one process share a
//! store safely; each critical section is a single in-memory map operation.

use crate::capability::{PortableFigure, TabularSource};
use crate::error::AssetError;
use crate::hash::ContentHash;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;

/// Metadata snapshot of a stored asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMeta {
    /// Content hash (the asset id)
    pub hash: ContentHash,
    /// Mime type recorded when the bytes were first interned
    pub mime_type: String,
    /// Payload length in bytes
    pub size: usize,
}

/// Asset with its current reference count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub meta: AssetMeta,
    pub ref_count: usize,
}

#[derive(Debug)]
struct AssetEntry {
    mime_type: String,
    data: Arc<[u8]>,
    ref_count: usize,
}

/// Statistics for store monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of stored payloads
    pub entry_count: usize,
    /// Entries whose ref count dropped to zero, awaiting collection
    pub reclaimable_count: usize,
    /// Total payload bytes held
    pub total_bytes: usize,
}

/// Result of a garbage collection pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub reclaimed: usize,
    pub bytes_freed: usize,
}

/// Content-addressed payload store
#[derive(Debug, Default)]
pub struct AssetStore {
    entries: DashMap<ContentHash, AssetEntry>,
}

impl AssetStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a payload
    ///
    /// Returns the existing hash if binary-equal bytes were seen before
    /// (incrementing its ref count), otherwise stores a copy with ref count 1.
    /// An entry awaiting collection is revived.
    ///
    /// # Errors
    /// `AssetError::InvalidMimeType` if `mime_type` is not `type/subtype`
    pub fn intern(
        &self,
        bytes: impl AsRef<[u8]>,
        mime_type: impl AsRef<str>,
    ) -> Result<ContentHash, AssetError> {
        let bytes = bytes.as_ref();
        let mime_type = mime_type.as_ref();
        validate_mime(mime_type)?;

        // Hash outside the critical section.
        let hash = ContentHash::compute(bytes);

        match self.entries.entry(hash) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.ref_count += 1;
                if entry.mime_type != mime_type {
                    tracing::debug!(
                        asset = %hash.short(),
                        kept = %entry.mime_type,
                        ignored = %mime_type,
                        "identical bytes interned under a different mime type"
                    );
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(AssetEntry {
                    mime_type: mime_type.to_string(),
                    data: Arc::from(bytes),
                    ref_count: 1,
                });
                tracing::trace!(asset = %hash.short(), size = bytes.len(), "asset stored");
            }
        }

        Ok(hash)
    }

    /// Intern the portable spec of a plotting-library figure
    ///
    /// # Errors
    /// `AssetError::Unreadable` if the adapter fails to export the figure
    pub fn intern_figure(&self, figure: &dyn PortableFigure) -> Result<ContentHash, AssetError> {
        let spec = figure
            .to_portable_spec()
            .map_err(|e| AssetError::unreadable(format!("figure:{}", figure.library()), e))?;
        self.intern(spec, figure.mime_type())
    }

    /// Intern a tabular payload
    ///
    /// # Errors
    /// `AssetError::Unreadable` if the source cannot be exported,
    /// `AssetError::InvalidTable` if it has no columns
    pub fn intern_table(&self, table: &dyn TabularSource) -> Result<ContentHash, AssetError> {
        if table.column_count() == 0 {
            return Err(AssetError::InvalidTable("table has no columns".to_string()));
        }
        let payload = table
            .to_portable_table()
            .map_err(|e| AssetError::unreadable("table", e))?;
        self.intern(payload, table.mime_type())
    }

    /// Read a file and intern its bytes
    ///
    /// # Errors
    /// `AssetError::Unreadable` if the file cannot be read
    pub fn intern_file(
        &self,
        path: impl AsRef<Path>,
        mime_type: impl AsRef<str>,
    ) -> Result<ContentHash, AssetError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| AssetError::unreadable_path(path, &e))?;
        self.intern(bytes, mime_type)
    }

    /// Drop one reference
    ///
    /// Returns the remaining ref count. At zero the payload stays resolvable
    /// until the next [`collect_garbage`](Self::collect_garbage).
    ///
    /// # Errors
    /// - `AssetError::UnknownAsset` if the hash is not stored
    /// - `AssetError::AlreadyReleased` if the count is already zero
    pub fn release(&self, hash: &ContentHash) -> Result<usize, AssetError> {
        let mut entry = self
            .entries
            .get_mut(hash)
            .ok_or(AssetError::UnknownAsset(*hash))?;
        if entry.ref_count == 0 {
            return Err(AssetError::AlreadyReleased(*hash));
        }
        entry.ref_count -= 1;
        Ok(entry.ref_count)
    }

    /// Take one more reference on a stored asset
    ///
    /// Used when a document shares blocks it did not intern itself. An entry
    /// awaiting collection is revived.
    ///
    /// # Errors
    /// `AssetError::UnknownAsset` if the hash is not stored
    pub fn retain(&self, hash: &ContentHash) -> Result<usize, AssetError> {
        let mut entry = self
            .entries
            .get_mut(hash)
            .ok_or(AssetError::UnknownAsset(*hash))?;
        entry.ref_count += 1;
        Ok(entry.ref_count)
    }

    /// Retain one reference for every hash yielded
    ///
    /// All or nothing: on failure the references already taken are dropped
    /// again.
    ///
    /// # Errors
    /// Propagates the first [`retain`](Self::retain) failure
    pub fn retain_all<I>(&self, hashes: I) -> Result<(), AssetError>
    where
        I: IntoIterator<Item = ContentHash>,
    {
        let mut taken = Vec::new();
        for hash in hashes {
            if let Err(err) = self.retain(&hash) {
                for done in &taken {
                    if self.release(done).is_err() {
                        tracing::warn!(asset = %done.short(), "retained asset could not be rolled back");
                    }
                }
                return Err(err);
            }
            taken.push(hash);
        }
        Ok(())
    }

    /// Release one reference for every hash yielded
    ///
    /// Used when a document is discarded. All or nothing: on failure the
    /// references already dropped are restored.
    ///
    /// # Errors
    /// Propagates the first [`release`](Self::release) failure
    pub fn release_all<I>(&self, hashes: I) -> Result<(), AssetError>
    where
        I: IntoIterator<Item = ContentHash>,
    {
        let mut released = Vec::new();
        for hash in hashes {
            if let Err(err) = self.release(&hash) {
                for done in &released {
                    if self.retain(done).is_err() {
                        tracing::warn!(
                            asset = %done.short(),
                            "asset collected before its release could be rolled back"
                        );
                    }
                }
                return Err(err);
            }
            released.push(hash);
        }
        Ok(())
    }

    /// Reclaim every entry whose ref count is zero
    pub fn collect_garbage(&self) -> GcStats {
        let mut stats = GcStats::default();
        self.entries.retain(|_, entry| {
            if entry.ref_count == 0 {
                stats.reclaimed += 1;
                stats.bytes_freed += entry.data.len();
                false
            } else {
                true
            }
        });
        if stats.reclaimed > 0 {
            tracing::debug!(
                reclaimed = stats.reclaimed,
                bytes = stats.bytes_freed,
                "asset store garbage collected"
            );
        }
        stats
    }

    /// Metadata for a stored asset
    #[must_use]
    pub fn meta(&self, hash: &ContentHash) -> Option<AssetMeta> {
        self.entries.get(hash).map(|entry| AssetMeta {
            hash: *hash,
            mime_type: entry.mime_type.clone(),
            size: entry.data.len(),
        })
    }

    /// Metadata plus ref count
    #[must_use]
    pub fn get(&self, hash: &ContentHash) -> Option<Asset> {
        self.entries.get(hash).map(|entry| Asset {
            meta: AssetMeta {
                hash: *hash,
                mime_type: entry.mime_type.clone(),
                size: entry.data.len(),
            },
            ref_count: entry.ref_count,
        })
    }

    /// Payload bytes (cheap `Arc` clone)
    #[must_use]
    pub fn bytes(&self, hash: &ContentHash) -> Option<Arc<[u8]>> {
        self.entries.get(hash).map(|entry| Arc::clone(&entry.data))
    }

    /// Current ref count
    #[must_use]
    pub fn ref_count(&self, hash: &ContentHash) -> Option<usize> {
        self.entries.get(hash).map(|entry| entry.ref_count)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.entries.contains_key(hash)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store statistics
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.entries
            .iter()
            .fold(StoreStats::default(), |mut stats, entry| {
                stats.entry_count += 1;
                stats.total_bytes += entry.data.len();
                if entry.ref_count == 0 {
                    stats.reclaimable_count += 1;
                }
                stats
            })
    }
}

fn validate_mime(mime_type: &str) -> Result<(), AssetError> {
    match mime_type.split_once('/') {
        Some((kind, sub))
            if !kind.is_empty()
                && !sub.is_empty()
                && !mime_type.contains(char::is_whitespace) =>
        {
            Ok(())
        }
        _ => Err(AssetError::InvalidMimeType(mime_type.to_string())),
    }
}
