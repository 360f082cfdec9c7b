//! Asset lookup during encoding

use folio_asset::{AssetMeta, AssetStore, ContentHash};
use std::sync::Arc;

/// Source of asset metadata and payloads for the encoder
///
/// Implemented by the live [`AssetStore`] and by
/// [`Decoded`](crate::Decoded), which lets a decoded document be encoded
/// again byte for byte.
pub trait AssetResolver {
    /// Metadata for `hash`
    fn meta(&self, hash: &ContentHash) -> Option<AssetMeta>;

    /// Payload for `hash`, if the resolver holds it
    fn bytes(&self, hash: &ContentHash) -> Option<Arc<[u8]>>;
}

impl AssetResolver for AssetStore {
    fn meta(&self, hash: &ContentHash) -> Option<AssetMeta> {
        AssetStore::meta(self, hash)
    }

    fn bytes(&self, hash: &ContentHash) -> Option<Arc<[u8]>> {
        AssetStore::bytes(self, hash)
    }
}
