//! Codec errors

use folio_asset::{AssetError, ContentHash};

/// Failure to encode or decode an interchange document
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Bytes are not a well-formed envelope
    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Envelope names a format this codec does not read
    #[error("unsupported format: '{0}'")]
    UnsupportedFormat(String),

    /// Block type name not known to this codec
    #[error("unknown block type: '{0}'")]
    UnknownBlockType(String),

    /// Referenced asset cannot be resolved
    #[error("missing asset: {0}")]
    MissingAsset(ContentHash),

    /// Asset reference or manifest entry is inconsistent
    #[error("invalid asset reference {hash}: {reason}")]
    InvalidAssetRef { hash: ContentHash, reason: String },

    #[error(transparent)]
    Asset(#[from] AssetError),
}

impl CodecError {
    pub(crate) fn invalid_ref(hash: ContentHash, reason: impl Into<String>) -> Self {
        Self::InvalidAssetRef {
            hash,
            reason: reason.into(),
        }
    }
}
