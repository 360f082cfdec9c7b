//! Error types for the asset store

use crate::hash::ContentHash;
use std::path::PathBuf;

/// Errors raised while interning, resolving or releasing assets
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    /// Payload could not be produced or read
    #[error("asset unreadable ({origin}): {reason}")]
    Unreadable { origin: String, reason: String },

    /// Payload is too large to inline and no external location is available
    #[error("asset {hash} is {size} bytes (limit {limit}) and has no external target")]
    OversizedWithoutExternalTarget {
        hash: ContentHash,
        size: usize,
        limit: usize,
    },

    /// Hash is not present in the store
    #[error("unknown asset: {0}")]
    UnknownAsset(ContentHash),

    /// Release called on an asset whose ref count is already zero
    #[error("asset {0} has no outstanding references")]
    AlreadyReleased(ContentHash),

    /// Mime type is not of the form `type/subtype`
    #[error("invalid mime type: '{0}'")]
    InvalidMimeType(String),

    /// Tabular payload has an invalid shape
    #[error("invalid table: {0}")]
    InvalidTable(String),
}

impl AssetError {
    /// Build an unreadable-asset error for a file path
    pub fn unreadable_path(path: impl Into<PathBuf>, source: &std::io::Error) -> Self {
        Self::Unreadable {
            origin: path.into().display().to_string(),
            reason: source.to_string(),
        }
    }

    /// Build an unreadable-asset error for a capability adapter
    pub fn unreadable(origin: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unreadable {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }
}
