//! Render errors

use crate::report::Target;
use folio_asset::{AssetError, ContentHash};
use folio_block::SchemaVersion;
use folio_codec::CodecError;
use folio_schema::ValidationError;
use std::path::PathBuf;

/// Failure to assemble, render or publish a report
///
/// Nothing is written to the destination when rendering fails.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Template lacks a placeholder, or names one the renderer does not fill
    #[error("template failure: {0}")]
    TemplateFailure(String),

    /// Document references an asset the store does not hold
    #[error("missing asset: {0}")]
    MissingAsset(ContentHash),

    /// Target cannot display documents of this schema version
    #[error("{target} target does not support schema {version}")]
    UnsupportedSchema {
        version: SchemaVersion,
        target: Target,
    },

    /// Document fails validation for its declared version
    #[error("invalid document: {0}")]
    Invalid(#[from] ValidationError),

    /// Filesystem failure at `path`
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Attachment path is absolute or climbs out of the upload root
    #[error("unsafe attachment path: '{0}'")]
    UnsafePath(String),

    /// Embedded artifact is malformed
    #[error("malformed artifact: {0}")]
    Malformed(String),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl RenderError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
