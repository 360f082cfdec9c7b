//! Validation and registry errors

use folio_block::{AttrType, BlockKind, SchemaVersion};

/// Reason a document does not conform to a schema
///
/// Every variant names the offending block where there is one, so a report
/// can point the author at it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Block kind not part of the schema version
    #[error("block '{id}': type '{kind}' is not defined in schema {version}")]
    UnknownBlockType {
        id: String,
        kind: BlockKind,
        version: SchemaVersion,
    },

    /// Block sits where its kind is not allowed, or has the wrong number of
    /// children
    #[error("block '{id}': {detail}")]
    NestingViolation { id: String, detail: String },

    /// Known attribute holds a value of the wrong type
    #[error("block '{id}': attribute '{key}' must be {expected}, found {found}")]
    AttributeTypeMismatch {
        id: String,
        key: String,
        expected: AttrType,
        found: AttrType,
    },

    /// Version not registered, or not the version the document declares
    #[error("schema version {version} unsupported: {detail}")]
    SchemaVersionUnsupported {
        version: SchemaVersion,
        detail: String,
    },

    /// Document holds no pages
    #[error("document has no pages")]
    EmptyDocument,

    #[error("duplicate block id: '{0}'")]
    DuplicateBlockId(String),

    #[error("invalid block id: '{0}'")]
    InvalidBlockId(String),

    /// Required attribute absent
    #[error("block '{id}': missing required attribute '{key}'")]
    MissingAttribute { id: String, key: String },

    /// Attribute has the right type but an unacceptable value
    #[error("block '{id}': attribute '{key}' {reason}")]
    InvalidAttribute {
        id: String,
        key: String,
        reason: String,
    },

    /// Asset-bearing block without an asset reference
    #[error("block '{id}': missing asset reference")]
    MissingAssetRef { id: String },

    /// Asset reference on a kind that does not carry assets
    #[error("block '{id}': {kind} blocks cannot reference assets")]
    UnexpectedAssetRef { id: String, kind: BlockKind },

    /// Nesting deeper than the validator allows
    #[error("block '{id}': nesting exceeds maximum depth of {max}")]
    DepthExceeded { id: String, max: usize },
}

impl ValidationError {
    /// Stable machine-readable reason code
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::UnknownBlockType { .. } => "unknown_block_type",
            Self::NestingViolation { .. } => "nesting_violation",
            Self::AttributeTypeMismatch { .. } => "attribute_type_mismatch",
            Self::SchemaVersionUnsupported { .. } => "schema_version_unsupported",
            Self::EmptyDocument => "empty_document",
            Self::DuplicateBlockId(_) => "duplicate_block_id",
            Self::InvalidBlockId(_) => "invalid_block_id",
            Self::MissingAttribute { .. } => "missing_attribute",
            Self::InvalidAttribute { .. } => "invalid_attribute",
            Self::MissingAssetRef { .. } => "missing_asset_ref",
            Self::UnexpectedAssetRef { .. } => "unexpected_asset_ref",
            Self::DepthExceeded { .. } => "depth_exceeded",
        }
    }

    /// Id of the offending block, if the violation is tied to one
    #[must_use]
    pub fn block_id(&self) -> Option<&str> {
        match self {
            Self::UnknownBlockType { id, .. }
            | Self::NestingViolation { id, .. }
            | Self::AttributeTypeMismatch { id, .. }
            | Self::MissingAttribute { id, .. }
            | Self::InvalidAttribute { id, .. }
            | Self::MissingAssetRef { id }
            | Self::UnexpectedAssetRef { id, .. }
            | Self::DepthExceeded { id, .. } => Some(id),
            Self::DuplicateBlockId(id) | Self::InvalidBlockId(id) => Some(id),
            Self::SchemaVersionUnsupported { .. } | Self::EmptyDocument => None,
        }
    }
}

/// Registry misuse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// New schemas must be newer than every registered one
    #[error("schema {version} is not newer than latest registered {latest}")]
    NotMonotonic {
        version: SchemaVersion,
        latest: SchemaVersion,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_stable() {
        let err = ValidationError::NestingViolation {
            id: "select-1".to_string(),
            detail: "select requires at least 1 child, found 0".to_string(),
        };
        assert_eq!(err.reason(), "nesting_violation");
        assert_eq!(err.block_id(), Some("select-1"));
        assert_eq!(
            err.to_string(),
            "block 'select-1': select requires at least 1 child, found 0"
        );
        assert_eq!(ValidationError::EmptyDocument.block_id(), None);
    }
}
