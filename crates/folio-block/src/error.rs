//! Authoring errors
//!
//! Raised synchronously to the host code that is building a tree. A failed
//! edit leaves the builder unchanged.

use crate::kind::BlockKind;

/// Malformed tree edit or finalization failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthoringError {
    /// Handle does not belong to this builder
    #[error("unknown block handle")]
    UnknownHandle,

    /// Children attached to a kind that cannot hold them
    #[error("{kind} blocks cannot have children")]
    LeafCannotHaveChildren { kind: BlockKind },

    /// Edge would make a block its own ancestor
    #[error("attaching this block would create a cycle")]
    Cycle,

    /// Block already has a parent in this tree
    #[error("block is already attached to a parent")]
    AlreadyAttached,

    /// Tree deeper than the configured bound
    #[error("tree depth exceeds maximum of {max}")]
    DepthExceeded { max: usize },

    /// Container child count outside what its kind allows
    #[error("{kind} block '{id}' {detail}")]
    Arity {
        kind: BlockKind,
        id: String,
        detail: String,
    },

    /// Two blocks share one id
    #[error("duplicate block id: '{0}'")]
    DuplicateId(String),

    /// User-supplied id does not match the id grammar
    #[error("invalid block id: '{0}'")]
    InvalidId(String),

    /// Attribute value cannot be represented canonically
    #[error("invalid attribute '{key}': {reason}")]
    InvalidAttribute { key: String, reason: String },

    /// Finalize called with no roots
    #[error("document has no blocks")]
    EmptyDocument,

    /// Roots mix pages with loose blocks
    #[error("top-level blocks must be all pages or no pages")]
    MixedRoots,

    /// Shared subtree references an asset the store cannot retain
    #[error("shared subtree asset unavailable: {0}")]
    SharedAsset(String),

    /// Block passed as a root already has a parent
    #[error("block '{0}' is attached to a parent and cannot be a root")]
    NotARoot(String),
}
