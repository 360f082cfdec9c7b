//! Folio Block Tree
//!
//! Authoring model for report documents.
//!
//! # Core Concepts
//!
//! - [`BlockKind`]: closed set of block types with capability checks
//! - [`TreeBuilder`]: arena builder rejecting cycles, double parents and
//!   over-deep nesting at edit time
//! - [`Document`]: frozen result of [`TreeBuilder::finalize`], built against
//!   an explicit [`Context`]
//! - [`BlockVisitor`] / [`walk`]: pre-order traversal used by the validator
//!   and serializer
//!
//! Finalized blocks are `Arc`-shared, so subtrees can be reused across
//! documents without copying.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod block;
mod builder;
mod document;
mod error;
mod kind;
mod visitor;

pub use block::{is_valid_block_id, AttrType, AttrValue, Attributes, Block, BlockSpec};
pub use builder::{BlockHandle, TreeBuilder};
pub use document::{Context, Document, DocumentMeta, ParseVersionError, SchemaVersion};
pub use error::AuthoringError;
pub use kind::{BlockKind, UnknownKind};
pub use visitor::{walk, BlockVisitor, VisitContext};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
