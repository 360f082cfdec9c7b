//! Folio Schema
//!
//! Versioned document schemas and a validator over finalized documents.
//!
//! # Core Concepts
//!
//! - [`Schema`]: per-kind rules (attribute types, required attributes, child
//!   counts, asset references) for one [`SchemaVersion`](folio_block::SchemaVersion)
//! - [`SchemaRegistry`]: append-only, monotonically versioned schema set
//! - [`Validator`]: pure check of a [`Document`](folio_block::Document)
//!   against exactly one version
//!
//! Unknown attribute keys pass through; unknown block kinds never do.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod registry;
mod validator;

pub use error::{RegistryError, ValidationError};
pub use registry::{AttrCheck, AttrRule, KindRule, Schema, SchemaRegistry};
pub use validator::{report, validate, ValidationReport, Validator};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
