//! Folio Codec
//!
//! Canonical interchange encoding for finalized documents.
//!
//! # Wire Format
//!
//! Compact JSON: an envelope with `format`, `version`, `document` and a
//! `manifest` of distinct assets sorted by hash. Small assets travel inline
//! as base64 on their first reference; larger ones are external references
//! under a configured prefix.
//!
//! # Guarantees
//!
//! - `deserialize(serialize(d)) == d`
//! - `serialize(decode(b).document(), &decode(b))` reproduces `b` under the
//!   same [`CodecOptions`]
//! - equal documents encode to equal bytes

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod codec;
mod envelope;
mod error;
mod resolver;

pub use codec::{
    decode, deserialize, document_digest, encode, serialize, CodecOptions, Decoded, Encoded,
};
pub use envelope::{AssetLocation, ManifestEntry, FORMAT};
pub use error::CodecError;
pub use resolver::AssetResolver;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
