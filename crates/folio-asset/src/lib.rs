//! Folio Asset Store
//!
//! Content-addressed storage for the binary and tabular payloads referenced by
//! report blocks.
//!
//! # Core Concepts
//!
//! - [`ContentHash`]: 32-byte Blake3 hash, the identity of an asset
//! - [`AssetStore`]: concurrent, reference-counted, deduplicating store
//! - [`PortableFigure`] / [`TabularSource`]: capabilities through which host
//!   libraries hand payloads to the store
//!
//! # Example
//!
//! ```rust
//! use folio_asset::AssetStore;
//!
//! let store = AssetStore::new();
//! let a = store.intern(b"col\n1\n", "text/csv").unwrap();
//! let b = store.intern(b"col\n1\n", "text/csv").unwrap();
//! assert_eq!(a, b);
//! assert_eq!(store.ref_count(&a), Some(2));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod capability;
mod error;
mod hash;
mod store;

pub use capability::{
    CapabilityError, Dataset, PortableFigure, TabularSource, FIGURE_MIME, TABLE_MIME,
};
pub use error::AssetError;
pub use hash::{ContentHash, HashError};
pub use store::{Asset, AssetMeta, AssetStore, GcStats, StoreStats};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
