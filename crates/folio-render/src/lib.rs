//! Folio Renderer
//!
//! Produces the terminal artifact of a report build.
//!
//! # Targets
//!
//! - LOCAL: one self-contained HTML file with the document, every asset and
//!   the viewer embedded; opens without network access
//! - CLOUD: an [`UploadPayload`] (document, manifest, attachments) handed to
//!   an [`UploadTransport`]
//!
//! Each target carries a [`TargetProfile`] listing the schema versions it can
//! display; documents outside it are rejected before anything is written.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod cloud;
mod error;
mod local;
mod renderer;
mod report;

pub use cloud::{Attachment, DirectoryTransport, UploadPayload, UploadReceipt, UploadTransport};
pub use error::RenderError;
pub use local::{check_template, extract_assets, extract_document, PLACEHOLDERS};
pub use renderer::{Artifact, LocalArtifact, LocalPage, RenderOptions, RenderRequest, Renderer};
pub use report::{ResolvedAsset, Report, Target, TargetProfile};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
