//! Folio Runner
//!
//! Regenerates reports out of process.
//!
//! # Core Concepts
//!
//! - [`RunnerJob`]: a script, its parameters, time limit, environment and
//!   destination
//! - [`RunnerPool`]: bounded pool driving jobs through the [`JobStatus`]
//!   state machine
//! - [`TreeSpec`]: the JSON a script writes to `FOLIO_OUTPUT`
//! - [`JobOutcome`]: exactly one [`ReportRecord`] or [`FailureRecord`] per job
//!
//! Failures never escape as panics or errors to the host; they end the job
//! in FAILED, TIMEOUT or CANCELLED with a structured record. Only transient
//! infrastructure failures are retried, once.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod config;
mod error;
mod job;
mod pipeline;
mod pool;
mod status;
mod tree_spec;
mod worker;

pub use config::RunnerConfig;
pub use error::{FailureKind, RunnerError};
pub use job::{EnvironmentDescriptor, JobId, JobSpec, RunnerJob};
pub use pipeline::{read_tree, render_tree, stage, Published, Staged};
pub use pool::{FailureRecord, JobHandle, JobOutcome, PoolStats, ReportRecord, RunnerPool};
pub use status::{validate_transition, JobStatus};
pub use tree_spec::{AssetSource, BlockNode, TreeSpec};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
