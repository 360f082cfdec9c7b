//! Error types for the runner
//!
//! Every failure a job can hit is a [`RunnerError`]. The pool never lets one
//! escape to the host: it is folded into a [`FailureRecord`](crate::FailureRecord)
//! and the job's terminal status.

use crate::status::JobStatus;
use folio_asset::AssetError;
use folio_block::AuthoringError;
use folio_codec::CodecError;
use folio_render::RenderError;
use folio_schema::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Job or runner failure
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Script exited unsuccessfully or produced unusable output
    #[error("script failed: {message}")]
    ScriptFailure {
        message: String,
        exit_code: Option<i32>,
    },

    /// Script ran past its time limit and was killed
    #[error("job timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Script output refers to a path outside its working directory
    #[error("sandbox violation: {} escapes the working directory", path.display())]
    SandboxViolation { path: PathBuf },

    /// Job was cancelled by its owner
    #[error("job cancelled")]
    Cancelled,

    /// Infrastructure failure unrelated to the script (spawn failure, ...)
    #[error("transient infrastructure failure: {0}")]
    TransientInfra(String),

    /// State machine rejected a status change
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },

    /// Job spec or runner config cannot be used
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem failure at `path`
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Worker task died without reporting
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Authoring(#[from] AuthoringError),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl RunnerError {
    /// Only infrastructure failures are worth a second attempt
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientInfra(_))
    }

    /// Classification carried in failure records
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout(_) => FailureKind::Timeout,
            Self::SandboxViolation { .. } => FailureKind::SandboxViolation,
            Self::Cancelled => FailureKind::Cancelled,
            Self::TransientInfra(_) => FailureKind::TransientInfra,
            Self::Config(_) => FailureKind::Config,
            Self::Io { .. } | Self::Internal(_) | Self::IllegalTransition { .. } => {
                FailureKind::Internal
            }
            Self::ScriptFailure { .. }
            | Self::Authoring(_)
            | Self::Invalid(_)
            | Self::Asset(_)
            | Self::Codec(_)
            | Self::Render(_) => FailureKind::ScriptFailure,
        }
    }

    /// Terminal status a job ends in when it fails with this error
    #[must_use]
    pub fn terminal_status(&self) -> JobStatus {
        match self {
            Self::Timeout(_) => JobStatus::Timeout,
            Self::Cancelled => JobStatus::Cancelled,
            _ => JobStatus::Failed,
        }
    }

    /// Exit code of the script, when it ran to completion
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ScriptFailure { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    pub(crate) fn script(message: impl Into<String>) -> Self {
        Self::ScriptFailure {
            message: message.into(),
            exit_code: None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ScriptFailure,
    Timeout,
    SandboxViolation,
    Cancelled,
    TransientInfra,
    Config,
    Internal,
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ScriptFailure => "script_failure",
            Self::Timeout => "timeout",
            Self::SandboxViolation => "sandbox_violation",
            Self::Cancelled => "cancelled",
            Self::TransientInfra => "transient_infra",
            Self::Config => "config",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
