//! Job state machine
//!
//! ```text
//! PENDING -> RUNNING -> SUCCEEDED | FAILED | TIMEOUT | CANCELLED
//! PENDING -> CANCELLED
//! RUNNING -> PENDING            (single transient retry)
//! ```

use crate::error::RunnerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Timeout,
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Timeout | Self::Cancelled
        )
    }

    /// Process exit code reported for a terminal status
    #[must_use]
    pub const fn exit_code(self) -> Option<i32> {
        match self {
            Self::Succeeded => Some(0),
            Self::Failed => Some(1),
            Self::Timeout => Some(124),
            Self::Cancelled => Some(130),
            Self::Pending | Self::Running => None,
        }
    }

    /// States reachable from `self` in one step
    #[must_use]
    pub const fn allowed_transitions(self) -> &'static [JobStatus] {
        use JobStatus::{Cancelled, Failed, Pending, Running, Succeeded, Timeout};
        match self {
            Pending => &[Running, Cancelled],
            Running => &[Succeeded, Failed, Timeout, Cancelled, Pending],
            Succeeded | Failed | Timeout | Cancelled => &[],
        }
    }

    #[must_use]
    pub fn can_transition(self, to: JobStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check a status change
///
/// # Errors
/// `RunnerError::IllegalTransition` if `to` is not reachable from `from`
pub fn validate_transition(from: JobStatus, to: JobStatus) -> Result<(), RunnerError> {
    if from.can_transition(to) {
        Ok(())
    } else {
        Err(RunnerError::IllegalTransition { from, to })
    }
}

/// Apply a checked transition to a published status
pub(crate) fn transition(
    status: &watch::Sender<JobStatus>,
    to: JobStatus,
) -> Result<(), RunnerError> {
    let mut result = Ok(());
    status.send_if_modified(|current| match validate_transition(*current, to) {
        Ok(()) => {
            *current = to;
            true
        }
        Err(e) => {
            result = Err(e);
            false
        }
    });
    result
}
