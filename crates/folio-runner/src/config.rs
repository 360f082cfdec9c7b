//! Runner configuration
//!
//! Loaded from TOML; every field has a default so a partial file works.
//!
//! ```toml
//! workers = 4
//! default_timeout_ms = 300000
//! retry_backoff_ms = 500
//!
//! [render]
//! local_embed_limit = 26214400
//! ```

use crate::error::RunnerError;
use folio_render::RenderOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Pool and pipeline settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Jobs allowed in RUNNING at once
    pub workers: usize,
    /// Time limit for jobs that do not set their own
    pub default_timeout_ms: u64,
    /// Pause before the single retry of a transient failure
    pub retry_backoff_ms: u64,
    /// Captured stdout/stderr kept per stream in failure records
    pub max_captured_output: usize,
    pub render: RenderOptions,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            default_timeout_ms: 5 * 60 * 1000,
            retry_backoff_ms: 500,
            max_captured_output: 64 * 1024,
            render: RenderOptions::default(),
        }
    }
}

impl RunnerConfig {
    /// Parse TOML
    ///
    /// # Errors
    /// `RunnerError::Config` for syntax errors or zero workers
    pub fn from_toml_str(content: &str) -> Result<Self, RunnerError> {
        let config: Self =
            toml::from_str(content).map_err(|e| RunnerError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// `RunnerError::Io` if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str)
    pub fn load(path: &Path) -> Result<Self, RunnerError> {
        let content = std::fs::read_to_string(path).map_err(|e| RunnerError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = duration_ms(timeout);
        self
    }

    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_ms = duration_ms(backoff);
        self
    }

    #[must_use]
    pub fn with_render(mut self, render: RenderOptions) -> Self {
        self.render = render;
        self
    }

    #[inline]
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    #[inline]
    #[must_use]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    fn check(&self) -> Result<(), RunnerError> {
        if self.workers == 0 {
            return Err(RunnerError::Config("workers must be at least 1".to_string()));
        }
        Ok(())
    }
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
