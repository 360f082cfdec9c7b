//! Job model
//!
//! # Core Concepts
//!
//! - [`JobSpec`]: what a caller writes (TOML or JSON), paths relative to the
//!   spec file
//! - [`RunnerJob`]: a resolved job with an id, ready for the pool
//! - [`EnvironmentDescriptor`]: interpreter and the only variables the
//!   script sees

use crate::config::RunnerConfig;
use crate::error::RunnerError;
use folio_render::Target;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use ulid::Ulid;

/// Unique, time-ordered job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Ulid);

impl JobId {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for JobId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Interpreter and environment for a script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentDescriptor {
    /// Program the script path is passed to
    pub program: String,
    /// Arguments placed before the script path
    pub args: Vec<String>,
    /// Extra variables, set verbatim
    pub vars: BTreeMap<String, String>,
    /// Pass the host `PATH` through so the program can be found
    pub inherit_path: bool,
}

impl Default for EnvironmentDescriptor {
    fn default() -> Self {
        Self {
            program: "sh".to_string(),
            args: Vec::new(),
            vars: BTreeMap::new(),
            inherit_path: true,
        }
    }
}

impl EnvironmentDescriptor {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

/// A job as written by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub script: PathBuf,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub environment: EnvironmentDescriptor,
    pub output_dir: PathBuf,
    /// Directory the script runs in; defaults to the script's directory
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub target: Target,
    /// Artifact file name without extension
    #[serde(default)]
    pub name: Option<String>,
}

impl JobSpec {
    /// Parse a TOML job spec
    ///
    /// # Errors
    /// `RunnerError::Config` on syntax or shape errors
    pub fn from_toml_str(content: &str) -> Result<Self, RunnerError> {
        toml::from_str(content).map_err(|e| RunnerError::Config(e.to_string()))
    }

    /// Parse a JSON job spec
    ///
    /// # Errors
    /// `RunnerError::Config` on syntax or shape errors
    pub fn from_json_str(content: &str) -> Result<Self, RunnerError> {
        serde_json::from_str(content).map_err(|e| RunnerError::Config(e.to_string()))
    }

    /// Load a spec file; `.json` is parsed as JSON, anything else as TOML
    ///
    /// Relative paths in the spec are taken relative to the file.
    ///
    /// # Errors
    /// `RunnerError::Io` if unreadable, `RunnerError::Config` if malformed
    pub fn load(path: &Path) -> Result<Self, RunnerError> {
        let content = std::fs::read_to_string(path).map_err(|e| RunnerError::io(path, e))?;
        let spec = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content)?,
            _ => Self::from_toml_str(&content)?,
        };
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(spec.relative_to(base))
    }

    /// Resolve relative paths against `base`
    #[must_use]
    pub fn relative_to(mut self, base: &Path) -> Self {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.script);
        resolve(&mut self.output_dir);
        if let Some(dir) = self.working_dir.as_mut() {
            resolve(dir);
        }
        self
    }

    /// Resolve into a runnable job
    ///
    /// # Errors
    /// `RunnerError::Config` for parameter keys that cannot become
    /// environment variable names, keys that collide once upper-cased, or
    /// non-scalar parameter values
    pub fn into_job(self, config: &RunnerConfig) -> Result<RunnerJob, RunnerError> {
        let mut parameters = BTreeMap::new();
        for (key, value) in self.parameters {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(RunnerError::Config(format!(
                        "parameter '{key}' must be a scalar, got {other}"
                    )))
                }
            };
            parameters.insert(key, value);
        }

        let mut job = RunnerJob::new(self.script, self.output_dir)
            .with_timeout(
                self.timeout_ms
                    .map_or_else(|| config.default_timeout(), Duration::from_millis),
            )
            .with_environment(self.environment)
            .with_target(self.target);
        for (key, value) in parameters {
            job = job.with_param(key, value);
        }
        if let Some(dir) = self.working_dir {
            job = job.with_working_dir(dir);
        }
        if let Some(name) = self.name {
            job = job.with_name(name);
        }
        job.check()?;
        Ok(job)
    }
}

/// A resolved job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerJob {
    pub id: JobId,
    pub script: PathBuf,
    pub parameters: BTreeMap<String, String>,
    pub timeout: Duration,
    pub environment: EnvironmentDescriptor,
    pub output_dir: PathBuf,
    pub working_dir: Option<PathBuf>,
    pub target: Target,
    pub name: Option<String>,
}

impl RunnerJob {
    /// Default time limit for jobs built in code
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    #[must_use]
    pub fn new(script: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: JobId::new(),
            script: script.into(),
            parameters: BTreeMap::new(),
            timeout: Self::DEFAULT_TIMEOUT,
            environment: EnvironmentDescriptor::default(),
            output_dir: output_dir.into(),
            working_dir: None,
            target: Target::Local,
            name: None,
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: EnvironmentDescriptor) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Directory the script runs in and asset paths resolve against
    #[must_use]
    pub fn working_dir(&self) -> PathBuf {
        match (&self.working_dir, self.script.parent()) {
            (Some(dir), _) => dir.clone(),
            (None, Some(parent)) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Artifact name; the job id when unset
    #[must_use]
    pub fn artifact_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.to_string())
    }

    /// Environment variable carrying parameter `key`
    #[must_use]
    pub fn param_var(key: &str) -> String {
        format!("FOLIO_PARAM_{}", key.to_ascii_uppercase())
    }

    pub(crate) fn check(&self) -> Result<(), RunnerError> {
        let mut vars: BTreeMap<String, &str> = BTreeMap::new();
        for key in self.parameters.keys() {
            let valid = !key.is_empty()
                && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
            if !valid {
                return Err(RunnerError::Config(format!(
                    "parameter key '{key}' is not a valid variable name"
                )));
            }
            // Keys differing only in case share one variable
            if let Some(other) = vars.insert(Self::param_var(key), key) {
                return Err(RunnerError::Config(format!(
                    "parameter keys '{other}' and '{key}' map to the same variable {}",
                    Self::param_var(key)
                )));
            }
        }
        if self.timeout.is_zero() {
            return Err(RunnerError::Config("timeout must be positive".to_string()));
        }
        if let Some(name) = &self.name {
            let valid = !name.is_empty()
                && !name.starts_with('.')
                && !name.contains(['/', '\\']);
            if !valid {
                return Err(RunnerError::Config(format!("invalid artifact name '{name}'")));
            }
        }
        Ok(())
    }
}
