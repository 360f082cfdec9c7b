//! Bounded job pool
//!
//! Jobs are queued as tokio tasks; a semaphore admits at most `workers` of
//! them to RUNNING. Every job ends in exactly one [`JobOutcome`]: a report
//! record or a failure record, never both.

use crate::config::{duration_ms, RunnerConfig};
use crate::error::{FailureKind, RunnerError};
use crate::job::{JobId, RunnerJob};
use crate::pipeline::{self, Published};
use crate::status::{transition, JobStatus};
use crate::worker;
use folio_asset::ContentHash;
use folio_render::{RenderRequest, Renderer, Target};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

/// Successful job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRecord {
    pub job_id: JobId,
    pub target: Target,
    pub location: String,
    pub digest: ContentHash,
    pub blocks: usize,
    pub assets: usize,
    pub duration_ms: u64,
    pub stdout: String,
    pub stderr: String,
}

/// Failed, timed out or cancelled job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    pub kind: FailureKind,
    pub message: String,
    pub stdout: String,
    pub stderr: String,
    /// Script exit code, when it ran to completion
    pub exit_code: Option<i32>,
    /// Spawn attempts made
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Result of one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded(ReportRecord),
    Failed(FailureRecord),
}

impl JobOutcome {
    #[must_use]
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Succeeded(_) => JobStatus::Succeeded,
            Self::Failed(record) => record.status,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    /// Process exit code for this outcome
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.status().exit_code().unwrap_or(1)
    }
}

/// Caller's view of a submitted job
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    status: watch::Receiver<JobStatus>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<JobOutcome>,
}

impl JobHandle {
    #[inline]
    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    /// Receiver for status changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status.clone()
    }

    /// Request cancellation
    ///
    /// A pending job never starts; a running script is killed along with
    /// anything it started. A job that is building its report stops before
    /// writing it. Has no effect once the report is being written.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Wait for the job's outcome
    pub async fn wait(self) -> JobOutcome {
        let id = self.id;
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(job = %id, error = %e, "job task failed");
                JobOutcome::Failed(FailureRecord {
                    job_id: id,
                    status: JobStatus::Failed,
                    kind: FailureKind::Internal,
                    message: e.to_string(),
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: None,
                    attempts: 0,
                    duration_ms: 0,
                })
            }
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub submitted: usize,
    pub running: usize,
    pub peak_running: usize,
}

#[derive(Debug)]
struct Shared {
    config: RunnerConfig,
    renderer: Renderer,
    permits: Arc<Semaphore>,
    submitted: AtomicUsize,
    running: AtomicUsize,
    peak_running: AtomicUsize,
}

/// Counts a job as RUNNING for as long as it lives
struct RunningGuard<'a>(&'a Shared);

impl<'a> RunningGuard<'a> {
    fn enter(shared: &'a Shared) -> Self {
        let now = shared.running.fetch_add(1, Ordering::SeqCst) + 1;
        shared.peak_running.fetch_max(now, Ordering::SeqCst);
        Self(shared)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Failure plus whatever the script printed
struct Failure {
    error: RunnerError,
    stdout: String,
    stderr: String,
}

impl From<RunnerError> for Failure {
    fn from(error: RunnerError) -> Self {
        Self {
            error,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// Job pool
#[derive(Debug, Clone)]
pub struct RunnerPool {
    shared: Arc<Shared>,
}

impl Default for RunnerPool {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

impl RunnerPool {
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        let workers = config.workers.max(1);
        let renderer = Renderer::new().with_options(config.render.clone());
        Self {
            shared: Arc::new(Shared {
                config,
                renderer,
                permits: Arc::new(Semaphore::new(workers)),
                submitted: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                peak_running: AtomicUsize::new(0),
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.shared.config
    }

    /// Jobs currently RUNNING
    #[must_use]
    pub fn running(&self) -> usize {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Most jobs ever RUNNING at once
    #[must_use]
    pub fn peak_running(&self) -> usize {
        self.shared.peak_running.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            submitted: self.shared.submitted.load(Ordering::SeqCst),
            running: self.running(),
            peak_running: self.peak_running(),
        }
    }

    /// Queue `job`
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, job: RunnerJob) -> JobHandle {
        let id = job.id;
        let (status_tx, status_rx) = watch::channel(JobStatus::Pending);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.shared.submitted.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(job = %id, script = %job.script.display(), "job queued");

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move { run_job(&shared, job, status_tx, cancel_rx).await });
        JobHandle {
            id,
            status: status_rx,
            cancel: cancel_tx,
            task,
        }
    }

    /// Submit `job` and wait for it
    pub async fn run(&self, job: RunnerJob) -> JobOutcome {
        self.submit(job).wait().await
    }
}

async fn run_job(
    shared: &Shared,
    job: RunnerJob,
    status: watch::Sender<JobStatus>,
    mut cancel: watch::Receiver<bool>,
) -> JobOutcome {
    let started = Instant::now();
    let mut attempts = 0;
    let result = execute(shared, &job, &status, &mut cancel, &mut attempts).await;
    let duration_ms = duration_ms(started.elapsed());

    match result {
        Ok((published, stdout, stderr)) => match transition(&status, JobStatus::Succeeded) {
            Ok(()) => {
                tracing::info!(job = %job.id, duration_ms, location = %published.location, "job succeeded");
                JobOutcome::Succeeded(ReportRecord {
                    job_id: job.id,
                    target: published.target,
                    location: published.location,
                    digest: published.digest,
                    blocks: published.blocks,
                    assets: published.assets,
                    duration_ms,
                    stdout,
                    stderr,
                })
            }
            Err(error) => fail(&job, &status, error.into(), attempts, duration_ms),
        },
        Err(failure) => fail(&job, &status, failure, attempts, duration_ms),
    }
}

fn fail(
    job: &RunnerJob,
    status: &watch::Sender<JobStatus>,
    failure: Failure,
    attempts: u32,
    duration_ms: u64,
) -> JobOutcome {
    let Failure {
        error,
        stdout,
        stderr,
    } = failure;
    let terminal = error.terminal_status();
    if let Err(e) = transition(status, terminal) {
        // Already terminal; keep whatever was published first.
        tracing::warn!(job = %job.id, error = %e, "could not record final status");
    }
    let terminal = *status.borrow();

    match error.kind() {
        FailureKind::Cancelled => tracing::info!(job = %job.id, "job cancelled"),
        kind => tracing::warn!(job = %job.id, %kind, error = %error, "job failed"),
    }
    JobOutcome::Failed(FailureRecord {
        job_id: job.id,
        status: terminal,
        kind: error.kind(),
        message: error.to_string(),
        stdout,
        stderr,
        exit_code: error.exit_code(),
        attempts,
        duration_ms,
    })
}

async fn execute(
    shared: &Shared,
    job: &RunnerJob,
    status: &watch::Sender<JobStatus>,
    cancel: &mut watch::Receiver<bool>,
    attempts: &mut u32,
) -> Result<(Published, String, String), Failure> {
    let permits = Arc::clone(&shared.permits);
    let _permit = tokio::select! {
        permit = permits.acquire_owned() => permit
            .map_err(|_| RunnerError::Internal("pool closed".to_string()))?,
        () = worker::cancelled(cancel) => return Err(RunnerError::Cancelled.into()),
    };
    let mut running = Some(RunningGuard::enter(shared));
    transition(status, JobStatus::Running)?;
    tracing::info!(job = %job.id, script = %job.script.display(), "job started");

    job.check()?;
    let scratch = tempfile::Builder::new()
        .prefix("folio-job-")
        .tempdir()
        .map_err(|e| RunnerError::TransientInfra(format!("cannot create scratch dir: {e}")))?;
    let output = scratch.path().join("tree.json");

    let child = loop {
        *attempts += 1;
        match worker::spawn(job, &output) {
            Ok(child) => break child,
            Err(e) if e.is_retryable() && *attempts == 1 => {
                let backoff = shared.config.retry_backoff();
                tracing::warn!(job = %job.id, error = %e, ?backoff, "retrying after transient failure");
                drop(running.take());
                transition(status, JobStatus::Pending)?;
                tokio::select! {
                    () = tokio::time::sleep(backoff) => {}
                    () = worker::cancelled(cancel) => return Err(RunnerError::Cancelled.into()),
                }
                running = Some(RunningGuard::enter(shared));
                transition(status, JobStatus::Running)?;
            }
            Err(e) => return Err(e.into()),
        }
    };

    let deadline = tokio::time::Instant::now() + job.timeout;
    let execution = worker::supervise(
        child,
        job.timeout,
        cancel,
        shared.config.max_captured_output,
    )
    .await?;
    if !execution.exit.success() {
        let (error, stdout, stderr) = execution.into_error();
        return Err(Failure {
            error,
            stdout,
            stderr,
        });
    }

    let stdout = execution.stdout;
    let stderr = execution.stderr;
    // Building and rendering stay under the job's deadline and cancel token.
    let staging = async {
        let tree = pipeline::read_tree(&output).await?;
        pipeline::stage(tree, job.working_dir(), job.target, shared.renderer.clone()).await
    };
    let staged = tokio::select! {
        staged = staging => staged,
        () = tokio::time::sleep_until(deadline) => Err(RunnerError::Timeout(job.timeout)),
        () = worker::cancelled(cancel) => Err(RunnerError::Cancelled),
    };
    let published = match staged {
        Ok(_) if *cancel.borrow() => Err(RunnerError::Cancelled),
        Ok(staged) => {
            let request = RenderRequest::new(&job.output_dir, job.artifact_name());
            staged.deliver(&request).await
        }
        Err(error) => Err(error),
    };
    drop(running);

    match published {
        Ok(published) => Ok((published, stdout, stderr)),
        Err(error) => Err(Failure {
            error,
            stdout,
            stderr,
        }),
    }
}
