//! Script processes
//!
//! Each job runs in its own process with a cleared environment. The only
//! variables it sees are the descriptor's, `PATH` (when inherited), one
//! `FOLIO_PARAM_<KEY>` per parameter, `FOLIO_OUTPUT` and `FOLIO_JOB_ID`.
//!
//! On unix the script leads a fresh process group, so anything it starts is
//! killed along with it.

use crate::error::RunnerError;
use crate::job::RunnerJob;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long to keep draining pipes after the script exits
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Finished script
#[derive(Debug)]
pub(crate) struct Execution {
    pub(crate) exit: ExitStatus,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

impl Execution {
    pub(crate) fn into_error(self) -> (RunnerError, String, String) {
        let code = self.exit.code();
        let message = match code {
            Some(code) => format!("script exited with status {code}"),
            None => format!("script terminated abnormally ({})", self.exit),
        };
        (
            RunnerError::ScriptFailure {
                message,
                exit_code: code,
            },
            self.stdout,
            self.stderr,
        )
    }
}

pub(crate) fn command(job: &RunnerJob, output: &Path) -> Command {
    let env = &job.environment;
    let mut cmd = Command::new(&env.program);
    cmd.args(&env.args)
        .arg(&job.script)
        .current_dir(job.working_dir())
        .env_clear()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    if env.inherit_path {
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
    }
    cmd.envs(&env.vars);
    for (key, value) in &job.parameters {
        cmd.env(RunnerJob::param_var(key), value);
    }
    cmd.env("FOLIO_OUTPUT", output)
        .env("FOLIO_JOB_ID", job.id.to_string());
    cmd
}

/// Start the script process
///
/// # Errors
/// `RunnerError::TransientInfra` if the process cannot be started
pub(crate) fn spawn(job: &RunnerJob, output: &Path) -> Result<Child, RunnerError> {
    let child = command(job, output).spawn().map_err(|e| {
        RunnerError::TransientInfra(format!("cannot start '{}': {e}", job.environment.program))
    })?;
    tracing::debug!(job = %job.id, pid = child.id(), "script started");
    Ok(child)
}

/// Wait for the script, enforcing `timeout` and honouring `cancel`
///
/// On timeout or cancellation the process group is killed and the script
/// reaped before returning. After a normal exit, leftover members of the
/// group are killed too.
pub(crate) async fn supervise(
    mut child: Child,
    timeout: Duration,
    cancel: &mut watch::Receiver<bool>,
    capture_limit: usize,
) -> Result<Execution, RunnerError> {
    let pid = child.id();
    let stdout = drain(child.stdout.take(), capture_limit);
    let stderr = drain(child.stderr.take(), capture_limit);

    let exit = tokio::select! {
        exit = child.wait() => exit.map_err(|e| RunnerError::Internal(format!("wait failed: {e}"))),
        () = tokio::time::sleep(timeout) => Err(RunnerError::Timeout(timeout)),
        () = cancelled(cancel) => Err(RunnerError::Cancelled),
    };

    let exit = match exit {
        Ok(exit) => exit,
        Err(err) => {
            terminate(&mut child, pid).await;
            stdout.abort();
            stderr.abort();
            return Err(err);
        }
    };
    kill_group(pid);

    Ok(Execution {
        exit,
        stdout: collect(stdout).await,
        stderr: collect(stderr).await,
    })
}

/// Kill the process group and confirm the script is gone
async fn terminate(child: &mut Child, pid: Option<u32>) {
    kill_group(pid);
    if let Err(e) = child.kill().await {
        tracing::warn!(?pid, error = %e, "failed to kill script");
    }
    match child.try_wait() {
        Ok(Some(status)) => tracing::debug!(?pid, %status, "script terminated"),
        Ok(None) => tracing::error!(?pid, "script still running after kill"),
        Err(e) => tracing::warn!(?pid, error = %e, "cannot confirm script exit"),
    }
}

/// SIGKILL every process in the group led by `pid`
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        // Group already empty
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pid, error = %e, "failed to kill script process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

/// Resolve once cancellation is requested; never if the sender is gone
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn drain<R>(pipe: Option<R>, limit: usize) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                tracing::debug!(error = %e, "pipe read failed");
            }
        }
        tail(&buf, limit)
    })
}

async fn collect(task: JoinHandle<String>) -> String {
    let abort = task.abort_handle();
    match tokio::time::timeout(DRAIN_GRACE, task).await {
        Ok(Ok(text)) => text,
        Ok(Err(_)) => String::new(),
        Err(_) => {
            // A grandchild still holds the pipe open.
            abort.abort();
            String::new()
        }
    }
}

/// Last `limit` bytes of `bytes`, lossily decoded
pub(crate) fn tail(bytes: &[u8], limit: usize) -> String {
    let start = bytes.len().saturating_sub(limit);
    String::from_utf8_lossy(&bytes[start..]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::EnvironmentDescriptor;

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail(b"abcdef", 3), "def");
        assert_eq!(tail(b"ab", 10), "ab");
    }

    #[tokio::test]
    async fn environment_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let script = folio_test_utils::write_script(dir.path(), "env.sh", "env | sort");
        let job = RunnerJob::new(&script, dir.path())
            .with_param("region", "emea")
            .with_environment(EnvironmentDescriptor::default().with_var("LANG", "C"));

        let (_tx, mut rx) = watch::channel(false);
        let child = spawn(&job, &dir.path().join("out.json")).unwrap();
        let run = supervise(child, Duration::from_secs(10), &mut rx, 4096)
            .await
            .unwrap();
        assert!(run.exit.success());

        let vars: Vec<&str> = run
            .stdout
            .lines()
            .filter_map(|l| l.split_once('=').map(|(k, _)| k))
            .collect();
        for expected in ["FOLIO_JOB_ID", "FOLIO_OUTPUT", "FOLIO_PARAM_REGION", "LANG", "PATH"] {
            assert!(vars.contains(&expected), "missing {expected} in {vars:?}");
        }
        assert!(!vars.contains(&"HOME"));
        assert!(run.stdout.contains(&format!("FOLIO_JOB_ID={}", job.id)));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn background_children_die_with_the_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = folio_test_utils::write_script(
            dir.path(),
            "fork.sh",
            "sleep 30 &\necho $! > child\nwait",
        );
        let job = RunnerJob::new(&script, dir.path());

        let (_tx, mut rx) = watch::channel(false);
        let child = spawn(&job, &dir.path().join("out.json")).unwrap();
        let result = supervise(child, Duration::from_millis(500), &mut rx, 4096).await;
        assert!(matches!(result, Err(RunnerError::Timeout(_))));

        let pid = std::fs::read_to_string(dir.path().join("child")).unwrap();
        assert!(folio_test_utils::process_gone(pid.trim()));
    }
}
