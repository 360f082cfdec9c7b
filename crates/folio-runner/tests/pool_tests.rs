//! Runner pool behaviour against real subprocesses

use folio_render::{extract_document, Target};
use folio_runner::{
    EnvironmentDescriptor, FailureKind, JobOutcome, JobStatus, RunnerConfig, RunnerJob,
    RunnerPool,
};
use folio_test_utils::{text_tree_script, write_script};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::time::{Duration, Instant};

fn job(dir: &Path, name: &str, body: &str) -> RunnerJob {
    let script = write_script(dir, name, body);
    RunnerJob::new(script, dir.join("out")).with_timeout(Duration::from_secs(30))
}

fn pool(workers: usize) -> RunnerPool {
    RunnerPool::new(
        RunnerConfig::default()
            .with_workers(workers)
            .with_retry_backoff(Duration::from_millis(20)),
    )
}

fn failure(outcome: JobOutcome) -> folio_runner::FailureRecord {
    match outcome {
        JobOutcome::Failed(record) => record,
        JobOutcome::Succeeded(record) => panic!("expected failure, got {record:?}"),
    }
}

#[tokio::test]
async fn successful_job_writes_one_report() {
    let dir = tempfile::tempdir().unwrap();
    let body = format!("echo building\n{}", text_tree_script("all good"));
    let job = job(dir.path(), "ok.sh", &body).with_name("daily");

    let outcome = pool(1).run(job).await;
    assert_eq!(outcome.status(), JobStatus::Succeeded);
    assert_eq!(outcome.exit_code(), 0);
    let JobOutcome::Succeeded(record) = outcome else {
        unreachable!()
    };
    assert_eq!(record.target, Target::Local);
    assert_eq!(record.blocks, 2);
    assert_eq!(record.stdout.trim(), "building");
    assert_eq!(
        Path::new(&record.location),
        dir.path().join("out").join("daily.html")
    );
    assert_eq!(std::fs::read_dir(dir.path().join("out")).unwrap().count(), 1);
}

#[tokio::test]
async fn parameters_reach_the_script() {
    let dir = tempfile::tempdir().unwrap();
    let body = r#"printf '{"title":"R","blocks":[{"kind":"text","attributes":{"text":"region %s"}}]}' "$FOLIO_PARAM_REGION" > "$FOLIO_OUTPUT""#;
    let job = job(dir.path(), "param.sh", body)
        .with_param("region", "emea")
        .with_name("r");

    let JobOutcome::Succeeded(record) = pool(1).run(job).await else {
        panic!("job failed");
    };
    let html = std::fs::read_to_string(&record.location).unwrap();
    let document = folio_codec::deserialize(&extract_document(&html).unwrap()).unwrap();
    let text = document.pages()[0].children()[0].attribute("text").cloned();
    assert_eq!(text, Some("region emea".into()));
}

#[tokio::test]
async fn non_zero_exit_fails_without_report() {
    let dir = tempfile::tempdir().unwrap();
    let job = job(dir.path(), "fail.sh", "echo boom >&2\nexit 3");

    let record = failure(pool(1).run(job).await);
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.kind, FailureKind::ScriptFailure);
    assert_eq!(record.exit_code, Some(3));
    assert_eq!(record.attempts, 1);
    assert!(record.stderr.contains("boom"));
    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn malformed_output_fails() {
    let dir = tempfile::tempdir().unwrap();
    let job = job(dir.path(), "bad.sh", r#"echo '{"title": 1}' > "$FOLIO_OUTPUT""#);
    let record = failure(pool(1).run(job).await);
    assert_eq!(record.kind, FailureKind::ScriptFailure);
    assert_eq!(record.exit_code, None);
}

#[tokio::test]
async fn asset_paths_are_confined() {
    let dir = tempfile::tempdir().unwrap();
    let workdir = dir.path().join("job");
    std::fs::create_dir(&workdir).unwrap();
    std::fs::write(dir.path().join("secret.csv"), "a\n1\n").unwrap();
    let body = r#"cat > "$FOLIO_OUTPUT" <<'EOF'
{"title": "Escape", "blocks": [{"kind": "table",
  "asset": {"mime_type": "text/csv", "path": "../secret.csv"}}]}
EOF"#;
    let job = job(&workdir, "escape.sh", body);

    let record = failure(pool(1).run(job).await);
    assert_eq!(record.kind, FailureKind::SandboxViolation);
    assert_eq!(record.status, JobStatus::Failed);
}

#[tokio::test]
async fn timeout_kills_the_script() {
    let dir = tempfile::tempdir().unwrap();
    let job = job(dir.path(), "sleep.sh", "echo $$ > pid\nexec sleep 30")
        .with_timeout(Duration::from_millis(500));

    let started = Instant::now();
    let outcome = pool(1).run(job).await;
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(outcome.exit_code(), 124);
    let record = failure(outcome);
    assert_eq!(record.status, JobStatus::Timeout);
    assert_eq!(record.kind, FailureKind::Timeout);
    assert!(!dir.path().join("out").exists());

    #[cfg(target_os = "linux")]
    {
        let pid = std::fs::read_to_string(dir.path().join("pid")).unwrap();
        assert!(folio_test_utils::process_gone(pid.trim()));
    }
}

#[tokio::test]
async fn timeout_kills_processes_the_script_started() {
    let dir = tempfile::tempdir().unwrap();
    let job = job(dir.path(), "fork.sh", "sleep 30 &\necho $! > child\nwait")
        .with_timeout(Duration::from_millis(500));

    let record = failure(pool(1).run(job).await);
    assert_eq!(record.status, JobStatus::Timeout);

    #[cfg(target_os = "linux")]
    {
        let pid = std::fs::read_to_string(dir.path().join("child")).unwrap();
        assert!(folio_test_utils::process_gone(pid.trim()));
    }
}

#[tokio::test]
async fn running_jobs_never_exceed_workers() {
    let dir = tempfile::tempdir().unwrap();
    let body = format!("sleep 0.3\n{}", text_tree_script("done"));
    let pool = pool(2);

    let handles = (0..6).map(|i| pool.submit(job(dir.path(), &format!("job{i}.sh"), &body)));
    let outcomes = futures::future::join_all(handles.map(folio_runner::JobHandle::wait)).await;
    assert!(outcomes.iter().all(JobOutcome::is_success));
    assert!(pool.peak_running() <= 2);
    assert!(pool.peak_running() >= 1);
    assert_eq!(pool.running(), 0);
    assert_eq!(pool.stats().submitted, 6);
}

#[tokio::test]
async fn cancel_running_job() {
    let dir = tempfile::tempdir().unwrap();
    let job = job(dir.path(), "long.sh", "exec sleep 30");
    let pool = pool(1);

    let handle = pool.submit(job);
    let mut status = handle.subscribe();
    status
        .wait_for(|s| *s == JobStatus::Running)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.cancel();

    let started = Instant::now();
    let outcome = handle.wait().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(outcome.exit_code(), 130);
    let record = failure(outcome);
    assert_eq!(record.status, JobStatus::Cancelled);
    assert_eq!(record.kind, FailureKind::Cancelled);
}

#[tokio::test]
async fn cancel_pending_job_never_starts() {
    let dir = tempfile::tempdir().unwrap();
    let pool = pool(1);
    let blocker = pool.submit(job(dir.path(), "block.sh", "exec sleep 30"));
    let mut status = blocker.subscribe();
    status
        .wait_for(|s| *s == JobStatus::Running)
        .await
        .unwrap();

    let queued = pool.submit(job(dir.path(), "queued.sh", "touch started"));
    assert_eq!(queued.status(), JobStatus::Pending);
    queued.cancel();
    let record = failure(queued.wait().await);
    assert_eq!(record.status, JobStatus::Cancelled);
    assert_eq!(record.attempts, 0);
    assert!(!dir.path().join("started").exists());

    blocker.cancel();
    assert_eq!(blocker.wait().await.status(), JobStatus::Cancelled);
}

#[tokio::test]
async fn spawn_failure_is_retried_once() {
    let dir = tempfile::tempdir().unwrap();
    let job = job(dir.path(), "any.sh", "true")
        .with_environment(EnvironmentDescriptor::new("/nonexistent/interpreter"));

    let record = failure(pool(1).run(job).await);
    assert_eq!(record.kind, FailureKind::TransientInfra);
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.attempts, 2);
}

#[tokio::test]
async fn cloud_job_publishes_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let job = job(dir.path(), "cloud.sh", &text_tree_script("remote")).with_target(Target::Cloud);

    let JobOutcome::Succeeded(record) = pool(1).run(job).await else {
        panic!("job failed");
    };
    assert_eq!(record.target, Target::Cloud);
    let location = Path::new(&record.location);
    assert!(location.starts_with(dir.path().join("out")));
    assert!(location.join("document.json").exists());
    assert!(location.join("manifest.json").exists());
}

/// Script whose tree points at a FIFO: building the report blocks on it
/// until someone writes to the pipe.
#[cfg(unix)]
const FIFO_TREE: &str = r#"mkfifo slow.fifo
cat > "$FOLIO_OUTPUT" <<'EOF'
{"title": "Slow", "blocks": [{"kind": "table",
  "asset": {"mime_type": "text/csv", "path": "slow.fifo"}}]}
EOF
touch written"#;

/// Unblock the abandoned build so the runtime can shut down
#[cfg(unix)]
fn release_fifo(dir: &Path) {
    std::fs::write(dir.join("slow.fifo"), "a\n1\n").unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn timeout_covers_report_building() {
    let dir = tempfile::tempdir().unwrap();
    let job = job(dir.path(), "slow.sh", FIFO_TREE).with_timeout(Duration::from_secs(1));

    let started = Instant::now();
    let record = failure(pool(1).run(job).await);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(record.status, JobStatus::Timeout);
    assert_eq!(record.kind, FailureKind::Timeout);
    assert!(dir.path().join("written").exists());
    assert!(!dir.path().join("out").exists());

    release_fifo(dir.path());
}

#[cfg(unix)]
#[tokio::test]
async fn cancel_during_report_building() {
    let dir = tempfile::tempdir().unwrap();
    let handle = pool(1).submit(job(dir.path(), "slow.sh", FIFO_TREE));

    while !dir.path().join("written").exists() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.status(), JobStatus::Running);
    handle.cancel();

    let record = failure(handle.wait().await);
    assert_eq!(record.status, JobStatus::Cancelled);
    assert_eq!(record.exit_code, None);
    assert!(!dir.path().join("out").exists());

    release_fifo(dir.path());
}
