mod common;
use crate::common::{init_tracing, with_timeout_secs, FailingLauncher, InlineLauncher};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::oneshot;

use timebox::exec::{Launcher, Outcome, Supervisor, SupervisorOptions};
use timebox::logsink::LogSink;
use timebox::store::{MemoryRecordStore, NewScriptRun, RecordStore, RunUpdate, ScriptRun};
use timebox::types::RunStatus;

fn options() -> SupervisorOptions {
    SupervisorOptions {
        term_grace: Duration::from_millis(500),
        drain_grace: Duration::from_millis(500),
    }
}

/// A claimed (`running`) run whose log lives in `dir`.
fn claimed_run(store: &MemoryRecordStore, dir: &TempDir, hours: f64) -> ScriptRun {
    let run = store
        .create(NewScriptRun {
            script_name: "inline.sh".to_string(),
            script_path: PathBuf::from("inline.sh"),
            run_time_hours: hours,
            log_path: dir.path().join("run.log"),
        })
        .unwrap();
    store
        .update_status(run.id, RunStatus::Running, RunUpdate::started(Utc::now()))
        .unwrap()
}

fn supervisor(
    store: &Arc<MemoryRecordStore>,
    run: ScriptRun,
    launcher: impl Launcher + 'static,
) -> (Supervisor, oneshot::Sender<()>) {
    let (stop_tx, stop_rx) = oneshot::channel();
    let supervisor = Supervisor::new(
        run,
        Arc::clone(store) as Arc<dyn RecordStore>,
        Arc::new(launcher),
        LogSink::new(),
        options(),
        stop_rx,
    );
    (supervisor, stop_tx)
}

/// Index of the first log line containing `needle`.
fn line_of(log: &str, needle: &str) -> usize {
    log.lines()
        .position(|l| l.contains(needle))
        .unwrap_or_else(|| panic!("{needle:?} not in log:\n{log}"))
}

#[tokio::test]
async fn natural_exit_is_completed_with_output_captured() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryRecordStore::new());
    let run = claimed_run(&store, &dir, 1.0);

    let (sup, _stop_tx) = supervisor(
        &store,
        run.clone(),
        InlineLauncher::new("echo hello; echo oops 1>&2; exit 3"),
    );

    let outcome = with_timeout_secs(10, sup.run()).await;
    assert_eq!(outcome, Outcome::Completed { exit_code: Some(3) });

    let record = store.get(run.id).unwrap();
    assert_eq!(record.status, RunStatus::Completed);
    assert!(record.pid.is_none());
    assert!(record.end_time.is_some());

    let log = std::fs::read_to_string(&run.log_path).unwrap();
    assert!(log.contains("] Script starting..."));
    assert!(log.contains("] Script started (PID: "));
    assert!(log.contains("] Will run for 1 hours"));
    assert!(log.contains("] hello\n"));
    assert!(log.contains("] [ERROR] oops\n"));
    assert!(log.contains("] Script completed with exit code: 3"));

    let starting = line_of(&log, "] Script starting...");
    let started = line_of(&log, "] Script started (PID: ");
    let will_run = line_of(&log, "] Will run for 1 hours");
    let first_output = line_of(&log, "] hello").min(line_of(&log, "] [ERROR] oops"));
    assert!(starting < started && started < will_run && will_run < first_output);
}

#[tokio::test]
async fn exit_line_follows_all_script_output() {
    init_tracing();
    for _ in 0..5 {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryRecordStore::new());
        let run = claimed_run(&store, &dir, 1.0);

        let (sup, _stop_tx) = supervisor(
            &store,
            run.clone(),
            InlineLauncher::new("for i in 1 2 3 4 5 6 7 8 9 10; do echo line$i; done; exit 0"),
        );
        let outcome = with_timeout_secs(10, sup.run()).await;
        assert_eq!(outcome, Outcome::Completed { exit_code: Some(0) });

        let log = std::fs::read_to_string(&run.log_path).unwrap();
        let last_output = line_of(&log, "] line10");
        let exit_line = line_of(&log, "] Script completed with exit code: 0");
        assert!(last_output < exit_line, "exit line before output:\n{log}");
        assert_eq!(exit_line, log.lines().count() - 1, "lines after exit:\n{log}");
    }
}

#[tokio::test]
async fn background_jobs_do_not_outlive_the_run() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryRecordStore::new());
    let run = claimed_run(&store, &dir, 1.0);
    let marker = dir.path().join("marker");

    let (sup, _stop_tx) = supervisor(
        &store,
        run.clone(),
        InlineLauncher::new(format!("(sleep 2; touch '{}') & exit 0", marker.display())),
    );
    let outcome = with_timeout_secs(10, sup.run()).await;
    assert_eq!(outcome, Outcome::Completed { exit_code: Some(0) });
    assert_eq!(store.get(run.id).unwrap().status, RunStatus::Completed);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!marker.exists(), "background job kept running after the run ended");
}

#[tokio::test]
async fn deadline_terminates_and_persists_completed() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryRecordStore::new());
    // 0.0003 hours is a little over one second.
    let run = claimed_run(&store, &dir, 0.0003);

    let (sup, _stop_tx) = supervisor(
        &store,
        run.clone(),
        InlineLauncher::new("echo tick; sleep 30"),
    );

    let started = std::time::Instant::now();
    let outcome = with_timeout_secs(10, sup.run()).await;
    assert_eq!(outcome, Outcome::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(store.get(run.id).unwrap().status, RunStatus::Completed);
    let log = std::fs::read_to_string(&run.log_path).unwrap();
    assert!(!log.contains("Script completed with exit code"));

    let will_run = line_of(&log, "] Will run for");
    let tick = line_of(&log, "] tick");
    let timeout = line_of(&log, "] Timeout reached, stopping script");
    assert!(will_run < tick && tick < timeout);
    assert_eq!(timeout, log.lines().count() - 1, "lines after timeout:\n{log}");
}

#[tokio::test]
async fn stop_signal_terminates_process() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryRecordStore::new());
    let run = claimed_run(&store, &dir, 1.0);

    let (sup, stop_tx) = supervisor(
        &store,
        run.clone(),
        InlineLauncher::new("echo ready; sleep 30"),
    );
    let handle = tokio::spawn(sup.run());

    let log_path = run.log_path.clone();
    let ready = common::wait_until(Duration::from_secs(5), || {
        std::fs::read_to_string(&log_path)
            .map(|l| l.contains("] ready"))
            .unwrap_or(false)
    })
    .await;
    assert!(ready, "script never produced output");

    stop_tx.send(()).unwrap();
    let outcome = with_timeout_secs(10, handle).await.unwrap();
    assert_eq!(outcome, Outcome::StoppedByUser);
    assert_eq!(store.get(run.id).unwrap().status, RunStatus::Stopped);
}

#[tokio::test]
async fn script_ignoring_sigterm_is_killed_after_grace() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryRecordStore::new());
    let run = claimed_run(&store, &dir, 0.0003);

    let (sup, _stop_tx) = supervisor(
        &store,
        run.clone(),
        InlineLauncher::new("trap '' TERM; while true; do sleep 0.1; done"),
    );

    let outcome = with_timeout_secs(15, sup.run()).await;
    assert_eq!(outcome, Outcome::TimedOut);
    assert_eq!(store.get(run.id).unwrap().status, RunStatus::Completed);
}

#[tokio::test]
async fn launch_failure_is_persisted_as_error() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryRecordStore::new());
    let run = claimed_run(&store, &dir, 1.0);

    let launcher = FailingLauncher::new();
    let (sup, _stop_tx) = supervisor(&store, run.clone(), launcher.clone());

    let outcome = with_timeout_secs(5, sup.run()).await;
    assert!(matches!(outcome, Outcome::Error(_)));
    assert_eq!(launcher.attempts(), vec![PathBuf::from("inline.sh")]);

    let record = store.get(run.id).unwrap();
    assert_eq!(record.status, RunStatus::Error);
    let log = std::fs::read_to_string(&run.log_path).unwrap();
    assert!(log.contains("] ERROR: Failed to launch script"));
}

#[tokio::test]
async fn run_already_stopped_keeps_its_status() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryRecordStore::new());
    let run = claimed_run(&store, &dir, 1.0);

    // Someone else finished the run before the process came up.
    store
        .update_status(run.id, RunStatus::Stopped, RunUpdate::finished(Utc::now()))
        .unwrap();

    let (sup, _stop_tx) = supervisor(&store, run.clone(), InlineLauncher::new("sleep 30"));
    let outcome = with_timeout_secs(10, sup.run()).await;

    assert_eq!(outcome, Outcome::StoppedByUser);
    assert_eq!(store.get(run.id).unwrap().status, RunStatus::Stopped);
}
