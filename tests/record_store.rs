mod common;

use std::path::PathBuf;

use chrono::Utc;
use proptest::prelude::*;

use timebox::errors::TimeboxError;
use timebox::store::{
    FileRecordStore, MemoryRecordStore, NewScriptRun, RecordStore, RunUpdate,
};
use timebox::types::RunStatus;

fn new_run(name: &str) -> NewScriptRun {
    NewScriptRun {
        script_name: name.to_string(),
        script_path: PathBuf::from(format!("/data/scripts/{name}")),
        run_time_hours: 0.5,
        log_path: PathBuf::from(format!("/data/logs/{name}.log")),
    }
}

fn exercise_lifecycle(store: &dyn RecordStore) {
    let run = store.create(new_run("job.py")).unwrap();
    assert_eq!(run.status, RunStatus::Uploaded);
    assert!(run.pid.is_none());
    assert!(run.start_time.is_none());

    let started = store
        .update_status(run.id, RunStatus::Running, RunUpdate::started(Utc::now()))
        .unwrap();
    assert!(started.start_time.is_some());
    assert_eq!(store.count_by_status(RunStatus::Running).unwrap(), 1);

    let with_pid = store
        .update_status(run.id, RunStatus::Running, RunUpdate::pid(4242))
        .unwrap();
    assert_eq!(with_pid.pid, Some(4242));
    assert_eq!(with_pid.start_time, started.start_time);

    let done = store
        .update_status(run.id, RunStatus::Completed, RunUpdate::finished(Utc::now()))
        .unwrap();
    assert_eq!(done.status, RunStatus::Completed);
    assert!(done.pid.is_none());
    assert!(done.end_time.is_some());
    assert_eq!(store.count_by_status(RunStatus::Running).unwrap(), 0);
    assert_eq!(store.count_by_status(RunStatus::Completed).unwrap(), 1);
}

#[test]
fn memory_store_follows_lifecycle() {
    exercise_lifecycle(&MemoryRecordStore::new());
}

#[test]
fn file_store_follows_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileRecordStore::open(dir.path().join("records.json")).unwrap();
    exercise_lifecycle(&store);
}

#[test]
fn unknown_id_is_not_found() {
    let store = MemoryRecordStore::new();
    assert!(matches!(store.get(99), Err(TimeboxError::NotFound(99))));
    assert!(matches!(
        store.update_status(99, RunStatus::Running, RunUpdate::default()),
        Err(TimeboxError::NotFound(99))
    ));
}

#[test]
fn stopping_twice_is_rejected() {
    let store = MemoryRecordStore::new();
    let run = store.create(new_run("twice.py")).unwrap();
    store
        .update_status(run.id, RunStatus::Running, RunUpdate::started(Utc::now()))
        .unwrap();
    store
        .update_status(run.id, RunStatus::Stopped, RunUpdate::finished(Utc::now()))
        .unwrap();

    let err = store
        .update_status(run.id, RunStatus::Stopped, RunUpdate::finished(Utc::now()))
        .unwrap_err();
    assert!(matches!(
        err,
        TimeboxError::InvalidTransition {
            from: RunStatus::Stopped,
            to: RunStatus::Stopped,
            ..
        }
    ));
}

#[test]
fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("records.json");

    let (first, second) = {
        let store = FileRecordStore::open(&path).unwrap();
        let first = store.create(new_run("a.py")).unwrap();
        let second = store.create(new_run("b.py")).unwrap();
        store
            .update_status(first.id, RunStatus::Running, RunUpdate::started(Utc::now()))
            .unwrap();
        (first, second)
    };

    let reopened = FileRecordStore::open(&path).unwrap();
    assert_eq!(reopened.get(first.id).unwrap().status, RunStatus::Running);
    assert_eq!(reopened.get(second.id).unwrap().script_name, "b.py");
    assert_eq!(reopened.count_by_status(RunStatus::Running).unwrap(), 1);

    // Ids keep counting after a reopen.
    let third = reopened.create(new_run("c.py")).unwrap();
    assert_eq!(third.id, second.id + 1);
}

#[test]
fn corrupt_record_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(FileRecordStore::open(&path).is_err());
}

#[test]
fn list_is_ordered_by_id() {
    let store = MemoryRecordStore::new();
    for name in ["x.py", "y.py", "z.py"] {
        store.create(new_run(name)).unwrap();
    }
    let ids: Vec<_> = store.list().unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

fn status_strategy() -> impl Strategy<Value = RunStatus> {
    prop::sample::select(RunStatus::ALL.to_vec())
}

proptest! {
    /// Once a run reaches a terminal status no update sequence changes it.
    #[test]
    fn terminal_status_never_changes(
        terminal in prop::sample::select(vec![
            RunStatus::Completed,
            RunStatus::Stopped,
            RunStatus::Error,
        ]),
        attempts in prop::collection::vec(status_strategy(), 1..12),
    ) {
        let store = MemoryRecordStore::new();
        let run = store.create(new_run("p.py")).unwrap();
        store
            .update_status(run.id, RunStatus::Running, RunUpdate::started(Utc::now()))
            .unwrap();
        let finished = store
            .update_status(run.id, terminal, RunUpdate::finished(Utc::now()))
            .unwrap();

        for next in attempts {
            let result = store.update_status(run.id, next, RunUpdate::pid(1));
            let is_invalid_transition =
                matches!(result, Err(TimeboxError::InvalidTransition { .. }));
            prop_assert!(is_invalid_transition);
        }

        let after = store.get(run.id).unwrap();
        prop_assert_eq!(after.status, terminal);
        prop_assert_eq!(after.end_time, finished.end_time);
        prop_assert_eq!(after.pid, None);
    }

    /// At most one record is ever `running` when starts go through the
    /// running-count check first.
    #[test]
    fn guarded_starts_keep_a_single_running_run(
        ops in prop::collection::vec((0u64..5, any::<bool>()), 1..40),
    ) {
        let store = MemoryRecordStore::new();
        for i in 0..5 {
            store.create(new_run(&format!("s{i}.py"))).unwrap();
        }

        for (idx, start) in ops {
            let id = idx + 1;
            if start {
                if store.count_by_status(RunStatus::Running).unwrap() == 0 {
                    let _ = store.update_status(
                        id,
                        RunStatus::Running,
                        RunUpdate::started(Utc::now()),
                    );
                }
            } else {
                let _ = store.update_status(
                    id,
                    RunStatus::Stopped,
                    RunUpdate::finished(Utc::now()),
                );
            }
            prop_assert!(store.count_by_status(RunStatus::Running).unwrap() <= 1);
        }
    }
}
