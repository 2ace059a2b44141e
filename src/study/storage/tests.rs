use super::*;
use crate::study::trial::TrialState;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn backends(dir: &TempDir) -> Vec<Arc<dyn Storage>> {
    vec![
        Arc::new(MemoryStorage::new()),
        open_storage("sqlite:///studies/opt.db", dir.path()).unwrap(),
    ]
}

#[test]
fn test_open_storage_resolves_relative_path() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage("sqlite:///nested/opt.db", dir.path()).unwrap();
    assert!(dir.path().join("nested/opt.db").exists());
    assert!(storage.describe().contains("opt.db"));
}

#[test]
fn test_open_storage_rejects_unknown_scheme() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        open_storage("redis://localhost/0", dir.path()),
        Err(StorageError::UnsupportedBackend { .. })
    ));
}

#[test]
fn test_create_or_load_study() {
    let dir = TempDir::new().unwrap();
    for storage in backends(&dir) {
        let (created, is_new) = storage
            .create_or_load_study("study", &[Direction::Minimize])
            .unwrap();
        assert!(is_new);

        let (loaded, is_new) = storage
            .create_or_load_study("study", &[Direction::Minimize])
            .unwrap();
        assert!(!is_new);
        assert_eq!(created, loaded);

        assert_eq!(storage.load_study("study").unwrap(), Some(created));
        assert_eq!(storage.load_study("missing").unwrap(), None);
    }
}

#[test]
fn test_direction_mismatch_is_rejected() {
    let dir = TempDir::new().unwrap();
    for storage in backends(&dir) {
        storage
            .create_or_load_study("study", &[Direction::Minimize])
            .unwrap();
        let err = storage
            .create_or_load_study("study", &[Direction::Maximize])
            .unwrap_err();
        assert!(matches!(err, StorageError::DirectionMismatch { .. }));
        assert!(err.to_string().contains("[minimize]"));
    }
}

#[test]
fn test_trial_lifecycle() {
    let dir = TempDir::new().unwrap();
    for storage in backends(&dir) {
        let (study, _) = storage
            .create_or_load_study("study", &[Direction::Minimize, Direction::Maximize])
            .unwrap();

        let (first, n0) = storage.create_trial(study.id).unwrap();
        let (second, n1) = storage.create_trial(study.id).unwrap();
        assert_eq!((n0, n1), (0, 1));

        let dist = Distribution::Float {
            low: 0.0,
            high: 1.0,
            log: false,
        };
        storage
            .set_trial_param(first, "x", &dist, &ParamValue::Float(0.25))
            .unwrap();
        storage
            .set_trial_user_attr(first, "events", &json!([1, 2, 3]))
            .unwrap();
        storage
            .finish_trial(first, TrialState::Complete, Some(&[0.5, 3.0]))
            .unwrap();
        storage
            .finish_trial(second, TrialState::Fail, None)
            .unwrap();

        let trials = storage.get_all_trials(study.id).unwrap();
        assert_eq!(trials.len(), 2, "{}", storage.describe());
        assert_eq!(trials[0].state, TrialState::Complete);
        assert_eq!(trials[0].values, Some(vec![0.5, 3.0]));
        assert_eq!(trials[0].params["x"], ParamValue::Float(0.25));
        assert_eq!(trials[0].distributions["x"], dist);
        assert_eq!(trials[0].user_attrs["events"], json!([1, 2, 3]));
        assert!(trials[0].datetime_complete.is_some());
        assert_eq!(trials[1].state, TrialState::Fail);
        assert_eq!(trials[1].values, None);
    }
}

#[test]
fn test_finished_trial_is_immutable() {
    let dir = TempDir::new().unwrap();
    for storage in backends(&dir) {
        let (study, _) = storage
            .create_or_load_study("study", &[Direction::Minimize])
            .unwrap();
        let (trial, _) = storage.create_trial(study.id).unwrap();
        storage
            .finish_trial(trial, TrialState::Complete, Some(&[1.0]))
            .unwrap();

        assert!(matches!(
            storage.finish_trial(trial, TrialState::Fail, None),
            Err(StorageError::TrialFinished(_))
        ));
        assert!(matches!(
            storage.set_trial_user_attr(trial, "late", &json!(1)),
            Err(StorageError::TrialFinished(_))
        ));
        assert!(matches!(
            storage.finish_trial(9999, TrialState::Fail, None),
            Err(StorageError::UnknownTrial(9999))
        ));
    }
}

#[test]
fn test_fail_stale_trials() {
    let dir = TempDir::new().unwrap();
    for storage in backends(&dir) {
        let (study, _) = storage
            .create_or_load_study("study", &[Direction::Minimize])
            .unwrap();
        let (done, _) = storage.create_trial(study.id).unwrap();
        storage
            .finish_trial(done, TrialState::Complete, Some(&[1.0]))
            .unwrap();
        storage.create_trial(study.id).unwrap();
        storage.create_trial(study.id).unwrap();

        assert_eq!(storage.fail_stale_trials(study.id).unwrap(), 2);
        let states: Vec<_> = storage
            .get_all_trials(study.id)
            .unwrap()
            .into_iter()
            .map(|t| t.state)
            .collect();
        assert_eq!(
            states,
            vec![TrialState::Complete, TrialState::Fail, TrialState::Fail]
        );
    }
}

#[test]
fn test_sqlite_numbers_are_unique_across_handles() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.db");
    let (study, _) = SqliteStorage::open(&path)
        .unwrap()
        .create_or_load_study("shared", &[Direction::Minimize])
        .unwrap();

    let numbers: Vec<u64> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                scope.spawn(move || {
                    let storage = SqliteStorage::open(&path).unwrap();
                    (0..10)
                        .map(|_| storage.create_trial(study.id).unwrap().1)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    let mut sorted = numbers.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted, (0..40).collect::<Vec<_>>());
}

#[test]
fn test_sqlite_persists_between_opens() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("persist.db");
    {
        let storage = SqliteStorage::open(&path).unwrap();
        let (study, _) = storage
            .create_or_load_study("persist", &[Direction::Maximize])
            .unwrap();
        let (trial, _) = storage.create_trial(study.id).unwrap();
        storage
            .finish_trial(trial, TrialState::Complete, Some(&[42.0]))
            .unwrap();
    }
    let storage = SqliteStorage::open(&path).unwrap();
    let study = storage.load_study("persist").unwrap().unwrap();
    assert_eq!(study.directions, vec![Direction::Maximize]);
    let trials = storage.get_all_trials(study.id).unwrap();
    assert_eq!(trials[0].value(), Some(42.0));
}

#[test]
fn test_read_only_open_never_writes() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        open_storage_read_only("sqlite:///missing/opt.db", dir.path()),
        Err(StorageError::MissingDatabase(_))
    ));
    assert!(!dir.path().join("missing").exists());

    {
        let storage = open_storage("sqlite:///opt.db", dir.path()).unwrap();
        storage
            .create_or_load_study("existing", &[Direction::Minimize])
            .unwrap();
    }
    let storage = open_storage_read_only("sqlite:///opt.db", dir.path()).unwrap();
    let study = storage.load_study("existing").unwrap().unwrap();
    assert!(storage.get_all_trials(study.id).unwrap().is_empty());
    assert!(storage.load_study("other").unwrap().is_none());
    assert!(storage.create_trial(study.id).is_err());
}

#[test]
fn test_memory_snapshot_round_trip() {
    let dir = TempDir::new().unwrap();
    let storage = MemoryStorage::new();
    let (study, _) = storage
        .create_or_load_study("mem", &[Direction::Minimize])
        .unwrap();
    let (trial, _) = storage.create_trial(study.id).unwrap();
    storage
        .finish_trial(trial, TrialState::Complete, Some(&[2.0]))
        .unwrap();

    let path = dir.path().join("mem.json");
    storage.snapshot("mem").unwrap().save(&path).unwrap();

    let restored = MemoryStorage::from_snapshot(StudySnapshot::load(&path).unwrap());
    let study = restored.load_study("mem").unwrap().unwrap();
    let (_, number) = restored.create_trial(study.id).unwrap();
    assert_eq!(number, 1);
    assert_eq!(restored.get_all_trials(study.id).unwrap()[0].value(), Some(2.0));
}
