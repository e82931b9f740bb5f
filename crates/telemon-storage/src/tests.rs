use crate::persistence::PersistenceService;
use crate::{restore, MemStorage, RestorePolicy, SqliteStorage, Storage, StorageError};
use std::sync::Arc;
use std::time::Duration;
use telemon_common::types::{MetricKind, MetricPayload};
use tempfile::TempDir;

fn backends() -> Vec<(&'static str, Box<dyn Storage>)> {
    vec![
        ("memory", Box::new(MemStorage::new())),
        ("sqlite", Box::new(SqliteStorage::open_in_memory().unwrap())),
    ]
}

fn line_count(path: &std::path::Path) -> usize {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .count()
}

#[test]
fn counter_accumulates() {
    for (name, store) in backends() {
        store.add_metric(MetricKind::Counter, "p", 1.0).unwrap();
        store.add_metric(MetricKind::Counter, "p", 2.0).unwrap();
        assert_eq!(store.get_metric("p").unwrap(), 3.0, "backend {name}");
    }
}

#[test]
fn gauge_keeps_last_write() {
    for (name, store) in backends() {
        store.add_metric(MetricKind::Gauge, "g", 1.5).unwrap();
        store.add_metric(MetricKind::Gauge, "g", 5.5).unwrap();
        assert_eq!(store.get_metric("g").unwrap(), 5.5, "backend {name}");
    }
}

#[test]
fn kind_mismatch_is_rejected_and_store_unchanged() {
    for (name, store) in backends() {
        store.add_metric(MetricKind::Gauge, "g", 4.0).unwrap();
        let err = store.add_metric(MetricKind::Counter, "g", 1.0).unwrap_err();
        assert!(
            matches!(
                err,
                StorageError::KindMismatch {
                    stored: MetricKind::Gauge,
                    requested: MetricKind::Counter,
                    ..
                }
            ),
            "backend {name}: {err}"
        );
        assert_eq!(store.get_metric("g").unwrap(), 4.0);
        assert_eq!(store.get_record("g").unwrap().kind, MetricKind::Gauge);
    }
}

#[test]
fn unknown_kind_never_reaches_the_store() {
    let store = MemStorage::new();
    assert!("timer".parse::<MetricKind>().is_err());
    assert!(matches!(store.get_metric("x"), Err(StorageError::NotFound(_))));
    assert!(store.get_all_metrics().unwrap().is_empty());
}

#[test]
fn missing_metric_is_not_found() {
    for (name, store) in backends() {
        let err = store.get_metric("absent").unwrap_err();
        assert!(matches!(err, StorageError::NotFound(ref n) if n == "absent"), "backend {name}");
        assert!(store.get_all_metrics().unwrap().is_empty());
    }
}

#[test]
fn snapshot_is_independent_of_later_writes() {
    for (name, store) in backends() {
        store.add_metric(MetricKind::Counter, "c", 1.0).unwrap();
        let snapshot = store.get_all_metrics().unwrap();
        store.add_metric(MetricKind::Counter, "c", 10.0).unwrap();
        store.add_metric(MetricKind::Gauge, "late", 1.0).unwrap();

        assert_eq!(snapshot.len(), 1, "backend {name}");
        assert_eq!(snapshot["c"].value, 1.0);
        assert_eq!(store.get_metric("c").unwrap(), 11.0);
    }
}

#[test]
fn concurrent_counter_increments_are_not_lost() {
    let store = Arc::new(MemStorage::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    store.add_metric(MetricKind::Counter, "hits", 1.0).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(store.get_metric("hits").unwrap(), 8000.0);
}

#[test]
fn concurrent_gauge_writes_end_on_an_applied_value() {
    let store = Arc::new(MemStorage::new());
    let handles: Vec<_> = (1..=8)
        .map(|i| {
            let store = store.clone();
            std::thread::spawn(move || {
                store.add_metric(MetricKind::Gauge, "g", f64::from(i)).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let value = store.get_metric("g").unwrap();
    assert!((1..=8).any(|i| f64::from(i) == value));
}

#[test]
fn sqlite_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.db");
    {
        let store = SqliteStorage::open(&path).unwrap();
        store.add_metric(MetricKind::Counter, "c", 2.0).unwrap();
        store.ping().unwrap();
    }
    let store = SqliteStorage::open(&path).unwrap();
    store.add_metric(MetricKind::Counter, "c", 3.0).unwrap();
    assert_eq!(store.get_metric("c").unwrap(), 5.0);
}

#[tokio::test]
async fn sync_write_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.jsonl");
    let service = PersistenceService::open(&path, Duration::ZERO).unwrap();
    assert!(!service.is_buffered());

    let gauge = MetricPayload::new(MetricKind::Gauge, "heap", 12.5);
    let counter = MetricPayload::new(MetricKind::Counter, "poll_count", 1.0);
    service.write(gauge.clone());
    service.write(counter.clone());
    assert_eq!(line_count(&path), 2);

    service.stop().await.unwrap();
    let records = PersistenceService::read_all_data(&path).unwrap();
    assert_eq!(records, vec![gauge, counter]);
}

#[tokio::test(start_paused = true)]
async fn async_mode_appends_only_after_interval() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.jsonl");
    let service = PersistenceService::open(&path, Duration::from_secs(5)).unwrap();
    assert!(service.is_buffered());

    service.write(MetricPayload::new(MetricKind::Gauge, "a", 1.0));
    service.write(MetricPayload::new(MetricKind::Counter, "b", 2.0));
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(line_count(&path), 0);
    assert_eq!(service.pending(), 2);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(line_count(&path), 2);
    assert_eq!(service.pending(), 0);

    service.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_race_the_flush_without_loss() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.jsonl");
    let service = Arc::new(PersistenceService::open(&path, Duration::from_millis(1)).unwrap());

    const WRITERS: usize = 8;
    const PER_WRITER: usize = 500;
    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let service = service.clone();
            tokio::task::spawn_blocking(move || {
                for i in 0..PER_WRITER {
                    service.write(MetricPayload::new(
                        MetricKind::Counter,
                        format!("w{w}"),
                        i as f64,
                    ));
                    if i % 50 == 0 {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    service.stop().await.unwrap();
    assert_eq!(service.pending(), 0);
    assert_eq!(line_count(&path), WRITERS * PER_WRITER);

    let records = PersistenceService::read_all_data(&path).unwrap();
    for w in 0..WRITERS {
        let deltas: Vec<f64> = records
            .iter()
            .filter(|r| r.id == format!("w{w}"))
            .filter_map(|r| r.delta)
            .collect();
        let expected: Vec<f64> = (0..PER_WRITER).map(|i| i as f64).collect();
        assert_eq!(deltas, expected, "writer {w}");
    }
}

#[tokio::test(start_paused = true)]
async fn stop_flushes_pending_records() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.jsonl");
    let service = PersistenceService::open(&path, Duration::from_secs(300)).unwrap();

    service.write(MetricPayload::new(MetricKind::Gauge, "a", 1.0));
    assert_eq!(line_count(&path), 0);

    service.stop().await.unwrap();
    assert_eq!(line_count(&path), 1);

    // Closed: further writes are dropped, and a second stop is harmless.
    service.write(MetricPayload::new(MetricKind::Gauge, "a", 2.0));
    assert_eq!(service.pending(), 0);
    service.stop().await.unwrap();
    assert_eq!(line_count(&path), 1);
}

#[test]
fn read_all_data_creates_missing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fresh.jsonl");
    let records = PersistenceService::read_all_data(&path).unwrap();
    assert!(records.is_empty());
    assert!(path.exists());
}

#[test]
fn read_all_data_fails_on_malformed_line() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.jsonl");
    std::fs::write(
        &path,
        "{\"id\":\"a\",\"type\":\"gauge\",\"value\":1}\n\nnot json\n",
    )
    .unwrap();

    let err = PersistenceService::read_all_data(&path).unwrap_err();
    assert!(matches!(err, StorageError::Json { line: 3, .. }), "{err}");
}

#[test]
fn replay_restore_sums_counter_journal() {
    let records = vec![
        MetricPayload::new(MetricKind::Counter, "c", 1.0),
        MetricPayload::new(MetricKind::Gauge, "g", 1.0),
        MetricPayload::new(MetricKind::Counter, "c", 2.0),
        MetricPayload::new(MetricKind::Gauge, "g", 7.0),
    ];
    let store = MemStorage::new();
    let applied = restore(&store, records, RestorePolicy::Replay).unwrap();
    assert_eq!(applied, 4);
    assert_eq!(store.get_metric("c").unwrap(), 3.0);
    assert_eq!(store.get_metric("g").unwrap(), 7.0);
}

#[test]
fn last_value_restore_keeps_final_snapshot() {
    let records = vec![
        MetricPayload::new(MetricKind::Counter, "c", 1.0),
        MetricPayload::new(MetricKind::Counter, "c", 3.0),
        MetricPayload::new(MetricKind::Gauge, "g", 2.0),
    ];
    let store = MemStorage::new();
    let applied = restore(&store, records, RestorePolicy::LastValue).unwrap();
    assert_eq!(applied, 2);
    assert_eq!(store.get_metric("c").unwrap(), 3.0);
    assert_eq!(store.get_metric("g").unwrap(), 2.0);
}

#[tokio::test]
async fn restore_from_log_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.jsonl");
    std::fs::write(
        &path,
        "{\"id\":\"p\",\"type\":\"counter\",\"delta\":1}\n\
         {\"id\":\"p\",\"type\":\"counter\",\"delta\":2}\n",
    )
    .unwrap();

    let records = PersistenceService::read_all_data(&path).unwrap();
    let store = SqliteStorage::open_in_memory().unwrap();
    restore(&store, records, RestorePolicy::Replay).unwrap();
    assert_eq!(store.get_metric("p").unwrap(), 3.0);
}

#[test]
fn restore_aborts_on_invalid_record() {
    let mut bad = MetricPayload::new(MetricKind::Counter, "c", 1.0);
    bad.delta = None;
    let store = MemStorage::new();
    let err = restore(&store, vec![bad], RestorePolicy::Replay).unwrap_err();
    assert!(matches!(err, StorageError::InvalidRecord { .. }));
}

#[test]
fn restore_aborts_on_kind_conflict() {
    let records = vec![
        MetricPayload::new(MetricKind::Gauge, "x", 1.0),
        MetricPayload::new(MetricKind::Counter, "x", 1.0),
    ];
    let store = MemStorage::new();
    let err = restore(&store, records, RestorePolicy::Replay).unwrap_err();
    assert!(matches!(err, StorageError::KindMismatch { .. }));
}
