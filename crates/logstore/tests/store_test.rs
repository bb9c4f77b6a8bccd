//! End-to-end tests through the `LogStore` facade.

use alopex_logstore::codec::encode_batch;
use alopex_logstore::layout::FileKind;
use alopex_logstore::{Level, LogQuery, LogRecord, LogStore, StoreConfig};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn test_config(dir: &Path) -> StoreConfig {
    let mut config = StoreConfig::new(dir);
    config.batch.max_wait_ms = 20;
    config.bloom.num_bits = 1 << 14;
    config
}

/// Polls until at least `expected` records are queryable.
async fn wait_for_records(store: &LogStore, expected: usize) -> Vec<LogRecord> {
    for _ in 0..300 {
        let records = store.list_recent(1000).await.unwrap();
        if records.len() >= expected {
            return records;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {} records", expected);
}

/// Polls until the checkpoint reaches `expected`.
async fn wait_for_checkpoint(store: &LogStore, expected: u64) {
    for _ in 0..300 {
        if store.checkpoint() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for checkpoint {}", expected);
}

fn timestamps(records: &[LogRecord]) -> Vec<i64> {
    records.iter().map(LogRecord::timestamp).collect()
}

async fn open_with_abc(temp_dir: &TempDir) -> LogStore {
    let store = LogStore::open(test_config(temp_dir.path())).await.unwrap();
    store.submit(LogRecord::new(100, Level::Info, "service started")).unwrap();
    store.submit(LogRecord::new(200, Level::Error, "connection refused")).unwrap();
    store.submit(LogRecord::new(300, Level::Info, "request served")).unwrap();
    wait_for_records(&store, 3).await;
    store
}

#[tokio::test]
async fn test_query_returns_newest_first() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_with_abc(&temp_dir).await;

    let response = store.query(LogQuery::recent(10)).await.unwrap();
    assert_eq!(timestamps(&response.records), vec![300, 200, 100]);
    assert_eq!(response.count, 3);

    store.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_query_by_level() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_with_abc(&temp_dir).await;

    let response = store
        .query(LogQuery::recent(10).with_level("ERROR"))
        .await
        .unwrap();
    assert_eq!(response.count, 1);
    assert_eq!(response.records[0].timestamp(), 200);
    assert_eq!(response.records[0].level(), Level::Error);

    let response = store
        .query(LogQuery::recent(10).with_keyword("REFUSED"))
        .await
        .unwrap();
    assert_eq!(timestamps(&response.records), vec![200]);

    store.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restart_keeps_records_and_indexes() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_with_abc(&temp_dir).await;
    wait_for_checkpoint(&store, 1).await;
    store.shutdown().await.unwrap();
    let checkpoint = 1;

    let segment_dir = temp_dir.path().join("segments");
    assert!(segment_dir.join("segment-000001.bf").exists());

    let store = LogStore::open(test_config(temp_dir.path())).await.unwrap();
    assert_eq!(store.replay_report().records_replayed, 0);
    assert_eq!(store.checkpoint(), checkpoint);
    assert_eq!(
        timestamps(&store.list_recent(10).await.unwrap()),
        vec![300, 200, 100]
    );

    store.submit(LogRecord::new(400, Level::Warn, "after restart")).unwrap();
    let records = wait_for_records(&store, 4).await;
    assert_eq!(records[0].timestamp(), 400);
    wait_for_checkpoint(&store, checkpoint + 1).await;
    store.shutdown().await.unwrap();

    // replay cleanup removed the first WAL file; the reopened writer moved on
    let wal_dir = temp_dir.path().join("wal");
    assert!(!wal_dir.join("wal-000001.log").exists());
    assert!(wal_dir.join("wal-000002.log").exists());
}

#[tokio::test]
async fn test_open_replays_unflushed_wal() {
    let temp_dir = TempDir::new().unwrap();
    let wal_dir = temp_dir.path().join("wal");
    fs::create_dir_all(&wal_dir).unwrap();

    let pending = vec![
        LogRecord::new(10, Level::Warn, "written before crash"),
        LogRecord::new(20, Level::Error, "also pending"),
    ];
    fs::write(wal_dir.join(FileKind::Wal.file_name(1)), encode_batch(&pending)).unwrap();

    let store = LogStore::open(test_config(temp_dir.path())).await.unwrap();
    assert_eq!(store.replay_report().records_replayed, 2);
    assert_eq!(store.checkpoint(), 1);
    assert!(!wal_dir.join(FileKind::Wal.file_name(1)).exists());

    let records = store.list_recent(10).await.unwrap();
    assert_eq!(timestamps(&records), vec![20, 10]);
    store.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_flushes_buffered_records() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.batch.max_wait_ms = 60_000;

    let store = LogStore::open(config.clone()).await.unwrap();
    let ingestor = store.ingestor();
    for ts in 0..10 {
        ingestor
            .submit(LogRecord::new(ts, Level::Debug, format!("tick {}", ts)))
            .unwrap();
    }
    store.shutdown().await.unwrap();
    assert!(ingestor.submit(LogRecord::new(99, Level::Info, "late")).is_err());

    let store = LogStore::open(config).await.unwrap();
    assert_eq!(store.list_recent(100).await.unwrap().len(), 10);
    store.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_checkpoint_fails_open() {
    let temp_dir = TempDir::new().unwrap();
    let wal_dir = temp_dir.path().join("wal");
    fs::create_dir_all(&wal_dir).unwrap();
    fs::write(wal_dir.join("checkpoint.meta"), "lastFlushedWalIndex=oops").unwrap();

    let result = LogStore::open(test_config(temp_dir.path())).await;
    assert!(matches!(
        result,
        Err(alopex_logstore::StoreError::InvalidCheckpoint(_))
    ));
}

#[tokio::test]
async fn test_failed_flush_keeps_checkpoint_and_batching_continues() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.wal.max_file_size = 1;
    config.segment.max_file_size = 1;
    config.batch.max_records = 1;
    let store = LogStore::open(config).await.unwrap();

    store.submit(LogRecord::new(1, Level::Info, "first")).unwrap();
    wait_for_records(&store, 1).await;
    wait_for_checkpoint(&store, 1).await;

    // a directory holding the next segment's name makes rotation fail
    let blocker = temp_dir
        .path()
        .join("segments")
        .join(FileKind::Segment.file_name(2));
    fs::create_dir(&blocker).unwrap();

    store.submit(LogRecord::new(2, Level::Info, "dropped by a failed flush")).unwrap();
    let wal_two = temp_dir.path().join("wal").join(FileKind::Wal.file_name(2));
    for _ in 0..300 {
        if fs::metadata(&wal_two).map(|m| m.len() > 0).unwrap_or(false) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(fs::metadata(&wal_two).unwrap().len() > 0);
    assert_eq!(store.checkpoint(), 1);

    fs::remove_dir(&blocker).unwrap();
    store.submit(LogRecord::new(3, Level::Info, "after recovery")).unwrap();
    wait_for_checkpoint(&store, 3).await;
    let records = wait_for_records(&store, 2).await;
    assert_eq!(timestamps(&records), vec![3, 1]);
    assert_eq!(
        fs::read(temp_dir.path().join("segments").join(FileKind::Segment.file_name(2))).unwrap(),
        encode_batch(&[LogRecord::new(3, Level::Info, "after recovery")])
    );

    store.shutdown().await.unwrap();
}
