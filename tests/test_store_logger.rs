// tests/test_store_logger.rs
//
// LoggedStore reports every operation to its injected OpLogger.

use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use dstore::{LoggedStore, MemoryStore, RecordingOpLogger, Store, StoreError, StoreOptions};
use tempfile::TempDir;
use url::Url;

fn logged(logger: &Arc<RecordingOpLogger>) -> Result<LoggedStore> {
    let inner = MemoryStore::new(Url::parse("mem://ops/root")?, StoreOptions::new().with_extension(".bin"));
    Ok(LoggedStore::new(Arc::new(inner), logger.clone()))
}

#[tokio::test]
async fn test_operations_are_recorded_in_order() -> Result<()> {
    let logger = Arc::new(RecordingOpLogger::new());
    let store = logged(&logger)?;

    store.write_bytes("a", Bytes::from_static(b"1")).await?;
    store.write_bytes("b", Bytes::from_static(b"2")).await?;
    assert!(store.exists("a").await?);
    store.read_all("a").await?;
    assert_eq!(store.list("", 10).await?, vec!["a", "b"]);
    store.delete("a").await?;

    assert_eq!(logger.operations(), vec!["WRITE", "WRITE", "EXISTS", "OPEN", "WALK", "DELETE"]);

    let entries = logger.entries();
    assert_eq!(entries[0].target, "mem://ops/root/a.bin");
    assert_eq!(entries[4].num_objects, 2);
    assert!(entries.iter().all(|e| e.error.is_none()));
    Ok(())
}

#[tokio::test]
async fn test_failures_carry_the_error() -> Result<()> {
    let logger = Arc::new(RecordingOpLogger::new());
    let store = logged(&logger)?;

    assert!(matches!(store.open("missing").await, Err(StoreError::NotFound(_))));
    assert!(!store.exists("missing").await?);

    let entries = logger.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].operation, "OPEN");
    assert!(entries[0].error.as_deref().is_some_and(|e| e.contains("root/missing.bin")));
    assert_eq!(entries[1].operation, "EXISTS");
    assert_eq!(entries[1].num_objects, 0);
    assert!(entries[1].error.is_none());
    Ok(())
}

#[tokio::test]
async fn test_stopped_walk_counts_visited() -> Result<()> {
    let logger = Arc::new(RecordingOpLogger::new());
    let store = logged(&logger)?;
    for i in 0..5 {
        store.write_bytes(&format!("k{}", i), Bytes::from_static(b".")).await?;
    }

    assert_eq!(store.list("", 2).await?.len(), 2);
    let walk = logger.entries().into_iter().find(|e| e.operation == "WALK").expect("walk logged");
    assert_eq!(walk.num_objects, 2);
    assert!(walk.error.is_none());
    Ok(())
}

#[tokio::test]
async fn test_sub_store_inherits_logger() -> Result<()> {
    let logger = Arc::new(RecordingOpLogger::new());
    let store = logged(&logger)?;
    let child = store.sub_store("child")?;

    child.write_bytes("x", Bytes::from_static(b".")).await?;
    let entries = logger.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].target, "mem://ops/root/child/x.bin");
    Ok(())
}

#[tokio::test]
async fn test_push_logs_write_and_push() -> Result<()> {
    let logger = Arc::new(RecordingOpLogger::new());
    let store = logged(&logger)?;
    let dir = TempDir::new()?;
    let local = dir.path().join("staged");
    std::fs::write(&local, b"staged")?;

    store.push_local_file(&local, "pushed").await?;
    assert!(!local.exists());
    assert_eq!(logger.operations(), vec!["WRITE", "PUSH"]);
    Ok(())
}
