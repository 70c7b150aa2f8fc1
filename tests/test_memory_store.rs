// tests/test_memory_store.rs
//
// MemoryStore behaviour: paginated walks, shared namespaces across
// sub-stores, stored (compressed) representation and walk cancellation.

use anyhow::Result;
use bytes::Bytes;
use dstore::{
    store_for_url, CompressionConfig, MemoryStore, Store, StoreError, StoreOptions, WalkQuery,
};
use tokio_util::sync::CancellationToken;
use url::Url;

fn small_pages(base: &str, options: StoreOptions) -> Result<MemoryStore> {
    Ok(MemoryStore::new(Url::parse(base)?, options).with_page_size(2))
}

async fn fill(store: &dyn Store, count: usize) -> Result<()> {
    for i in 0..count {
        store.write_bytes(&format!("item-{:03}", i), Bytes::from(format!("value {}", i))).await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_factory_builds_memory_store() -> Result<()> {
    let store = store_for_url("mem://scratch/root", StoreOptions::default()).await?;
    store.write_bytes("a", Bytes::from_static(b"1")).await?;
    assert_eq!(store.object_key("a"), "root/a");
    assert_eq!(store.object_url("a"), "mem://scratch/root/a");
    assert_eq!(store.list("", 10).await?, vec!["a"]);
    Ok(())
}

#[tokio::test]
async fn test_walk_spans_many_pages() -> Result<()> {
    let store = small_pages("mem://ns/root", StoreOptions::default())?;
    fill(&store, 11).await?;

    let all = store.list("", 100).await?;
    assert_eq!(all.len(), 11);
    assert!(all.windows(2).all(|w| w[0] < w[1]));

    let mut resumed = Vec::new();
    store
        .walk_from("", "item-004", &mut |name: &str| {
            resumed.push(name.to_string());
            Ok(())
        })
        .await?;
    assert_eq!(resumed, all[4..].to_vec());

    // Resuming past the last key visits nothing.
    let mut none = 0;
    store.walk_from("", "item-999", &mut |_name: &str| { none += 1; Ok(()) }).await?;
    assert_eq!(none, 0);
    Ok(())
}

#[tokio::test]
async fn test_stop_on_page_boundary() -> Result<()> {
    let store = small_pages("mem://ns/root", StoreOptions::default())?;
    fill(&store, 6).await?;

    // Stopping exactly at the end of the second page must not fetch more.
    let names = store.list("", 4).await?;
    assert_eq!(names, vec!["item-000", "item-001", "item-002", "item-003"]);
    Ok(())
}

#[tokio::test]
async fn test_bucket_root_store_walks_everything() -> Result<()> {
    let store = small_pages("mem://ns", StoreOptions::default())?;
    store.write_bytes("top", Bytes::from_static(b".")).await?;
    store.write_bytes("dir/nested", Bytes::from_static(b".")).await?;

    assert_eq!(store.object_key("top"), "top");
    assert_eq!(store.list("", 10).await?, vec!["dir/nested", "top"]);
    assert_eq!(store.list("dir/", 10).await?, vec!["dir/nested"]);
    Ok(())
}

#[tokio::test]
async fn test_sub_stores_share_namespace() -> Result<()> {
    let root = small_pages("mem://ns/root", StoreOptions::new().with_extension(".bin"))?;
    let left = root.sub_store("left")?;
    let right = root.sub_store("right")?;

    left.write_bytes("x", Bytes::from_static(b"L")).await?;
    right.write_bytes("x", Bytes::from_static(b"R")).await?;

    assert_eq!(root.len(), 2);
    assert_eq!(left.read_all("x").await?, Bytes::from_static(b"L"));
    assert_eq!(right.read_all("x").await?, Bytes::from_static(b"R"));
    assert_eq!(root.list("", 10).await?, vec!["left/x", "right/x"]);
    assert_eq!(left.list("", 10).await?, vec!["x"]);

    // Nested sub-stores keep composing.
    let deep = left.sub_store("a/b")?;
    deep.write_bytes("y", Bytes::from_static(b"D")).await?;
    assert_eq!(deep.object_key("y"), "root/left/a/b/y.bin");
    assert!(root.exists("left/a/b/y").await?);
    Ok(())
}

#[tokio::test]
async fn test_stored_bytes_are_compressed() -> Result<()> {
    let options = StoreOptions::new()
        .with_extension(".zst")
        .with_compression(CompressionConfig::zstd());
    let store = small_pages("mem://ns/root", options)?;

    let payload = Bytes::from(vec![b'z'; 64 * 1024]);
    store.write_bytes("big", payload.clone()).await?;

    let raw = store.raw_object("root/big.zst").expect("object stored under its key");
    assert!(raw.len() < payload.len());
    assert_ne!(raw, payload);
    assert_eq!(store.read_all("big").await?, payload);
    Ok(())
}

#[tokio::test]
async fn test_write_once_and_overwrite() -> Result<()> {
    let once = small_pages("mem://ns/root", StoreOptions::default())?;
    once.write_bytes("x", Bytes::from_static(b"A")).await?;
    once.write_bytes("x", Bytes::from_static(b"B")).await?;
    assert_eq!(once.read_all("x").await?, Bytes::from_static(b"A"));

    let replace = small_pages("mem://ns/root", StoreOptions::new().with_overwrite(true))?;
    replace.write_bytes("x", Bytes::from_static(b"A")).await?;
    replace.write_bytes("x", Bytes::from_static(b"B")).await?;
    assert_eq!(replace.read_all("x").await?, Bytes::from_static(b"B"));
    Ok(())
}

#[tokio::test]
async fn test_missing_objects() -> Result<()> {
    let store = small_pages("mem://ns/root", StoreOptions::default())?;
    assert!(!store.exists("ghost").await?);
    assert!(matches!(store.open("ghost").await, Err(StoreError::NotFound(_))));
    assert!(matches!(store.delete("ghost").await, Err(StoreError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_walk_cancelled_mid_way() -> Result<()> {
    let store = small_pages("mem://ns/root", StoreOptions::default())?;
    fill(&store, 10).await?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let query = WalkQuery::new("").with_cancel(cancel);

    let mut seen = 0;
    let result = store
        .walk_with(&query, &mut |_name: &str| {
            seen += 1;
            if seen == 3 {
                trigger.cancel();
            }
            Ok(())
        })
        .await;
    assert!(matches!(result, Err(StoreError::Cancelled)));
    assert_eq!(seen, 3);
    Ok(())
}

#[tokio::test]
async fn test_walk_cancelled_before_start() -> Result<()> {
    let store = small_pages("mem://ns/root", StoreOptions::default())?;
    fill(&store, 3).await?;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut seen = 0;
    let result = store
        .walk_with(&WalkQuery::new("").with_cancel(cancel), &mut |_name: &str| {
            seen += 1;
            Ok(())
        })
        .await;
    assert!(matches!(result, Err(StoreError::Cancelled)));
    assert_eq!(seen, 0);
    Ok(())
}
