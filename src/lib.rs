// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Crate root: module wiring and public re-exports.

//! Backend-agnostic object store.
//!
//! One [`Store`] contract over S3 (`s3://`), Google Cloud Storage (`gs://`),
//! the local filesystem (`file://`) and process memory (`mem://`), with
//! write-once writes, transparent compression, sub-stores and resumable,
//! stoppable prefix walks.
//!
//! ```rust,no_run
//! use dstore::{store_for_url, CompressionConfig, Store, StoreError, StoreOptions};
//!
//! # async fn example() -> dstore::Result<()> {
//! let options = StoreOptions::new()
//!     .with_extension(".dbin")
//!     .with_compression(CompressionConfig::zstd());
//! let store = store_for_url("gs://my-bucket/blocks", options).await?;
//!
//! store.write_bytes("0000001000", bytes::Bytes::from_static(b"block")).await?;
//! let mut seen = 0;
//! store.walk("", &mut |_name: &str| {
//!     seen += 1;
//!     if seen == 10 { Err(StoreError::StopIteration) } else { Ok(()) }
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod config;
pub mod constants;
pub mod error;
pub mod naming;
pub mod store;
pub mod store_logger;
pub mod walk;
pub mod write_policy;

// Backends
pub mod file_store;
pub mod gcs_store;
pub mod memory_store;
pub mod s3_store;

pub use compression::{CompressionConfig, ObjectReader};
pub use config::StoreOptions;
pub use error::{Result, StoreError};
pub use naming::{ListScope, ObjectNaming};
pub use store::{
    infer_scheme,
    parse_base_url,
    push_local_file,
    store_for_url,
    LocalFileCleanup,
    Scheme,
    Store,
};
pub use store_logger::{LoggedStore, OpEntry, OpLogger, RecordingOpLogger, TracingOpLogger};
pub use walk::{KeyPage, KeyPager, Visitor, WalkQuery};
pub use write_policy::WriteMode;

pub use file_store::FileStore;
pub use gcs_store::GcsStore;
pub use memory_store::MemoryStore;
pub use s3_store::S3Store;
