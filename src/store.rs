// src/store.rs
//
// Pluggable object-store abstraction with consistent URL schemes.
// Supported schemes: s3://, gs://, file://, mem://
//
// Every backend realises the same contract on top of the shared pieces:
// naming (keys/urls), compression (body transform), write_policy
// (write-once) and walk (enumeration).

use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tracing::debug;
use url::Url;

use crate::compression::ObjectReader;
use crate::config::StoreOptions;
use crate::error::{Result, StoreError};
use crate::walk::{Visitor, WalkQuery};

/// Routing scheme inferred from a base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    S3,
    Gcs,
    File,
    Memory,
    Unknown,
}

/// Best-effort scheme inference from a URL string.
pub fn infer_scheme(url: &str) -> Scheme {
    if url.starts_with("s3://") { Scheme::S3 }
    else if url.starts_with("gs://") { Scheme::Gcs }
    else if url.starts_with("file://") || url.starts_with('/') { Scheme::File }
    else if url.starts_with("mem://") { Scheme::Memory }
    else { Scheme::Unknown }
}

/// Parse a base location. Absolute filesystem paths become `file://` URLs.
pub fn parse_base_url(location: &str) -> Result<Url> {
    if location.starts_with('/') {
        return Url::from_file_path(location)
            .map_err(|_| StoreError::InvalidUrl(location.to_string()));
    }
    Ok(Url::parse(location)?)
}

/// Uniform object store contract.
///
/// Names are logical: extension-free and `/`-delimited. A store never changes
/// configuration after construction; `sub_store` creates an independent store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Write `data` under `name`. With overwrite disabled, an existing object
    /// is left untouched and the call still succeeds.
    async fn write(&self, name: &str, data: ObjectReader) -> Result<()>;

    /// Open `name` for reading. Fails with `StoreError::NotFound` when absent.
    async fn open(&self, name: &str) -> Result<ObjectReader>;

    /// Delete `name`. Deleting a missing object fails with `StoreError::NotFound`.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Whether `name` exists; absence is `Ok(false)`.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Enumerate names under `query.prefix` in backend key order.
    async fn walk_with(&self, query: &WalkQuery, visit: &mut Visitor<'_>) -> Result<()>;

    /// Store rooted at `relative` beneath this one, same options.
    fn sub_store(&self, relative: &str) -> Result<Box<dyn Store>>;

    fn base_url(&self) -> &Url;

    fn options(&self) -> &StoreOptions;

    /// Backend key for `name`.
    fn object_key(&self, name: &str) -> String;

    fn object_url(&self, name: &str) -> String;

    async fn walk(&self, prefix: &str, visit: &mut Visitor<'_>) -> Result<()> {
        self.walk_with(&WalkQuery::new(prefix), visit).await
    }

    /// Walk resumed at `starting_point` (inclusive) under `prefix`.
    async fn walk_from(&self, prefix: &str, starting_point: &str, visit: &mut Visitor<'_>) -> Result<()> {
        self.walk_with(&WalkQuery::new(prefix).starting_at(starting_point), visit).await
    }

    /// Up to `max` names under `prefix`.
    async fn list(&self, prefix: &str, max: usize) -> Result<Vec<String>> {
        let mut names = Vec::new();
        if max == 0 {
            return Ok(names);
        }
        self.walk(prefix, &mut |name: &str| {
            names.push(name.to_string());
            if names.len() >= max { Err(StoreError::StopIteration) } else { Ok(()) }
        })
        .await?;
        Ok(names)
    }

    async fn write_bytes(&self, name: &str, data: Bytes) -> Result<()> {
        self.write(name, Box::new(std::io::Cursor::new(data))).await
    }

    /// Read the whole decompressed object into memory.
    async fn read_all(&self, name: &str) -> Result<Bytes> {
        let mut reader = self.open(name).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Upload a local staging file, deleting it only once the write succeeded.
    async fn push_local_file(&self, local_path: &Path, name: &str) -> Result<()> {
        let cleanup = push_local_file(self, local_path, name).await?;
        cleanup.remove().await
    }
}

/// Pending removal of a pushed local file. Only produced after the remote
/// write completed, so dropping it keeps the file.
#[must_use]
pub struct LocalFileCleanup {
    path: std::path::PathBuf,
}

impl LocalFileCleanup {
    pub async fn remove(self) -> Result<()> {
        tokio::fs::remove_file(&self.path).await?;
        debug!("removed pushed local file {}", self.path.display());
        Ok(())
    }
}

/// Write `local_path` to `store` under `name` and hand back its cleanup.
/// On failure the local file is left where it is.
pub async fn push_local_file<S>(store: &S, local_path: &Path, name: &str) -> Result<LocalFileCleanup>
where
    S: Store + ?Sized,
{
    let file = tokio::fs::File::open(local_path).await?;
    store.write(name, Box::new(file)).await?;
    debug!("pushed {} to {}", local_path.display(), store.object_url(name));
    Ok(LocalFileCleanup { path: local_path.to_path_buf() })
}

/// Reader returned by `open`; logs when the caller drops it.
struct ClosingReader {
    inner: ObjectReader,
    target: String,
}

impl AsyncRead for ClosingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Drop for ClosingReader {
    fn drop(&mut self) {
        debug!("closing dstore file {}", self.target);
    }
}

/// Wrap an opened object so its release shows up in the logs next to the open.
pub(crate) fn closing_reader(inner: ObjectReader, target: String) -> ObjectReader {
    debug!("opening dstore file {}", target);
    Box::new(ClosingReader { inner, target })
}

/// Convenience factory that picks a backend from a base URL.
/// Supports consistent URL schemes: s3://, gs://, file://, mem://
pub async fn store_for_url(location: &str, options: StoreOptions) -> Result<Box<dyn Store>> {
    let base_url = parse_base_url(location)?;
    match infer_scheme(base_url.as_str()) {
        Scheme::S3     => Ok(Box::new(crate::s3_store::S3Store::connect(base_url, options).await?)),
        Scheme::Gcs    => Ok(Box::new(crate::gcs_store::GcsStore::connect(base_url, options).await?)),
        Scheme::File   => Ok(Box::new(crate::file_store::FileStore::new(base_url, options)?)),
        Scheme::Memory => Ok(Box::new(crate::memory_store::MemoryStore::new(base_url, options))),
        Scheme::Unknown => Err(StoreError::UnsupportedScheme(base_url.scheme().to_string())),
    }
}
