// src/file_store.rs
//
// FileStore implementation for POSIX file I/O
// This provides the same Store interface for local filesystem operations
//
// URL Mapping:
// - `file:///absolute/base` + name `a/b` + ext `.bin` -> `/absolute/base/a/b.bin`
// - backend keys are the absolute path without its leading `/`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, trace};
use url::Url;

use crate::compression::ObjectReader;
use crate::config::StoreOptions;
use crate::constants::FILE_STAGING_PREFIX;
use crate::error::{Result, StoreError};
use crate::naming::{ListScope, ObjectNaming};
use crate::store::{closing_reader, Store};
use crate::walk::{walk_keys, KeyPage, KeyPager, Visitor, WalkQuery};
use crate::write_policy::WriteMode;

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// Local filesystem backend.
///
/// Writes are staged in a hidden sibling file and committed with `rename`
/// (overwrite) or `hard_link` (write-once: the link fails with `AlreadyExists`
/// when the target is present). Readers never observe partial objects.
///
/// Listing follows symlinks to regular files but does not descend into
/// symlinked directories; dangling links are skipped.
#[derive(Debug, Clone)]
pub struct FileStore {
    naming: ObjectNaming,
    options: StoreOptions,
}

impl FileStore {
    pub fn new(base_url: Url, options: StoreOptions) -> Result<Self> {
        if base_url.scheme() != "file" {
            return Err(StoreError::InvalidUrl(format!(
                "FileStore expects file:// URL, got: {}",
                base_url
            )));
        }
        Ok(Self {
            naming: ObjectNaming::new(base_url, options.extension.clone()),
            options,
        })
    }

    /// Filesystem path for a backend key.
    fn key_path(key: &str) -> PathBuf {
        Path::new("/").join(key)
    }

    fn staging_path(target: &Path) -> PathBuf {
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
        target.with_file_name(format!(
            "{}{}.{}.{}.{}",
            FILE_STAGING_PREFIX,
            file_name,
            std::process::id(),
            nanos,
            seq
        ))
    }

    async fn stage(&self, data: &mut ObjectReader, staging: &Path) -> Result<()> {
        let mut file = fs::File::create(staging).await?;
        self.options.compression.compressed_copy(data, &mut file).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn commit(mode: WriteMode, staging: &Path, target: &Path) -> std::io::Result<()> {
        match mode {
            WriteMode::Overwrite => fs::rename(staging, target).await,
            WriteMode::CreateIfAbsent => {
                let linked = fs::hard_link(staging, target).await;
                remove_if_present(staging).await?;
                linked
            }
        }
    }

    /// Recursively collect keys under `dir` that can match `prefix`.
    async fn collect_keys(dir: &Path, prefix: &str, results: &mut Vec<String>) -> Result<()> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let entry_path = entry.path();
            let Some(key) = entry_path.strip_prefix("/").ok().and_then(|p| p.to_str()) else {
                continue;
            };
            let mut file_type = entry.file_type().await?;
            if file_type.is_symlink() {
                // Linked files are listed; linked directories are not descended.
                match fs::metadata(&entry_path).await {
                    Ok(meta) if meta.is_file() => file_type = meta.file_type(),
                    Ok(_) => continue,
                    Err(e) if e.kind() == ErrorKind::NotFound => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            if file_type.is_dir() {
                let dir_key = format!("{}/", key);
                if dir_key.starts_with(prefix) || prefix.starts_with(&dir_key) {
                    Box::pin(Self::collect_keys(&entry_path, prefix, results)).await?;
                }
            } else if file_type.is_file() {
                let staging = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|n| n.starts_with(FILE_STAGING_PREFIX));
                if !staging && key.starts_with(prefix) {
                    results.push(key.to_string());
                }
            }
        }
        Ok(())
    }
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[async_trait]
impl KeyPager for FileStore {
    async fn list_page(&self, scope: &ListScope, _token: Option<String>) -> Result<KeyPage> {
        // Scan from the deepest directory the prefix fully names.
        let dir_key = match scope.prefix.rfind('/') {
            Some(idx) => &scope.prefix[..=idx],
            None => "",
        };
        let mut keys = Vec::new();
        Self::collect_keys(&Self::key_path(dir_key), &scope.prefix, &mut keys).await?;
        if let Some(start) = &scope.start_offset {
            keys.retain(|k| k.as_str() >= start.as_str());
        }
        keys.sort();
        trace!("file list: {} keys under {:?}", keys.len(), scope.prefix);
        Ok(KeyPage { keys, next_token: None })
    }
}

#[async_trait]
impl Store for FileStore {
    async fn write(&self, name: &str, mut data: ObjectReader) -> Result<()> {
        let key = self.naming.object_key(name);
        let target = Self::key_path(&key);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let staging = Self::staging_path(&target);
        if let Err(e) = self.stage(&mut data, &staging).await {
            let _ = remove_if_present(&staging).await;
            return Err(e);
        }

        let mode = self.options.write_mode();
        let committed = Self::commit(mode, &staging, &target).await;
        if committed.is_err() {
            let _ = remove_if_present(&staging).await;
        }
        mode.settle(&key, committed, |e| e.kind() == ErrorKind::AlreadyExists)?;
        debug!("file write: {}", target.display());
        Ok(())
    }

    async fn open(&self, name: &str) -> Result<ObjectReader> {
        let key = self.naming.object_key(name);
        let path = Self::key_path(&key);
        let file = match fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound(key)),
            Err(e) => return Err(e.into()),
        };
        if !file.metadata().await?.is_file() {
            return Err(StoreError::NotFound(key));
        }
        let reader = self.options.compression.decompressed_reader(Box::new(file));
        Ok(closing_reader(reader, path.display().to_string()))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let key = self.naming.object_key(name);
        match fs::remove_file(Self::key_path(&key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        match fs::metadata(Self::key_path(&self.naming.object_key(name))).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn walk_with(&self, query: &WalkQuery, visit: &mut Visitor<'_>) -> Result<()> {
        walk_keys(self, &self.naming, query, visit).await
    }

    fn sub_store(&self, relative: &str) -> Result<Box<dyn Store>> {
        Ok(Box::new(FileStore {
            naming: self.naming.child(relative),
            options: self.options.clone(),
        }))
    }

    fn base_url(&self) -> &Url {
        self.naming.base_url()
    }

    fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn object_key(&self, name: &str) -> String {
        self.naming.object_key(name)
    }

    fn object_url(&self, name: &str) -> String {
        self.naming.object_url(name)
    }
}
