// src/memory_store.rs
//
// In-process backend (mem://namespace/path). Objects live in a sorted map
// shared by a store and every sub-store derived from it, so sub-stores see
// the same "bucket". Listing pages are kept small and configurable to make
// pagination observable.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use url::Url;

use crate::compression::ObjectReader;
use crate::config::StoreOptions;
use crate::constants::DEFAULT_MEMORY_PAGE_SIZE;
use crate::error::{Result, StoreError};
use crate::naming::{ListScope, ObjectNaming};
use crate::store::{closing_reader, Store};
use crate::walk::{walk_keys, KeyPage, KeyPager, Visitor, WalkQuery};

type Objects = Arc<Mutex<BTreeMap<String, Bytes>>>;

#[derive(Clone)]
pub struct MemoryStore {
    naming: ObjectNaming,
    options: StoreOptions,
    objects: Objects,
    page_size: usize,
}

impl MemoryStore {
    pub fn new(base_url: Url, options: StoreOptions) -> Self {
        Self {
            naming: ObjectNaming::new(base_url, options.extension.clone()),
            options,
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            page_size: DEFAULT_MEMORY_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Number of stored objects across the whole namespace.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Raw (still compressed) bytes stored under a backend key.
    pub fn raw_object(&self, key: &str) -> Option<Bytes> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Bytes>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn put(&self, key: &str, body: Bytes) -> Result<()> {
        let mut objects = self.lock();
        if !self.options.overwrite && objects.contains_key(key) {
            return Err(StoreError::PreconditionFailed(key.to_string()));
        }
        objects.insert(key.to_string(), body);
        Ok(())
    }
}

#[async_trait]
impl KeyPager for MemoryStore {
    async fn list_page(&self, scope: &ListScope, token: Option<String>) -> Result<KeyPage> {
        let lower = match (token, &scope.start_offset) {
            (Some(t), _) => Bound::Excluded(t),
            (None, Some(start)) => Bound::Included(start.clone()),
            (None, None) => Bound::Included(scope.prefix.clone()),
        };
        let objects = self.lock();
        let mut keys: Vec<String> = objects
            .range::<String, _>((lower, Bound::Unbounded))
            .map(|(k, _)| k)
            .skip_while(|k| !k.starts_with(&scope.prefix) && k.as_str() < scope.prefix.as_str())
            .take_while(|k| k.starts_with(&scope.prefix))
            .take(self.page_size + 1)
            .cloned()
            .collect();
        let next_token = if keys.len() > self.page_size {
            keys.truncate(self.page_size);
            keys.last().cloned()
        } else {
            None
        };
        Ok(KeyPage { keys, next_token })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn write(&self, name: &str, mut data: ObjectReader) -> Result<()> {
        let key = self.naming.object_key(name);
        let mut body = Vec::new();
        self.options.compression.compressed_copy(&mut data, &mut body).await?;
        let outcome = self.put(&key, Bytes::from(body));
        self.options
            .write_mode()
            .settle(&key, outcome, |e| matches!(e, StoreError::PreconditionFailed(_)))?;
        debug!("mem write: {}", key);
        Ok(())
    }

    async fn open(&self, name: &str) -> Result<ObjectReader> {
        let key = self.naming.object_key(name);
        let body = self.raw_object(&key).ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let raw: ObjectReader = Box::new(std::io::Cursor::new(body));
        let reader = self.options.compression.decompressed_reader(raw);
        Ok(closing_reader(reader, self.naming.object_url(name)))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let key = self.naming.object_key(name);
        match self.lock().remove(&key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(key)),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.lock().contains_key(&self.naming.object_key(name)))
    }

    async fn walk_with(&self, query: &WalkQuery, visit: &mut Visitor<'_>) -> Result<()> {
        walk_keys(self, &self.naming, query, visit).await
    }

    fn sub_store(&self, relative: &str) -> Result<Box<dyn Store>> {
        Ok(Box::new(MemoryStore {
            naming: self.naming.child(relative),
            options: self.options.clone(),
            objects: Arc::clone(&self.objects),
            page_size: self.page_size,
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
