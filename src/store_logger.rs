// src/store_logger.rs
//
// Copyright, 2025. Signal65 / Futurum Group.
//
//! Logging wrapper for the Store trait to enable op-log tracing for all backends.
//!
//! The logger is an injected collaborator: wrap any store in a [`LoggedStore`]
//! with the [`OpLogger`] of your choice. Nothing is recorded globally, so tests
//! can substitute a [`RecordingOpLogger`] and assert on exactly what happened.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::compression::ObjectReader;
use crate::config::StoreOptions;
use crate::error::Result;
use crate::store::Store;
use crate::walk::{Visitor, WalkQuery};

/// One completed store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpEntry {
    pub operation: &'static str,
    /// Object URL, or the base URL plus prefix for enumerations.
    pub target: String,
    /// Objects touched (visited, for walks).
    pub num_objects: u64,
    pub duration: Duration,
    pub error: Option<String>,
}

/// Sink for operation records.
pub trait OpLogger: Send + Sync {
    fn log(&self, entry: OpEntry);
}

/// Emits every operation as a `tracing` event; failures at WARN.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingOpLogger;

impl OpLogger for TracingOpLogger {
    fn log(&self, entry: OpEntry) {
        match &entry.error {
            None => debug!(
                op = entry.operation,
                target = %entry.target,
                objects = entry.num_objects,
                micros = entry.duration.as_micros() as u64,
                "store op"
            ),
            Some(err) => warn!(
                op = entry.operation,
                target = %entry.target,
                micros = entry.duration.as_micros() as u64,
                error = %err,
                "store op failed"
            ),
        }
    }
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct RecordingOpLogger {
    entries: Mutex<Vec<OpEntry>>,
}

impl RecordingOpLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<OpEntry> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn operations(&self) -> Vec<&'static str> {
        self.entries().iter().map(|e| e.operation).collect()
    }
}

impl OpLogger for RecordingOpLogger {
    fn log(&self, entry: OpEntry) {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).push(entry);
    }
}

/// Wrapper that reports every Store call to an [`OpLogger`] and then
/// delegates to the inner store. Sub-stores are wrapped with the same logger.
pub struct LoggedStore {
    inner: Arc<dyn Store>,
    logger: Arc<dyn OpLogger>,
}

impl LoggedStore {
    pub fn new(inner: Arc<dyn Store>, logger: Arc<dyn OpLogger>) -> Self {
        Self { inner, logger }
    }

    fn record<T>(
        &self,
        operation: &'static str,
        target: String,
        num_objects: u64,
        started: Instant,
        result: &Result<T>,
    ) {
        self.logger.log(OpEntry {
            operation,
            target,
            num_objects,
            duration: started.elapsed(),
            error: result.as_ref().err().map(|e| e.to_string()),
        });
    }

    fn prefix_target(&self, prefix: &str) -> String {
        format!("{}/{}", self.inner.base_url().as_str().trim_end_matches('/'), prefix)
    }
}

#[async_trait]
impl Store for LoggedStore {
    async fn write(&self, name: &str, data: ObjectReader) -> Result<()> {
        let started = Instant::now();
        let result = self.inner.write(name, data).await;
        self.record("WRITE", self.inner.object_url(name), 1, started, &result);
        result
    }

    async fn open(&self, name: &str) -> Result<ObjectReader> {
        let started = Instant::now();
        let result = self.inner.open(name).await;
        self.record("OPEN", self.inner.object_url(name), 1, started, &result);
        result
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let started = Instant::now();
        let result = self.inner.delete(name).await;
        self.record("DELETE", self.inner.object_url(name), 1, started, &result);
        result
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let started = Instant::now();
        let result = self.inner.exists(name).await;
        let found = matches!(result, Ok(true)) as u64;
        self.record("EXISTS", self.inner.object_url(name), found, started, &result);
        result
    }

    async fn walk_with(&self, query: &WalkQuery, visit: &mut Visitor<'_>) -> Result<()> {
        let started = Instant::now();
        let mut visited = 0u64;
        let result = {
            let mut counting = |name: &str| {
                visited += 1;
                visit(name)
            };
            self.inner.walk_with(query, &mut counting).await
        };
        self.record("WALK", self.prefix_target(&query.prefix), visited, started, &result);
        result
    }

    fn sub_store(&self, relative: &str) -> Result<Box<dyn Store>> {
        let inner: Arc<dyn Store> = Arc::from(self.inner.sub_store(relative)?);
        Ok(Box::new(LoggedStore::new(inner, Arc::clone(&self.logger))))
    }

    fn base_url(&self) -> &Url {
        self.inner.base_url()
    }

    fn options(&self) -> &StoreOptions {
        self.inner.options()
    }

    fn object_key(&self, name: &str) -> String {
        self.inner.object_key(name)
    }

    fn object_url(&self, name: &str) -> String {
        self.inner.object_url(name)
    }

    async fn push_local_file(&self, local_path: &Path, name: &str) -> Result<()> {
        let started = Instant::now();
        let result = async {
            let cleanup = crate::store::push_local_file(self, local_path, name).await?;
            cleanup.remove().await
        }
        .await;
        self.record("PUSH", self.inner.object_url(name), 1, started, &result);
        result
    }
}
