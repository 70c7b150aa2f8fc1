// src/walk.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Prefix-scoped, resumable, page-streaming enumeration shared by all backends.
//!
//! A backend only implements [`KeyPager`]: fetch one page of keys for a
//! [`ListScope`] given an opaque continuation token. [`walk_keys`] drives the
//! pages, maps keys back to logical names and calls the visitor strictly in
//! order. A visitor returning [`StoreError::StopIteration`] ends the walk with
//! `Ok(())`.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Result, StoreError};
use crate::naming::{ListScope, ObjectNaming};

/// Per-object callback. Return `Err(StoreError::StopIteration)` to stop early.
pub type Visitor<'a> = dyn FnMut(&str) -> Result<()> + Send + 'a;

/// One page of backend keys in native (lexicographic) order.
#[derive(Debug, Default, Clone)]
pub struct KeyPage {
    pub keys: Vec<String>,
    pub next_token: Option<String>,
}

/// Paginated key listing, implemented once per backend.
#[async_trait]
pub trait KeyPager: Send + Sync {
    /// Keys starting with `scope.prefix`. Backends should apply
    /// `scope.start_offset` natively when they can; the engine filters again.
    async fn list_page(&self, scope: &ListScope, token: Option<String>) -> Result<KeyPage>;
}

/// Parameters of a walk.
#[derive(Debug, Clone, Default)]
pub struct WalkQuery {
    pub prefix: String,
    pub starting_point: Option<String>,
    pub cancel: Option<CancellationToken>,
}

impl WalkQuery {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), ..Default::default() }
    }

    pub fn starting_at(mut self, starting_point: impl Into<String>) -> Self {
        self.starting_point = Some(starting_point.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(StoreError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Drive `pager` to completion (or early stop) for `query`.
pub async fn walk_keys(
    pager: &dyn KeyPager,
    naming: &ObjectNaming,
    query: &WalkQuery,
    visit: &mut Visitor<'_>,
) -> Result<()> {
    let scope = naming.list_scope(&query.prefix, query.starting_point.as_deref());
    debug!("walk: bucket={} prefix={:?} start={:?}", naming.bucket(), scope.prefix, scope.start_offset);

    let mut token: Option<String> = None;
    let mut pages = 0usize;
    let mut visited = 0usize;
    loop {
        query.check_cancelled()?;
        let fetch = pager.list_page(&scope, token.take());
        let page = match &query.cancel {
            Some(cancel) => tokio::select! {
                _ = cancel.cancelled() => return Err(StoreError::Cancelled),
                page = fetch => page?,
            },
            None => fetch.await?,
        };
        pages += 1;

        for key in &page.keys {
            if let Some(start) = &scope.start_offset {
                if key.as_str() < start.as_str() {
                    continue;
                }
            }
            query.check_cancelled()?;
            trace!("walk: visiting {}", key);
            match visit(naming.key_to_name(key)) {
                Ok(()) => visited += 1,
                Err(StoreError::StopIteration) => {
                    debug!("walk: stopped by caller after {} objects", visited + 1);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }

        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    debug!("walk: done, {} objects in {} pages", visited, pages);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use url::Url;

    /// Serves a fixed sorted key set two keys per page; records each request.
    struct FakePager {
        keys: Vec<String>,
        requests: Mutex<Vec<(ListScope, Option<String>)>>,
    }

    impl FakePager {
        fn new(keys: &[&str]) -> Self {
            let mut keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
            keys.sort();
            Self { keys, requests: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl KeyPager for FakePager {
        async fn list_page(&self, scope: &ListScope, token: Option<String>) -> Result<KeyPage> {
            self.requests.lock().unwrap().push((scope.clone(), token.clone()));
            let matching: Vec<&String> = self
                .keys
                .iter()
                .filter(|k| k.starts_with(&scope.prefix))
                .filter(|k| token.as_ref().map_or(true, |t| k.as_str() > t.as_str()))
                .collect();
            let keys: Vec<String> = matching.iter().take(2).map(|k| k.to_string()).collect();
            let next_token = if matching.len() > 2 { keys.last().cloned() } else { None };
            Ok(KeyPage { keys, next_token })
        }
    }

    fn naming() -> ObjectNaming {
        ObjectNaming::new(Url::parse("gs://bkt/root").unwrap(), ".bin")
    }

    #[tokio::test]
    async fn test_walk_maps_names_across_pages() {
        let pager = FakePager::new(&["root/a.bin", "root/b.bin", "root/c.bin", "root/d/e.bin", "other/x.bin"]);
        let mut seen = Vec::new();
        walk_keys(&pager, &naming(), &WalkQuery::new(""), &mut |n: &str| {
            seen.push(n.to_string());
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(seen, vec!["a", "b", "c", "d/e"]);
        assert_eq!(pager.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_walk_filters_below_start_offset() {
        // The pager ignores start_offset entirely; the engine must still honour it.
        let pager = FakePager::new(&["root/a.bin", "root/b.bin", "root/c.bin"]);
        let mut seen = Vec::new();
        walk_keys(&pager, &naming(), &WalkQuery::new("").starting_at("b"), &mut |n: &str| {
            seen.push(n.to_string());
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(seen, vec!["b", "c"]);
        let requests = pager.requests.lock().unwrap();
        assert_eq!(requests[0].0.start_offset.as_deref(), Some("root/b"));
    }

    #[tokio::test]
    async fn test_callback_error_propagates() {
        let pager = FakePager::new(&["root/a.bin", "root/b.bin"]);
        let err = walk_keys(&pager, &naming(), &WalkQuery::new(""), &mut |_n: &str| {
            Err(anyhow::anyhow!("visitor exploded").into())
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("visitor exploded"));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_page() {
        let pager = FakePager::new(&["root/a.bin"]);
        let token = CancellationToken::new();
        token.cancel();
        let mut calls = 0;
        let err = walk_keys(&pager, &naming(), &WalkQuery::new("").with_cancel(token), &mut |_n: &str| {
            calls += 1;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::Cancelled));
        assert_eq!(calls, 0);
        assert!(pager.requests.lock().unwrap().is_empty());
    }
}
