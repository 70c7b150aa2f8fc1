// src/naming.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Mapping between logical object names, backend keys and external URLs.
//!
//! A store rooted at `gs://bucket/data/v1` with extension `.dbin` maps the
//! logical name `0001/blocks` to:
//!   - key `data/v1/0001/blocks.dbin` (bucket-relative, no leading `/`)
//!   - url `gs://bucket/data/v1/0001/blocks.dbin`
//!
//! Keys observed while listing are mapped back by stripping the extension and
//! the base path. That inverse is only meaningful for keys this store produced.

use std::borrow::Cow;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

/// Characters escaped when a decoded path goes back into a URL; `%` included
/// so literal percent signs in names survive the round trip.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Path/name codec for one base location and extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectNaming {
    base_url: Url,
    extension: String,
}

/// Prefix and lower bound handed to a backend listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListScope {
    pub prefix: String,
    pub start_offset: Option<String>,
}

impl ObjectNaming {
    pub fn new(base_url: Url, extension: impl Into<String>) -> Self {
        Self { base_url, extension: extension.into() }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Bucket (or container / memory namespace) named by the base URL host.
    pub fn bucket(&self) -> &str {
        self.base_url.host_str().unwrap_or("")
    }

    /// Decoded base path with leading separators stripped, e.g. `data/v1`.
    /// `file:///tmp/my%20dir` yields `tmp/my dir`.
    pub fn base_path(&self) -> Cow<'_, str> {
        let path = self.base_url.path().trim_start_matches('/');
        percent_decode_str(path).decode_utf8_lossy()
    }

    fn with_ext(&self, name: &str) -> String {
        format!("{}{}", name, self.extension)
    }

    /// Backend key for a logical name.
    pub fn object_key(&self, name: &str) -> String {
        join_clean(&[&*self.base_path(), &self.with_ext(name)])
    }

    /// Externally dereferenceable address for a logical name.
    pub fn object_url(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            self.with_ext(name).trim_start_matches('/')
        )
    }

    /// Logical name for a key produced by `object_key`.
    pub fn key_to_name<'a>(&self, key: &'a str) -> &'a str {
        let stem = key.strip_suffix(self.extension.as_str()).unwrap_or(key);
        let base_path = self.base_path();
        let base = base_path.trim_end_matches('/');
        if base.is_empty() {
            return stem;
        }
        stem.strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(stem)
    }

    /// Listing scope for a walk under `prefix`, optionally resumed at `starting_point`.
    ///
    /// A prefix ending in `/` keeps that separator so `logs/` never matches `logs-old/...`.
    pub fn list_scope(&self, prefix: &str, starting_point: Option<&str>) -> ListScope {
        let base = self.base_path();
        let mut scope = if base.is_empty() {
            String::new()
        } else {
            format!("{}/", base.trim_end_matches('/'))
        };
        if !prefix.is_empty() {
            scope = join_clean(&[&scope, prefix]);
            if prefix.ends_with('/') {
                scope.push('/');
            }
        }
        let start_offset = starting_point
            .filter(|s| !s.is_empty())
            .map(|s| join_clean(&[&scope, s]));
        ListScope { prefix: scope, start_offset }
    }

    /// Naming for `relative` beneath this base, same extension.
    /// `relative` is a plain (decoded) path; it is escaped into the new URL.
    pub fn child(&self, relative: &str) -> Self {
        let mut url = self.base_url.clone();
        let joined = join_clean(&[&*self.base_path(), relative]);
        let encoded = joined
            .split('/')
            .filter(|seg| !seg.is_empty() && *seg != ".")
            .map(|seg| utf8_percent_encode(seg, PATH_SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/");
        url.set_path(&format!("/{}", encoded));
        Self::new(url, self.extension.clone())
    }
}

/// Join non-empty elements with `/` and clean the result.
pub fn join_clean(parts: &[&str]) -> String {
    let joined = parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/");
    if joined.is_empty() {
        return joined;
    }
    clean_path(&joined)
}

/// Lexical path cleaning: collapses repeated separators, `.` and `..`
/// segments and drops any trailing separator.
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if matches!(out.last(), Some(last) if *last != "..") {
                    out.pop();
                } else if !rooted {
                    out.push("..");
                }
            }
            s => out.push(s),
        }
    }
    let body = out.join("/");
    match (rooted, body.is_empty()) {
        (true, _) => format!("/{}", body),
        (false, true) => ".".to_string(),
        (false, false) => body,
    }
}
