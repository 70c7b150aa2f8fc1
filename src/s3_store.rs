// src/s3_store.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! S3 backend (`s3://bucket/prefix`) on the async AWS Rust SDK.
//!
//! - write-once: `PutObject` with `If-None-Match: *`; HTTP 412 is the loser of a create race
//! - not found: `NoSuchKey` / `NotFound` service errors or a bare HTTP 404
//! - listing: `ListObjectsV2` pages; its `start_after` is exclusive, so the first
//!   page starts just before the requested offset and the walk engine trims the rest

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use crate::compression::ObjectReader;
use crate::config::StoreOptions;
use crate::constants::{
    DEFAULT_CACHE_CONTROL, DEFAULT_CONTENT_TYPE, DEFAULT_REGION, DEFAULT_S3_LIST_PAGE_SIZE,
    ENV_AWS_ENDPOINT_URL,
};
use crate::error::{Result, StoreError};
use crate::naming::{ListScope, ObjectNaming};
use crate::store::{closing_reader, Store};
use crate::walk::{walk_keys, KeyPage, KeyPager, Visitor, WalkQuery};

// Global S3 client, built once from the default provider chain.
static S3_CLIENT: OnceCell<Arc<Client>> = OnceCell::const_new();

async fn shared_client() -> Arc<Client> {
    S3_CLIENT
        .get_or_init(|| async {
            let region = RegionProviderChain::default_provider().or_else(DEFAULT_REGION);
            let sdk_config = aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load()
                .await;
            let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
            // Custom endpoints (MinIO, LocalStack) rarely support virtual-host addressing.
            if let Ok(endpoint) = std::env::var(ENV_AWS_ENDPOINT_URL) {
                info!("Using custom S3 endpoint: {}", endpoint);
                builder = builder.force_path_style(true);
            }
            info!("S3 client initialized (cached for reuse)");
            Arc::new(Client::from_conf(builder.build()))
        })
        .await
        .clone()
}

fn http_status<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|resp| resp.status().as_u16())
}

fn is_precondition_failure<E>(err: &SdkError<E, HttpResponse>) -> bool {
    http_status(err) == Some(412)
}

/// `NoSuchKey` (GET) / `NotFound` (HEAD) service errors, or a bare 404.
fn is_not_found<E: ProvideErrorMetadata>(err: &SdkError<E, HttpResponse>) -> bool {
    http_status(err) == Some(404) || matches!(err.code(), Some("NoSuchKey" | "NotFound"))
}

/// Exclusive `start_after` bound for an inclusive offset: the offset with its
/// last character replaced by its predecessor, so no earlier pages are re-read.
fn start_after_for(offset: &str) -> Option<String> {
    let mut bound = offset.to_string();
    let last = bound.pop()?;
    let prev = (last as u32)
        .checked_sub(1)
        .and_then(char::from_u32)
        .or_else(|| (last == '\u{E000}').then_some('\u{D7FF}'));
    if let Some(prev) = prev {
        bound.push(prev);
    }
    (!bound.is_empty()).then_some(bound)
}

#[derive(Clone)]
pub struct S3Store {
    naming: ObjectNaming,
    options: StoreOptions,
    client: Arc<Client>,
}

impl S3Store {
    /// Store on the process-wide S3 client.
    pub async fn connect(base_url: Url, options: StoreOptions) -> Result<Self> {
        let client = shared_client().await;
        Self::with_client(base_url, options, client)
    }

    pub fn with_client(base_url: Url, options: StoreOptions, client: Arc<Client>) -> Result<Self> {
        if base_url.scheme() != "s3" || base_url.host_str().is_none() {
            return Err(StoreError::InvalidUrl(format!("expected s3://bucket/..., got: {}", base_url)));
        }
        Ok(Self {
            naming: ObjectNaming::new(base_url, options.extension.clone()),
            options,
            client,
        })
    }

    fn bucket(&self) -> &str {
        self.naming.bucket()
    }
}

#[async_trait]
impl KeyPager for S3Store {
    async fn list_page(&self, scope: &ListScope, token: Option<String>) -> Result<KeyPage> {
        let mut req = self
            .client
            .list_objects_v2()
            .bucket(self.bucket())
            .prefix(&scope.prefix)
            .max_keys(DEFAULT_S3_LIST_PAGE_SIZE);
        match token {
            Some(token) => req = req.continuation_token(token),
            None => {
                if let Some(after) = scope.start_offset.as_deref().and_then(start_after_for) {
                    req = req.start_after(after);
                }
            }
        }
        let resp = req.send().await.map_err(StoreError::backend)?;
        let keys = resp
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(str::to_string))
            .collect::<Vec<_>>();
        let next_token = if resp.is_truncated().unwrap_or(false) {
            resp.next_continuation_token().map(str::to_string)
        } else {
            None
        };
        debug!("S3 LIST page: s3://{}/{} -> {} keys", self.bucket(), scope.prefix, keys.len());
        Ok(KeyPage { keys, next_token })
    }
}

#[async_trait]
impl Store for S3Store {
    async fn write(&self, name: &str, mut data: ObjectReader) -> Result<()> {
        let key = self.naming.object_key(name);
        let mut body = Vec::new();
        self.options.compression.compressed_copy(&mut data, &mut body).await?;
        let size = body.len();

        let mode = self.options.write_mode();
        let mut req = self
            .client
            .put_object()
            .bucket(self.bucket())
            .key(&key)
            .content_type(DEFAULT_CONTENT_TYPE)
            .cache_control(DEFAULT_CACHE_CONTROL)
            .body(ByteStream::from(body));
        if mode.is_conditional() {
            req = req.if_none_match("*");
        }
        let outcome = req.send().await.map(|_| ());
        mode.settle(&key, outcome, |e| is_precondition_failure(e))
            .map_err(StoreError::backend)?;
        debug!("S3 PUT: s3://{}/{} ({} bytes stored)", self.bucket(), key, size);
        Ok(())
    }

    async fn open(&self, name: &str) -> Result<ObjectReader> {
        let key = self.naming.object_key(name);
        match self.client.get_object().bucket(self.bucket()).key(&key).send().await {
            Ok(resp) => {
                let raw: ObjectReader = Box::new(Box::pin(resp.body.into_async_read()));
                let reader = self.options.compression.decompressed_reader(raw);
                Ok(closing_reader(reader, self.naming.object_url(name)))
            }
            Err(err) if is_not_found(&err) => Err(StoreError::NotFound(key)),
            Err(err) => Err(StoreError::backend(err)),
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        // S3 DELETE succeeds for absent keys; probe first so absence is reported.
        if !self.exists(name).await? {
            return Err(StoreError::NotFound(self.naming.object_key(name)));
        }
        let key = self.naming.object_key(name);
        self.client
            .delete_object()
            .bucket(self.bucket())
            .key(&key)
            .send()
            .await
            .map_err(StoreError::backend)?;
        debug!("S3 DELETE: s3://{}/{}", self.bucket(), key);
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let key = self.naming.object_key(name);
        match self.client.head_object().bucket(self.bucket()).key(&key).send().await {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(err) => Err(StoreError::backend(err)),
        }
    }

    async fn walk_with(&self, query: &WalkQuery, visit: &mut Visitor<'_>) -> Result<()> {
        walk_keys(self, &self.naming, query, visit).await
    }

    fn sub_store(&self, relative: &str) -> Result<Box<dyn Store>> {
        Ok(Box::new(S3Store {
            naming: self.naming.child(relative),
            options: self.options.clone(),
            client: Arc::clone(&self.client),
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

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::error::ErrorMetadata;
    use aws_sdk_s3::operation::get_object::GetObjectError;
    use aws_sdk_s3::operation::head_object::HeadObjectError;
    use aws_sdk_s3::operation::put_object::PutObjectError;
    use aws_sdk_s3::primitives::SdkBody;
    use crate::write_policy::WriteMode;

    fn response(status: u16) -> HttpResponse {
        HttpResponse::new(status.try_into().unwrap(), SdkBody::empty())
    }

    fn put_error(status: u16, code: &str) -> SdkError<PutObjectError, HttpResponse> {
        let meta = ErrorMetadata::builder().code(code).build();
        SdkError::service_error(PutObjectError::generic(meta), response(status))
    }

    #[test]
    fn test_precondition_classification() {
        assert!(is_precondition_failure(&put_error(412, "PreconditionFailed")));
        assert!(!is_precondition_failure(&put_error(409, "ConditionalRequestConflict")));
        assert!(!is_precondition_failure(&put_error(403, "AccessDenied")));
        let no_response: SdkError<PutObjectError, HttpResponse> =
            SdkError::construction_failure("bad request");
        assert!(!is_precondition_failure(&no_response));
    }

    #[test]
    fn test_create_if_absent_silences_only_412() {
        let mode = WriteMode::CreateIfAbsent;
        assert!(mode.settle("k", Err(put_error(412, "PreconditionFailed")), |e| is_precondition_failure(e)).is_ok());
        for (status, code) in [(409, "ConditionalRequestConflict"), (500, "InternalError"), (403, "AccessDenied")] {
            let err = mode
                .settle("k", Err(put_error(status, code)), |e| is_precondition_failure(e))
                .unwrap_err();
            assert_eq!(http_status(&err), Some(status));
        }
        assert!(WriteMode::Overwrite
            .settle("k", Err(put_error(412, "PreconditionFailed")), |e| is_precondition_failure(e))
            .is_err());
    }

    #[test]
    fn test_not_found_classification() {
        let no_such_key = SdkError::service_error(
            GetObjectError::generic(ErrorMetadata::builder().code("NoSuchKey").build()),
            response(404),
        );
        assert!(is_not_found(&no_such_key));

        let head_missing = SdkError::service_error(
            HeadObjectError::generic(ErrorMetadata::builder().build()),
            response(404),
        );
        assert!(is_not_found(&head_missing));

        let denied = SdkError::service_error(
            GetObjectError::generic(ErrorMetadata::builder().code("AccessDenied").build()),
            response(403),
        );
        assert!(!is_not_found(&denied));

        let dispatch: SdkError<GetObjectError, HttpResponse> = SdkError::construction_failure("no connection");
        assert!(!is_not_found(&dispatch));
    }

    #[test]
    fn test_start_after_precedes_offset() {
        assert_eq!(start_after_for("root/obj-03").as_deref(), Some("root/obj-02"));
        assert_eq!(start_after_for("root/a").as_deref(), Some("root/`"));
        // Never falls back to the scope prefix itself.
        assert!(start_after_for("root/a").unwrap().as_str() > "root/");
        assert_eq!(start_after_for("a").as_deref(), Some("`"));
        assert_eq!(start_after_for("\0"), None);
        assert_eq!(start_after_for(""), None);
        for offset in ["root/0000000300", "root/\u{E000}", "root/é"] {
            assert!(start_after_for(offset).unwrap().as_str() < offset);
        }
    }
}
