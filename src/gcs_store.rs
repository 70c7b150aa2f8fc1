// src/gcs_store.rs
//
// Google Cloud Storage backend (gs://bucket/prefix) using the gcloud-storage crate.
// Authentication follows the Application Default Credentials chain unless an
// emulator endpoint is configured.

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use gcloud_storage::client::{Client, ClientConfig};
use gcloud_storage::http::Error as GcsError;
use gcloud_storage::http::objects::delete::DeleteObjectRequest;
use gcloud_storage::http::objects::download::Range;
use gcloud_storage::http::objects::get::GetObjectRequest;
use gcloud_storage::http::objects::list::ListObjectsRequest;
use gcloud_storage::http::objects::upload::{UploadObjectRequest, UploadType};
use gcloud_storage::http::objects::Object;
use tokio::sync::OnceCell;
use tokio_util::io::StreamReader;
use tracing::{debug, info};
use url::Url;

use crate::compression::ObjectReader;
use crate::config::StoreOptions;
use crate::constants::{
    DEFAULT_CACHE_CONTROL, DEFAULT_CONTENT_TYPE, ENV_GCS_ENDPOINT_URL, ENV_STORAGE_EMULATOR_HOST,
};
use crate::error::{Result, StoreError};
use crate::naming::{ListScope, ObjectNaming};
use crate::store::{closing_reader, Store};
use crate::walk::{walk_keys, KeyPage, KeyPager, Visitor, WalkQuery};

// Global cached GCS client - initialized once and reused across all stores
static GCS_CLIENT: OnceCell<Arc<Client>> = OnceCell::const_new();

/// Build (once) the process-wide client.
///
/// Supports custom endpoints for local emulators and proxies:
/// - `GCS_ENDPOINT_URL`: full endpoint URL (e.g. http://localhost:4443)
/// - `STORAGE_EMULATOR_HOST`: host:port, `http://` prepended if missing
///
/// A custom endpoint implies anonymous access.
async fn shared_client() -> Result<Arc<Client>> {
    let client = GCS_CLIENT
        .get_or_try_init(|| async {
            let custom_endpoint = std::env::var(ENV_GCS_ENDPOINT_URL).ok().or_else(|| {
                std::env::var(ENV_STORAGE_EMULATOR_HOST).ok().map(|host| {
                    if host.starts_with("http://") || host.starts_with("https://") {
                        host
                    } else {
                        format!("http://{}", host)
                    }
                })
            });

            let config = match custom_endpoint {
                Some(endpoint) => {
                    info!("Using custom GCS endpoint: {}", endpoint);
                    ClientConfig { storage_endpoint: endpoint, ..ClientConfig::default() }.anonymous()
                }
                None => {
                    debug!("Initializing GCS client with Application Default Credentials");
                    ClientConfig::default()
                        .with_auth()
                        .await
                        .map_err(|e| anyhow::anyhow!("failed to initialize GCS authentication: {}", e))?
                }
            };
            info!("GCS client initialized (cached for reuse)");
            Ok::<Arc<Client>, StoreError>(Arc::new(Client::new(config)))
        })
        .await?;
    Ok(Arc::clone(client))
}

fn http_status(err: &GcsError) -> Option<u16> {
    match err {
        GcsError::Response(resp) => Some(resp.code),
        _ => None,
    }
}

fn is_precondition_failure(err: &GcsError) -> bool {
    http_status(err) == Some(412)
}

fn is_not_found(err: &GcsError) -> bool {
    http_status(err) == Some(404)
}

/// Metadata carried by every uploaded object.
fn upload_metadata(key: &str) -> Object {
    Object {
        name: key.to_string(),
        content_type: Some(DEFAULT_CONTENT_TYPE.to_string()),
        cache_control: Some(DEFAULT_CACHE_CONTROL.to_string()),
        ..Default::default()
    }
}

#[derive(Clone)]
pub struct GcsStore {
    naming: ObjectNaming,
    options: StoreOptions,
    client: Arc<Client>,
}

impl GcsStore {
    pub async fn connect(base_url: Url, options: StoreOptions) -> Result<Self> {
        let client = shared_client().await?;
        Self::with_client(base_url, options, client)
    }

    pub fn with_client(base_url: Url, options: StoreOptions, client: Arc<Client>) -> Result<Self> {
        if base_url.scheme() != "gs" || base_url.host_str().is_none() {
            return Err(StoreError::InvalidUrl(format!("expected gs://bucket/..., got: {}", base_url)));
        }
        Ok(Self {
            naming: ObjectNaming::new(base_url, options.extension.clone()),
            options,
            client,
        })
    }

    fn get_request(&self, key: &str) -> GetObjectRequest {
        GetObjectRequest {
            bucket: self.naming.bucket().to_string(),
            object: key.to_string(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl KeyPager for GcsStore {
    async fn list_page(&self, scope: &ListScope, token: Option<String>) -> Result<KeyPage> {
        let request = ListObjectsRequest {
            bucket: self.naming.bucket().to_string(),
            prefix: Some(scope.prefix.clone()),
            start_offset: scope.start_offset.clone(),
            page_token: token,
            ..Default::default()
        };
        let response = self.client.list_objects(&request).await.map_err(StoreError::backend)?;
        let keys: Vec<String> = response
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|obj| obj.name)
            .collect();
        debug!("GCS LIST page: gs://{}/{} -> {} keys", request.bucket, scope.prefix, keys.len());
        Ok(KeyPage { keys, next_token: response.next_page_token })
    }
}

#[async_trait]
impl Store for GcsStore {
    async fn write(&self, name: &str, mut data: ObjectReader) -> Result<()> {
        let key = self.naming.object_key(name);
        let mut body = Vec::new();
        self.options.compression.compressed_copy(&mut data, &mut body).await?;
        let size = body.len();

        let mode = self.options.write_mode();
        let request = UploadObjectRequest {
            bucket: self.naming.bucket().to_string(),
            // generation 0 only matches an absent object
            if_generation_match: mode.is_conditional().then_some(0),
            ..Default::default()
        };
        // Multipart upload so content-type and cache-control travel with the body.
        let upload_type = UploadType::Multipart(Box::new(upload_metadata(&key)));
        let outcome = self
            .client
            .upload_object(&request, body, &upload_type)
            .await
            .map(|_| ());
        mode.settle(&key, outcome, is_precondition_failure)
            .map_err(StoreError::backend)?;
        debug!("GCS PUT: gs://{}/{} ({} bytes stored)", self.naming.bucket(), key, size);
        Ok(())
    }

    async fn open(&self, name: &str) -> Result<ObjectReader> {
        let key = self.naming.object_key(name);
        let stream = match self
            .client
            .download_streamed_object(&self.get_request(&key), &Range::default())
            .await
        {
            Ok(stream) => stream,
            Err(err) if is_not_found(&err) => return Err(StoreError::NotFound(key)),
            Err(err) => return Err(StoreError::backend(err)),
        };
        let stream = stream.map_err(std::io::Error::other);
        let raw: ObjectReader = Box::new(StreamReader::new(Box::pin(stream)));
        let reader = self.options.compression.decompressed_reader(raw);
        Ok(closing_reader(reader, self.naming.object_url(name)))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let key = self.naming.object_key(name);
        let request = DeleteObjectRequest {
            bucket: self.naming.bucket().to_string(),
            object: key.clone(),
            ..Default::default()
        };
        match self.client.delete_object(&request).await {
            Ok(()) => Ok(()),
            Err(err) if is_not_found(&err) => Err(StoreError::NotFound(key)),
            Err(err) => Err(StoreError::backend(err)),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let key = self.naming.object_key(name);
        match self.client.get_object(&self.get_request(&key)).await {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(err) => Err(StoreError::backend(err)),
        }
    }

    async fn walk_with(&self, query: &WalkQuery, visit: &mut Visitor<'_>) -> Result<()> {
        walk_keys(self, &self.naming, query, visit).await
    }

    fn sub_store(&self, relative: &str) -> Result<Box<dyn Store>> {
        Ok(Box::new(GcsStore {
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
