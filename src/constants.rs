// src/constants.rs
//
// Centralized constants for dstore to avoid hardcoded values throughout the codebase

/// Buffer size used when pumping a caller stream through the compressor (256 KB)
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 256 * 1024;

/// Default zstd level when a scheme is given without one (`zstd`)
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Content type stamped on uploaded objects
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Cache-Control stamped on uploaded objects
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=86400";

/// Page size for the in-memory backend listing
pub const DEFAULT_MEMORY_PAGE_SIZE: usize = 1000;

/// Page size requested from S3 ListObjectsV2 (the service maximum)
pub const DEFAULT_S3_LIST_PAGE_SIZE: i32 = 1000;

/// Fallback region when the AWS provider chain yields none
pub const DEFAULT_REGION: &str = "us-east-1";

/// Prefix of the hidden staging files the filesystem backend writes through
pub const FILE_STAGING_PREFIX: &str = ".dstore-staging-";

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Logical file extension appended to every object name
pub const ENV_EXTENSION: &str = "DSTORE_EXTENSION";

/// Compression scheme: "none", "zstd" or "zstd:<level>"
pub const ENV_COMPRESSION: &str = "DSTORE_COMPRESSION";

/// "true"/"1" to allow overwriting existing objects
pub const ENV_OVERWRITE: &str = "DSTORE_OVERWRITE";

/// Custom S3 endpoint (MinIO, LocalStack, ...)
pub const ENV_AWS_ENDPOINT_URL: &str = "AWS_ENDPOINT_URL";

/// Full GCS endpoint URL (e.g. http://localhost:4443)
pub const ENV_GCS_ENDPOINT_URL: &str = "GCS_ENDPOINT_URL";

/// GCS emulator convention: host:port
pub const ENV_STORAGE_EMULATOR_HOST: &str = "STORAGE_EMULATOR_HOST";
