// src/config.rs
//
// Store construction options. Fixed for the lifetime of a store and
// inherited unchanged by its sub-stores.

use crate::compression::CompressionConfig;
use crate::constants::{ENV_COMPRESSION, ENV_EXTENSION, ENV_OVERWRITE};
use crate::error::Result;
use crate::write_policy::WriteMode;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOptions {
    pub extension:   String,            // appended to every logical name, may be empty
    pub compression: CompressionConfig, // applied to every object body
    pub overwrite:   bool,              // false => write-once
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn write_mode(&self) -> WriteMode {
        WriteMode::from_overwrite(self.overwrite)
    }

    /// Options from `DSTORE_EXTENSION`, `DSTORE_COMPRESSION`, `DSTORE_OVERWRITE`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let extension = lookup(ENV_EXTENSION).unwrap_or_default();
        let compression = match lookup(ENV_COMPRESSION) {
            Some(s) => s.parse()?,
            None => CompressionConfig::None,
        };
        let overwrite = lookup(ENV_OVERWRITE)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Ok(Self { extension, compression, overwrite })
    }
}
