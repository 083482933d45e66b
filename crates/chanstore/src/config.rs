//! Store configuration.

use serde::Deserialize;
use thiserror::Error;

use chanstore_core::Limits;

/// Default number of versions a channel may hold.
pub const DEFAULT_MAX_VERSIONS_PER_CHANNEL: usize = 100;

/// Default maximum manifest size: 5 MiB.
pub const DEFAULT_MAX_CONTENT_BYTES: usize = 5 * 1024 * 1024;

/// Default number of object deletes in flight during a channel cascade.
pub const DEFAULT_DELETE_CONCURRENCY: usize = 5;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("object store bucket name must not be empty")]
    EmptyBucket,
}

/// Object store settings. Present means new versions go to the object store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObjectStoreConfig {
    pub bucket: String,
}

/// Configuration for the channel version store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub max_versions_per_channel: usize,
    pub max_content_bytes: usize,
    pub delete_concurrency: usize,
    pub object_store: Option<ObjectStoreConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_versions_per_channel: DEFAULT_MAX_VERSIONS_PER_CHANNEL,
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
            delete_concurrency: DEFAULT_DELETE_CONCURRENCY,
            object_store: None,
        }
    }
}

impl StoreConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: StoreConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Route new versions to the given bucket.
    pub fn with_object_store(mut self, bucket: impl Into<String>) -> Self {
        self.object_store = Some(ObjectStoreConfig {
            bucket: bucket.into(),
        });
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_versions_per_channel == 0 {
            return Err(ConfigError::Zero {
                field: "max_versions_per_channel",
            });
        }
        if self.max_content_bytes == 0 {
            return Err(ConfigError::Zero {
                field: "max_content_bytes",
            });
        }
        if self.delete_concurrency == 0 {
            return Err(ConfigError::Zero {
                field: "delete_concurrency",
            });
        }
        if let Some(os) = &self.object_store {
            if os.bucket.trim().is_empty() {
                return Err(ConfigError::EmptyBucket);
            }
        }
        Ok(())
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_versions_per_channel: self.max_versions_per_channel,
            max_content_bytes: self.max_content_bytes,
        }
    }
}
