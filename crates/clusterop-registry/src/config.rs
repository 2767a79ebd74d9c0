use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

pub use fluvio_types::config_file::{LoadConfigError, SaveLoadConfig};

use clusterop_kv_storage::{
    KvBackend, KvEntry, KvError, KvEventStream, KvListing, ListRequest, Revision, SharedBackend,
};

use crate::codec::Codec;

pub const DEFAULT_WATCH_CHANNEL_CAPACITY: usize = 100;
pub const DEFAULT_DELETE_COLLECTION_WORKERS: usize = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("resource prefix {0:?} is not a valid key segment")]
    InvalidResourcePrefix(String),
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

/// registry settings persisted as toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub storage_prefix: String,
    pub codec: Codec,
    pub paging: bool,
    pub watch_channel_capacity: usize,
    pub delete_collection_workers: usize,
    /// wrap backend with request tracing
    pub traced: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            storage_prefix: String::new(),
            codec: Codec::default(),
            paging: true,
            watch_channel_capacity: DEFAULT_WATCH_CHANNEL_CAPACITY,
            delete_collection_workers: DEFAULT_DELETE_COLLECTION_WORKERS,
            traced: false,
        }
    }
}

impl RegistryConfig {
    pub fn rest_options(&self, backend: SharedBackend, resource_prefix: &str) -> RestOptions {
        RestOptions {
            storage_config: StorageConfig {
                backend,
                prefix: self.storage_prefix.clone(),
                codec: self.codec,
                paging: self.paging,
                watch_channel_capacity: self.watch_channel_capacity,
            },
            decorator: if self.traced {
                Decorator::traced()
            } else {
                Decorator::Undecorated
            },
            resource_prefix: resource_prefix.to_owned(),
            delete_collection_workers: self.delete_collection_workers,
        }
    }
}

/// backend plus how objects are laid out in it
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: SharedBackend,
    /// prepended to every key
    pub prefix: String,
    pub codec: Codec,
    /// honor list limits, otherwise lists always return everything
    pub paging: bool,
    pub watch_channel_capacity: usize,
}

impl StorageConfig {
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            backend,
            prefix: String::new(),
            codec: Codec::default(),
            paging: true,
            watch_channel_capacity: DEFAULT_WATCH_CHANNEL_CAPACITY,
        }
    }

    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

/// everything needed to build a store for one resource type
#[derive(Debug, Clone)]
pub struct RestOptions {
    pub storage_config: StorageConfig,
    pub decorator: Decorator,
    pub resource_prefix: String,
    pub delete_collection_workers: usize,
}

impl RestOptions {
    pub fn new(storage_config: StorageConfig, resource_prefix: impl Into<String>) -> Self {
        Self {
            storage_config,
            decorator: Decorator::Undecorated,
            resource_prefix: resource_prefix.into(),
            delete_collection_workers: DEFAULT_DELETE_COLLECTION_WORKERS,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = self.resource_prefix.trim_matches('/');
        if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidResourcePrefix(
                self.resource_prefix.clone(),
            ));
        }
        if self.delete_collection_workers == 0 {
            return Err(ConfigError::ZeroValue("delete collection workers"));
        }
        if self.storage_config.watch_channel_capacity == 0 {
            return Err(ConfigError::ZeroValue("watch channel capacity"));
        }
        Ok(())
    }

    /// backend after applying decorator
    pub fn backend(&self) -> SharedBackend {
        self.decorator.decorate(self.storage_config.backend.clone())
    }
}

pub type DecoratorFn = Arc<dyn Fn(SharedBackend) -> SharedBackend + Send + Sync>;

/// wraps the raw backend before the store uses it
#[derive(Clone, Default)]
pub enum Decorator {
    #[default]
    Undecorated,
    Custom(DecoratorFn),
}

impl Decorator {
    pub fn custom<F>(decorate: F) -> Self
    where
        F: Fn(SharedBackend) -> SharedBackend + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(decorate))
    }

    pub fn traced() -> Self {
        Self::custom(traced_storage)
    }

    pub fn decorate(&self, backend: SharedBackend) -> SharedBackend {
        match self {
            Self::Undecorated => backend,
            Self::Custom(decorate) => decorate(backend),
        }
    }
}

impl fmt::Debug for Decorator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undecorated => write!(f, "Undecorated"),
            Self::Custom(_) => write!(f, "Custom"),
        }
    }
}

pub fn traced_storage(backend: SharedBackend) -> SharedBackend {
    Arc::new(TracedBackend { inner: backend })
}

/// logs every backend request at debug level
#[derive(Debug)]
pub struct TracedBackend {
    inner: SharedBackend,
}

#[async_trait]
impl KvBackend for TracedBackend {
    #[instrument(level = "debug", skip(self), err)]
    async fn get(&self, key: &str) -> Result<Option<KvEntry>, KvError> {
        self.inner.get(key).await
    }

    #[instrument(level = "debug", skip(self, value), fields(len = value.len()), err)]
    async fn create(&self, key: &str, value: Vec<u8>) -> Result<KvEntry, KvError> {
        self.inner.create(key, value).await
    }

    #[instrument(level = "debug", skip(self, value), fields(len = value.len()), err)]
    async fn update(
        &self,
        key: &str,
        value: Vec<u8>,
        expected_revision: Revision,
    ) -> Result<KvEntry, KvError> {
        self.inner.update(key, value, expected_revision).await
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn delete(
        &self,
        key: &str,
        expected_revision: Option<Revision>,
    ) -> Result<(KvEntry, Revision), KvError> {
        self.inner.delete(key, expected_revision).await
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn list(&self, request: ListRequest) -> Result<KvListing, KvError> {
        self.inner.list(request).await
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn watch(&self, prefix: &str, from_revision: Revision) -> Result<KvEventStream, KvError> {
        self.inner.watch(prefix, from_revision).await
    }

    async fn current_revision(&self) -> Result<Revision, KvError> {
        self.inner.current_revision().await
    }
}
