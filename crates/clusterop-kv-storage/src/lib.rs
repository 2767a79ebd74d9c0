mod error;
pub mod memory;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub use error::KvError;
pub use memory::MemoryBackend;

/// backend revision, strictly increasing on every mutation
pub type Revision = i64;

pub type SharedBackend = Arc<dyn KvBackend>;

pub type KvEventStream = BoxStream<'static, Result<KvEvent, KvError>>;

/// stored value together with the revisions that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub create_revision: Revision,
    pub mod_revision: Revision,
}

/// change emitted by the backend change feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvEvent {
    Put {
        entry: KvEntry,
        prev: Option<KvEntry>,
    },
    Delete {
        prev: KvEntry,
        revision: Revision,
    },
}

impl KvEvent {
    pub fn revision(&self) -> Revision {
        match self {
            Self::Put { entry, .. } => entry.mod_revision,
            Self::Delete { revision, .. } => *revision,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Put { entry, .. } => &entry.key,
            Self::Delete { prev, .. } => &prev.key,
        }
    }
}

/// range read, keys are returned in ascending order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub prefix: String,
    /// first key to include, must start with prefix
    pub start_key: Option<String>,
    pub limit: Option<usize>,
    /// snapshot revision, latest if not set
    pub revision: Option<Revision>,
}

impl ListRequest {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn start_at(mut self, key: impl Into<String>) -> Self {
        self.start_key = Some(key.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn at_revision(mut self, revision: Revision) -> Self {
        self.revision = Some(revision);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvListing {
    pub entries: Vec<KvEntry>,
    /// revision the listing was read at
    pub revision: Revision,
    /// keys left after the last entry returned
    pub remaining: usize,
}

impl KvListing {
    pub fn more(&self) -> bool {
        self.remaining > 0
    }
}

/// Strongly consistent key-value store with compare-and-swap writes
/// and an ordered change feed.
#[async_trait]
pub trait KvBackend: Debug + Send + Sync {
    /// point read of latest value
    async fn get(&self, key: &str) -> Result<Option<KvEntry>, KvError>;

    /// create key, fails with `KeyExists` if key is present
    async fn create(&self, key: &str, value: Vec<u8>) -> Result<KvEntry, KvError>;

    /// replace value only if the current mod revision equals `expected_revision`
    async fn update(
        &self,
        key: &str,
        value: Vec<u8>,
        expected_revision: Revision,
    ) -> Result<KvEntry, KvError>;

    /// delete key, guarded by expected revision if given.
    /// returns previous entry and the revision of the deletion
    async fn delete(
        &self,
        key: &str,
        expected_revision: Option<Revision>,
    ) -> Result<(KvEntry, Revision), KvError>;

    async fn list(&self, request: ListRequest) -> Result<KvListing, KvError>;

    /// stream every change under prefix with revision greater than `from_revision`,
    /// in ascending revision order
    async fn watch(&self, prefix: &str, from_revision: Revision) -> Result<KvEventStream, KvError>;

    async fn current_revision(&self) -> Result<Revision, KvError>;
}
