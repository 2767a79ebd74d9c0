use crate::Revision;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    #[error("key {0} already exists")]
    KeyExists(String),
    #[error("key {0} not found")]
    KeyNotFound(String),
    #[error("key {key}: expected revision {expected}, found {actual}")]
    RevisionMismatch {
        key: String,
        expected: Revision,
        actual: Revision,
    },
    #[error("required revision {requested} has been compacted, oldest available {compacted}")]
    Compacted {
        requested: Revision,
        compacted: Revision,
    },
    #[error("required revision {requested} is a future revision, current {current}")]
    FutureRevision {
        requested: Revision,
        current: Revision,
    },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl KvError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::RevisionMismatch { .. })
    }
}
