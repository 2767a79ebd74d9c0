use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::Spec;
use crate::meta::ResourceObject;
use crate::status::ApiStatus;

/// change observed by a watcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "object")]
#[serde(bound(deserialize = "S: DeserializeOwned"))]
pub enum WatchEvent<S>
where
    S: Spec,
{
    #[serde(rename = "ADDED")]
    Added(ResourceObject<S>),
    #[serde(rename = "MODIFIED")]
    Modified(ResourceObject<S>),
    #[serde(rename = "DELETED")]
    Deleted(ResourceObject<S>),
    /// terminal, stream ends after it
    #[serde(rename = "ERROR")]
    Error(ApiStatus),
}

impl<S> WatchEvent<S>
where
    S: Spec,
{
    pub fn object(&self) -> Option<&ResourceObject<S>> {
        match self {
            Self::Added(obj) | Self::Modified(obj) | Self::Deleted(obj) => Some(obj),
            Self::Error(_) => None,
        }
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.object().map(|obj| obj.resource_version())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Added(_) => "ADDED",
            Self::Modified(_) => "MODIFIED",
            Self::Deleted(_) => "DELETED",
            Self::Error(_) => "ERROR",
        }
    }
}
