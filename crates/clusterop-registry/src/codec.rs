use serde::{Deserialize, Serialize};

use clusterop_kv_storage::Revision;
use clusterop_model::{ResourceObject, Spec};

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("Json serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Yaml serialization error: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    #[error("stored object is of kind {found}, expected {expected}")]
    KindMismatch { expected: String, found: String },
}

/// byte representation of objects in the backend.
/// resource version is never stored, it is derived from the backend revision on decode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Json,
    Yaml,
}

impl Codec {
    pub fn encode<S: Spec>(&self, obj: &ResourceObject<S>) -> Result<Vec<u8>, CodecError> {
        let mut stored = obj.clone();
        stored.set_type_meta();
        stored.metadata.resource_version.clear();

        Ok(match self {
            Self::Json => serde_json::to_vec(&stored)?,
            Self::Yaml => serde_yaml::to_string(&stored)?.into_bytes(),
        })
    }

    pub fn decode<S: Spec>(
        &self,
        data: &[u8],
        revision: Revision,
    ) -> Result<ResourceObject<S>, CodecError> {
        let mut obj: ResourceObject<S> = match self {
            Self::Json => serde_json::from_slice(data)?,
            Self::Yaml => serde_yaml::from_slice(data)?,
        };
        if obj.kind != S::kind() {
            return Err(CodecError::KindMismatch {
                expected: S::kind(),
                found: obj.kind,
            });
        }
        obj.metadata.resource_version = revision.to_string();
        Ok(obj)
    }
}
