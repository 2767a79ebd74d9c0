use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// API group, version and naming of a resource kind
pub use k8_types::{Crd, CrdNames};

/// desired state of a resource kind.
/// spec is what user sets, status is what the system observes
pub trait Spec:
    Debug + Default + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Status: Status;

    fn metadata() -> &'static Crd;

    fn kind() -> String {
        Self::metadata().names.kind.to_owned()
    }

    fn api_version() -> String {
        let metadata = Self::metadata();
        if metadata.group.is_empty() {
            metadata.version.to_owned()
        } else {
            format!("{}/{}", metadata.group, metadata.version)
        }
    }

    /// plural name, used as default resource prefix
    fn plural() -> &'static str {
        Self::metadata().names.plural
    }
}

/// observed state, opaque to registry
pub trait Status:
    Debug + Default + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

#[cfg(test)]
mod test {
    use crate::fixture::TestSpec;

    use super::Spec;

    #[test]
    fn test_type_meta() {
        assert_eq!(TestSpec::kind(), "Test");
        assert_eq!(TestSpec::api_version(), "test.clusterop/v1");
        assert_eq!(TestSpec::plural(), "tests");
    }
}
