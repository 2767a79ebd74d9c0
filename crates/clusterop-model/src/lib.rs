pub mod core;
pub mod meta;
pub mod selector;
pub mod status;
pub mod validation;
pub mod watch;

pub use self::core::{Crd, CrdNames, Spec, Status};
pub use meta::{ListMeta, NameSpace, ObjectMeta, ResourceList, ResourceObject};
pub use selector::{FieldSelector, LabelSelector, SelectorParseError};
pub use status::{ApiStatus, StatusDetails, StatusReason};
pub use validation::{FieldError, FieldErrorList, FieldErrorType, FieldPath};
pub use watch::WatchEvent;

#[cfg(any(test, feature = "fixture"))]
pub mod fixture {
    use serde::{Deserialize, Serialize};

    use crate::core::{Crd, CrdNames, Spec, Status};
    use crate::meta::ResourceObject;

    #[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TestSpec {
        pub replica: u16,
    }

    #[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TestStatus {
        pub up: bool,
    }

    impl Status for TestStatus {}

    impl Spec for TestSpec {
        type Status = TestStatus;

        fn metadata() -> &'static Crd {
            &Crd {
                group: "test.clusterop",
                version: "v1",
                names: CrdNames {
                    kind: "Test",
                    plural: "tests",
                    singular: "test",
                },
            }
        }
    }

    pub type TestObject = ResourceObject<TestSpec>;
}
