use clusterop_model::{ApiStatus, FieldSelector, LabelSelector, ResourceObject, Spec};

use crate::error::ApiError;
use crate::store::parse_version;

/// conditions that must hold on the stored object for a delete to proceed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preconditions {
    pub uid: Option<String>,
    pub resource_version: Option<String>,
}

impl Preconditions {
    pub fn uid(uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
            ..Default::default()
        }
    }

    pub fn resource_version(version: impl Into<String>) -> Self {
        Self {
            resource_version: Some(version.into()),
            ..Default::default()
        }
    }

    pub(crate) fn check<S: Spec>(&self, obj: &ResourceObject<S>) -> Result<(), ApiError> {
        if let Some(uid) = &self.uid {
            if *uid != obj.metadata.uid {
                return Err(ApiError::conflict(
                    S::kind(),
                    obj.name(),
                    format!(
                        "Precondition failed: UID in precondition: {uid}, UID in object meta: {}",
                        obj.metadata.uid
                    ),
                ));
            }
        }
        if let Some(version) = &self.resource_version {
            if obj.metadata.revision() != Some(parse_version(version)?) {
                return Err(ApiError::conflict(
                    S::kind(),
                    obj.name(),
                    format!(
                        "Precondition failed: ResourceVersion in precondition: {version}, ResourceVersion in object meta: {}",
                        obj.metadata.resource_version
                    ),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub preconditions: Option<Preconditions>,
    /// overrides the type default when graceful deletion is supported
    pub grace_period_seconds: Option<i64>,
    /// return the deleted object instead of a status
    pub return_deleted: bool,
}

impl DeleteOptions {
    pub fn with_preconditions(mut self, preconditions: Preconditions) -> Self {
        self.preconditions = Some(preconditions);
        self
    }

    pub fn grace_period(mut self, seconds: i64) -> Self {
        self.grace_period_seconds = Some(seconds);
        self
    }

    pub fn return_deleted(mut self) -> Self {
        self.return_deleted = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// create the object if it is missing even when the strategy does not allow it
    pub force_allow_create: bool,
    /// times to reapply the update when the object moved underneath us
    pub conflict_retries: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub label_selector: LabelSelector,
    pub field_selector: FieldSelector,
    /// 0 or none means unlimited
    pub limit: Option<usize>,
    pub continue_token: Option<String>,
    /// list as of this version, latest when none
    pub resource_version: Option<String>,
}

impl ListOptions {
    pub fn labels(mut self, selector: LabelSelector) -> Self {
        self.label_selector = selector;
        self
    }

    pub fn fields(mut self, selector: FieldSelector) -> Self {
        self.field_selector = selector;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn continue_from(mut self, token: impl Into<String>) -> Self {
        self.continue_token = Some(token.into());
        self
    }

    pub fn at_version(mut self, version: impl Into<String>) -> Self {
        self.resource_version = Some(version.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub label_selector: LabelSelector,
    pub field_selector: FieldSelector,
    /// stream changes after this version. none or "0" starts with the current state
    pub resource_version: Option<String>,
}

impl WatchOptions {
    pub fn labels(mut self, selector: LabelSelector) -> Self {
        self.label_selector = selector;
        self
    }

    pub fn fields(mut self, selector: FieldSelector) -> Self {
        self.field_selector = selector;
        self
    }

    pub fn from_version(mut self, version: impl Into<String>) -> Self {
        self.resource_version = Some(version.into());
        self
    }
}

/// outcome of delete
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteStatus<S: Spec> {
    Deleted(ApiStatus),
    DeletedObject(ResourceObject<S>),
    /// marked for graceful deletion, still readable
    Pending(ResourceObject<S>),
}

impl<S: Spec> DeleteStatus<S> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    pub fn object(&self) -> Option<&ResourceObject<S>> {
        match self {
            Self::Deleted(_) => None,
            Self::DeletedObject(obj) | Self::Pending(obj) => Some(obj),
        }
    }
}

/// computes the object to write during update
pub trait UpdatedObjectInfo<S: Spec>: Send + Sync {
    /// `current` is none when the object does not exist
    fn updated_object(
        &self,
        current: Option<&ResourceObject<S>>,
    ) -> Result<ResourceObject<S>, ApiError>;
}

impl<S: Spec> UpdatedObjectInfo<S> for ResourceObject<S> {
    fn updated_object(
        &self,
        _current: Option<&ResourceObject<S>>,
    ) -> Result<ResourceObject<S>, ApiError> {
        Ok(self.clone())
    }
}

/// transform applied to the current object, reapplied on every conflict retry
pub struct MutateFn<F>(pub F);

impl<S, F> UpdatedObjectInfo<S> for MutateFn<F>
where
    S: Spec,
    F: Fn(ResourceObject<S>) -> Result<ResourceObject<S>, ApiError> + Send + Sync,
{
    fn updated_object(
        &self,
        current: Option<&ResourceObject<S>>,
    ) -> Result<ResourceObject<S>, ApiError> {
        match current {
            Some(obj) => (self.0)(obj.clone()),
            None => Err(ApiError::not_found(S::kind(), "")),
        }
    }
}

#[cfg(test)]
mod test {
    use clusterop_model::ObjectMeta;
    use clusterop_model::fixture::{TestObject, TestSpec};

    use super::{MutateFn, Preconditions, UpdatedObjectInfo};
    use crate::error::ApiError;

    fn stored() -> TestObject {
        let mut meta = ObjectMeta::new("t1", "default");
        meta.uid = "u1".to_owned();
        meta.resource_version = "4".to_owned();
        TestObject::new(meta, TestSpec { replica: 1 })
    }

    #[test]
    fn test_preconditions() {
        let obj = stored();

        assert!(Preconditions::uid("u1").check(&obj).is_ok());
        assert!(Preconditions::resource_version("4").check(&obj).is_ok());
        assert!(Preconditions::uid("u2").check(&obj).unwrap_err().is_conflict());
        assert!(
            Preconditions::resource_version("3")
                .check(&obj)
                .unwrap_err()
                .is_conflict()
        );
        assert!(
            Preconditions::resource_version("+4")
                .check(&obj)
                .unwrap_err()
                .is_bad_request()
        );
    }

    #[test]
    fn test_mutate_fn() {
        let scale = MutateFn(|mut obj: TestObject| {
            obj.spec.replica += 1;
            Ok::<_, ApiError>(obj)
        });

        let updated = scale.updated_object(Some(&stored())).expect("mutate");
        assert_eq!(updated.spec.replica, 2);
        assert!(scale.updated_object(None).unwrap_err().is_not_found());
    }
}
