use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

use clusterop_kv_storage::{KvEntry, KvError, Revision, SharedBackend};
use clusterop_model::validation::{validate_object_meta, validate_object_meta_update};
use clusterop_model::{ApiStatus, FieldErrorList, FieldPath, ResourceObject, Spec};

use crate::codec::Codec;
use crate::config::{ConfigError, RestOptions};
use crate::error::ApiError;
use crate::keys::KeyLayout;
use crate::options::{DeleteOptions, DeleteStatus, UpdateOptions, UpdatedObjectInfo};
use crate::strategy::{MAX_NAME_GENERATION_ATTEMPTS, Strategy};

enum UpdateAttempt<S: Spec> {
    Done(ResourceObject<S>, bool),
    /// lost a compare and swap race, safe to retry from a fresh read
    Raced(ApiError),
}

/// generic store for one resource type
pub struct Store<S: Spec> {
    pub(crate) backend: SharedBackend,
    pub(crate) codec: Codec,
    pub(crate) strategy: Arc<dyn Strategy<S>>,
    pub(crate) layout: KeyLayout,
    pub(crate) paging: bool,
    pub(crate) delete_collection_workers: usize,
    pub(crate) watch_channel_capacity: usize,
}

impl<S: Spec> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            codec: self.codec,
            strategy: self.strategy.clone(),
            layout: self.layout.clone(),
            paging: self.paging,
            delete_collection_workers: self.delete_collection_workers,
            watch_channel_capacity: self.watch_channel_capacity,
        }
    }
}

impl<S: Spec> fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Store<{}>({})", S::kind(), self.layout.root())
    }
}

impl<S: Spec> Store<S> {
    pub fn new(options: &RestOptions, strategy: Arc<dyn Strategy<S>>) -> Result<Self, ConfigError> {
        options.validate()?;
        let layout = KeyLayout::new(
            &options.storage_config.prefix,
            &options.resource_prefix,
            strategy.namespace_scoped(),
        );
        debug!(kind = %S::kind(), root = layout.root(), "store created");
        Ok(Self {
            backend: options.backend(),
            codec: options.storage_config.codec,
            strategy,
            layout,
            paging: options.storage_config.paging,
            delete_collection_workers: options.delete_collection_workers,
            watch_channel_capacity: options.storage_config.watch_channel_capacity,
        })
    }

    /// same storage with different type behavior, scope must match
    pub fn with_strategy(&self, strategy: Arc<dyn Strategy<S>>) -> Self {
        Self {
            strategy,
            ..self.clone()
        }
    }

    pub fn strategy(&self) -> &dyn Strategy<S> {
        self.strategy.as_ref()
    }

    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    pub fn key_root(&self) -> &str {
        self.layout.root()
    }

    pub fn new_object(&self) -> ResourceObject<S> {
        self.strategy.new_object()
    }

    pub(crate) fn decode(&self, entry: &KvEntry) -> Result<ResourceObject<S>, ApiError> {
        Ok(self.codec.decode(&entry.value, entry.mod_revision)?)
    }

    pub(crate) fn kv_error(&self, err: KvError, name: &str) -> ApiError {
        ApiError::from_kv(err, &S::kind(), name)
    }

    fn invalid(&self, name: &str, errors: FieldErrorList) -> ApiError {
        ApiError::Invalid {
            kind: S::kind(),
            name: name.to_owned(),
            errors,
        }
    }

    #[instrument(skip(self), fields(kind = %S::kind()))]
    pub async fn get(&self, namespace: &str, name: &str) -> Result<ResourceObject<S>, ApiError> {
        let key = self.layout.object_key(namespace, name)?;
        match self
            .backend
            .get(&key)
            .await
            .map_err(|err| self.kv_error(err, name))?
        {
            Some(entry) => self.decode(&entry),
            None => Err(ApiError::not_found(S::kind(), name)),
        }
    }

    /// persist a new object.
    /// empty name with generate name set retries on collisions with a fresh name
    #[instrument(skip(self, obj), fields(kind = %S::kind()))]
    pub async fn create(
        &self,
        namespace: &str,
        obj: ResourceObject<S>,
    ) -> Result<ResourceObject<S>, ApiError> {
        let generated = obj.metadata.name.is_empty() && !obj.metadata.generate_name.is_empty();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut candidate = obj.clone();
            self.before_create(namespace, &mut candidate)?;
            let key = self
                .layout
                .object_key(&candidate.metadata.namespace, &candidate.metadata.name)?;
            let data = self.codec.encode(&candidate)?;

            match self.backend.create(&key, data).await {
                Ok(entry) => {
                    candidate.metadata.resource_version = entry.mod_revision.to_string();
                    debug!(name = %candidate.metadata.name, revision = entry.mod_revision, "created");
                    return Ok(candidate);
                }
                Err(KvError::KeyExists(_))
                    if generated && attempt < MAX_NAME_GENERATION_ATTEMPTS =>
                {
                    debug!(attempt, name = %candidate.metadata.name, "generated name taken");
                }
                Err(err) => return Err(self.kv_error(err, &candidate.metadata.name)),
            }
        }
    }

    fn before_create(&self, namespace: &str, obj: &mut ResourceObject<S>) -> Result<(), ApiError> {
        if !obj.metadata.resource_version.is_empty() {
            return Err(ApiError::BadRequest(
                "resourceVersion should not be set on objects to be created".to_owned(),
            ));
        }
        self.assign_namespace(namespace, obj)?;

        if obj.metadata.name.is_empty() && !obj.metadata.generate_name.is_empty() {
            obj.metadata.name = self.strategy.generate_name(&obj.metadata.generate_name);
        }
        obj.metadata.uid = Uuid::new_v4().to_string();
        obj.metadata.creation_timestamp = Some(Utc::now().trunc_subsecs(0));
        obj.metadata.deletion_timestamp = None;
        obj.metadata.deletion_grace_period_seconds = None;
        obj.set_type_meta();

        self.strategy.prepare_for_create(obj);

        let mut errors = validate_object_meta(
            &obj.metadata,
            self.strategy.namespace_scoped(),
            self.strategy.validate_name(),
            &FieldPath::new("metadata"),
        );
        errors.extend(self.strategy.validate_create(obj));
        if errors.is_empty() {
            Ok(())
        } else {
            let name = if obj.metadata.name.is_empty() {
                &obj.metadata.generate_name
            } else {
                &obj.metadata.name
            };
            Err(self.invalid(name, errors))
        }
    }

    fn assign_namespace(&self, namespace: &str, obj: &mut ResourceObject<S>) -> Result<(), ApiError> {
        if !self.strategy.namespace_scoped() {
            obj.metadata.namespace.clear();
        } else if obj.metadata.namespace.is_empty() {
            obj.metadata.namespace = namespace.to_owned();
        } else if !namespace.is_empty() && obj.metadata.namespace != namespace {
            return Err(ApiError::BadRequest(
                "the namespace of the provided object does not match the namespace sent on the request"
                    .to_owned(),
            ));
        }
        Ok(())
    }

    /// fills name and namespace from the request, rejects mismatches
    fn assign_identity(
        &self,
        namespace: &str,
        name: &str,
        obj: &mut ResourceObject<S>,
    ) -> Result<(), ApiError> {
        if obj.metadata.name.is_empty() {
            obj.metadata.name = name.to_owned();
        } else if obj.metadata.name != name {
            return Err(ApiError::BadRequest(format!(
                "the name of the object ({}) does not match the name on the URL ({name})",
                obj.metadata.name
            )));
        }
        self.assign_namespace(namespace, obj)
    }

    /// apply `info` to the stored object with compare and swap.
    /// returns the stored object and whether it was created
    #[instrument(skip(self, info, options), fields(kind = %S::kind()))]
    pub async fn update(
        &self,
        namespace: &str,
        name: &str,
        info: &dyn UpdatedObjectInfo<S>,
        options: &UpdateOptions,
    ) -> Result<(ResourceObject<S>, bool), ApiError> {
        let key = self.layout.object_key(namespace, name)?;
        let mut retries = options.conflict_retries;
        loop {
            match self.try_update(&key, namespace, name, info, options).await? {
                UpdateAttempt::Done(obj, created) => return Ok((obj, created)),
                UpdateAttempt::Raced(_) if retries > 0 => {
                    retries -= 1;
                    debug!(name, retries, "lost update race, retrying");
                }
                UpdateAttempt::Raced(err) => return Err(err),
            }
        }
    }

    async fn try_update(
        &self,
        key: &str,
        namespace: &str,
        name: &str,
        info: &dyn UpdatedObjectInfo<S>,
        options: &UpdateOptions,
    ) -> Result<UpdateAttempt<S>, ApiError> {
        let current = self
            .backend
            .get(key)
            .await
            .map_err(|err| self.kv_error(err, name))?;
        let Some(entry) = current else {
            return self
                .create_on_update(key, namespace, name, info, options)
                .await;
        };

        let old = self.decode(&entry)?;
        let mut obj = info.updated_object(Some(&old))?;
        self.assign_identity(namespace, name, &mut obj)?;

        if obj.metadata.resource_version.is_empty() {
            if !self.strategy.allow_unconditional_update() {
                return Err(ApiError::BadRequest(
                    "resourceVersion must be specified for an update".to_owned(),
                ));
            }
        } else {
            let expected = parse_version(&obj.metadata.resource_version)?;
            if expected != entry.mod_revision {
                return Err(self.kv_error(
                    KvError::RevisionMismatch {
                        key: key.to_owned(),
                        expected,
                        actual: entry.mod_revision,
                    },
                    name,
                ));
            }
        }

        self.before_update(&mut obj, &old)?;
        let data = self.codec.encode(&obj)?;

        match self.backend.update(key, data, entry.mod_revision).await {
            Ok(updated) => {
                obj.metadata.resource_version = updated.mod_revision.to_string();
                debug!(name, revision = updated.mod_revision, "updated");
                Ok(UpdateAttempt::Done(obj, false))
            }
            Err(err @ (KvError::RevisionMismatch { .. } | KvError::KeyNotFound(_))) => {
                Ok(UpdateAttempt::Raced(self.kv_error(err, name)))
            }
            Err(err) => Err(self.kv_error(err, name)),
        }
    }

    async fn create_on_update(
        &self,
        key: &str,
        namespace: &str,
        name: &str,
        info: &dyn UpdatedObjectInfo<S>,
        options: &UpdateOptions,
    ) -> Result<UpdateAttempt<S>, ApiError> {
        if !(self.strategy.allow_create_on_update() || options.force_allow_create) {
            return Err(ApiError::not_found(S::kind(), name));
        }
        let mut obj = info.updated_object(None)?;
        self.assign_identity(namespace, name, &mut obj)?;
        // a version precondition can never hold for a missing object
        if !obj.metadata.resource_version.is_empty() {
            return Err(ApiError::not_found(S::kind(), name));
        }
        self.before_create(namespace, &mut obj)?;
        let data = self.codec.encode(&obj)?;

        match self.backend.create(key, data).await {
            Ok(entry) => {
                obj.metadata.resource_version = entry.mod_revision.to_string();
                debug!(name, revision = entry.mod_revision, "created on update");
                Ok(UpdateAttempt::Done(obj, true))
            }
            Err(err @ KvError::KeyExists(_)) => Ok(UpdateAttempt::Raced(self.kv_error(err, name))),
            Err(err) => Err(self.kv_error(err, name)),
        }
    }

    fn before_update(
        &self,
        obj: &mut ResourceObject<S>,
        old: &ResourceObject<S>,
    ) -> Result<(), ApiError> {
        obj.set_type_meta();

        // system owned fields always come from the stored object
        obj.metadata.generation = old.metadata.generation;
        if obj.metadata.uid.is_empty() {
            obj.metadata.uid = old.metadata.uid.clone();
        }
        if old.metadata.creation_timestamp.is_some() {
            obj.metadata.creation_timestamp = old.metadata.creation_timestamp;
        }
        if old.metadata.deletion_timestamp.is_some() {
            obj.metadata.deletion_timestamp = old.metadata.deletion_timestamp;
        }
        if old.metadata.deletion_grace_period_seconds.is_some()
            && obj.metadata.deletion_grace_period_seconds.is_none()
        {
            obj.metadata.deletion_grace_period_seconds =
                old.metadata.deletion_grace_period_seconds;
        }

        self.strategy.prepare_for_update(obj, old);

        let mut errors = validate_object_meta_update(
            &obj.metadata,
            &old.metadata,
            &FieldPath::new("metadata"),
        );
        errors.extend(self.strategy.validate_update(obj, old));
        if errors.is_empty() {
            Ok(())
        } else {
            Err(self.invalid(&obj.metadata.name, errors))
        }
    }

    /// remove an object, or mark it for graceful deletion when the type supports it.
    /// a pending object stays readable after its deadline until a later delete purges it
    #[instrument(skip(self, options), fields(kind = %S::kind()))]
    pub async fn delete(
        &self,
        namespace: &str,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<DeleteStatus<S>, ApiError> {
        let key = self.layout.object_key(namespace, name)?;
        let entry = self
            .backend
            .get(&key)
            .await
            .map_err(|err| self.kv_error(err, name))?
            .ok_or_else(|| ApiError::not_found(S::kind(), name))?;
        let current = self.decode(&entry)?;

        if let Some(preconditions) = &options.preconditions {
            preconditions.check(&current)?;
        }

        if let Some(grace) = self.grace_period(&current, options) {
            let now = Utc::now().trunc_subsecs(0);
            let deadline = grace
                .checked_mul(1000)
                .map(Duration::milliseconds)
                .and_then(|period| now.checked_add_signed(period))
                .ok_or_else(|| {
                    ApiError::BadRequest(format!("invalid grace period: {grace} seconds"))
                })?;
            match current.metadata.deletion_timestamp {
                Some(existing) if existing <= now => {
                    debug!(name, "grace period elapsed");
                }
                Some(existing) if deadline >= existing => {
                    debug!(name, "deletion already pending");
                    return Ok(DeleteStatus::Pending(current));
                }
                _ => {
                    let marked = self
                        .mark_for_deletion(&key, entry.mod_revision, current, deadline, grace)
                        .await?;
                    return Ok(DeleteStatus::Pending(marked));
                }
            }
        }

        let (_, revision) = self
            .backend
            .delete(&key, Some(entry.mod_revision))
            .await
            .map_err(|err| self.kv_error(err, name))?;
        debug!(name, revision, "deleted");

        if options.return_deleted {
            Ok(DeleteStatus::DeletedObject(current))
        } else {
            Ok(DeleteStatus::Deleted(ApiStatus::success(S::kind(), name)))
        }
    }

    /// positive grace period to apply, none deletes immediately
    fn grace_period(&self, obj: &ResourceObject<S>, options: &DeleteOptions) -> Option<i64> {
        let default = self.strategy.default_grace_period_seconds(obj)?;
        let grace = options.grace_period_seconds.unwrap_or(default);
        (grace > 0).then_some(grace)
    }

    async fn mark_for_deletion(
        &self,
        key: &str,
        revision: Revision,
        mut obj: ResourceObject<S>,
        deadline: DateTime<Utc>,
        grace: i64,
    ) -> Result<ResourceObject<S>, ApiError> {
        obj.metadata.deletion_timestamp = Some(deadline);
        obj.metadata.deletion_grace_period_seconds = Some(grace);
        if obj.metadata.generation > 0 {
            obj.metadata.generation += 1;
        }
        let data = self.codec.encode(&obj)?;
        let updated = self
            .backend
            .update(key, data, revision)
            .await
            .map_err(|err| self.kv_error(err, &obj.metadata.name))?;
        obj.metadata.resource_version = updated.mod_revision.to_string();
        debug!(name = %obj.metadata.name, %deadline, "marked for deletion");
        Ok(obj)
    }
}

/// decimal digits only, so every revision has a single spelling
pub(crate) fn parse_version(version: &str) -> Result<Revision, ApiError> {
    let digits = !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit());
    match version.parse::<Revision>() {
        Ok(revision) if digits && revision > 0 => Ok(revision),
        _ => Err(ApiError::BadRequest(format!(
            "invalid resource version: {version:?}"
        ))),
    }
}

/// none, empty and "0" all mean latest
pub(crate) fn parse_optional_version(version: Option<&str>) -> Result<Option<Revision>, ApiError> {
    match version {
        None | Some("") | Some("0") => Ok(None),
        Some(version) => parse_version(version).map(Some),
    }
}
