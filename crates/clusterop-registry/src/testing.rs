//! Conformance checks any store can be run through.
//! Every check panics on the first deviation.

use std::sync::Arc;
use std::time::Duration;

use fluvio_future::timer::sleep;
use futures_util::StreamExt;
use tokio::select;
use tracing::debug;

use clusterop_kv_storage::MemoryBackend;
use clusterop_model::fixture::{TestObject, TestSpec};
use clusterop_model::{
    FieldError, FieldErrorList, FieldPath, FieldSelector, LabelSelector, NameSpace,
    ResourceObject, Spec, WatchEvent,
};

use crate::config::{RestOptions, StorageConfig};
use crate::options::{
    DeleteOptions, DeleteStatus, ListOptions, Preconditions, UpdateOptions, WatchOptions,
};
use crate::store::Store;
use crate::strategy::Strategy;
use crate::watch::WatchStream;

const TEST_NAMESPACE: &str = "test";
const WATCH_TIMEOUT: Duration = Duration::from_millis(200);

pub type UpdateFn<S> = fn(ResourceObject<S>) -> ResourceObject<S>;

pub struct RegistryTester<S: Spec> {
    store: Store<S>,
    namespace: String,
    return_deleted: bool,
}

impl<S: Spec> RegistryTester<S> {
    pub fn new(store: Store<S>) -> Self {
        let namespace = if store.strategy().namespace_scoped() {
            TEST_NAMESPACE.to_owned()
        } else {
            String::new()
        };
        Self {
            store,
            namespace,
            return_deleted: false,
        }
    }

    pub fn cluster_scope(mut self) -> Self {
        self.namespace.clear();
        self
    }

    /// expect delete to return the removed object instead of a status
    pub fn return_deleted_object(mut self) -> Self {
        self.return_deleted = true;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn store(&self) -> &Store<S> {
        &self.store
    }

    fn with_name(&self, obj: &ResourceObject<S>, name: &str) -> ResourceObject<S> {
        let mut obj = obj.clone();
        obj.metadata.name = name.to_owned();
        obj.metadata.generate_name.clear();
        obj.metadata.namespace = self.namespace.clone();
        obj.metadata.resource_version.clear();
        obj
    }

    async fn create(&self, obj: ResourceObject<S>) -> ResourceObject<S> {
        self.store
            .create(&self.namespace, obj)
            .await
            .expect("create fixture object")
    }

    pub async fn test_create(&self, valid: ResourceObject<S>, invalid: Vec<ResourceObject<S>>) {
        let obj = self.with_name(&valid, "create-1");
        let created = self.create(obj.clone()).await;
        assert_eq!(created.name(), "create-1");
        assert!(!created.metadata.uid.is_empty());
        assert!(created.metadata.creation_timestamp.is_some());
        assert!(created.metadata.revision().is_some());
        assert_eq!(
            self.store
                .get(&self.namespace, "create-1")
                .await
                .expect("get created"),
            created
        );

        let duplicate = self.store.create(&self.namespace, obj).await.unwrap_err();
        assert!(duplicate.is_already_exists(), "{duplicate}");

        let mut generated = self.with_name(&valid, "");
        generated.metadata.generate_name = "foo".to_owned();
        let created = self.create(generated).await;
        assert!(created.name().starts_with("foo"));
        assert_eq!(created.name().len(), 8);

        let mut versioned = self.with_name(&valid, "create-2");
        versioned.metadata.resource_version = "1".to_owned();
        let err = self
            .store
            .create(&self.namespace, versioned)
            .await
            .unwrap_err();
        assert!(err.is_bad_request(), "{err}");

        if !self.namespace.is_empty() {
            let mut elsewhere = self.with_name(&valid, "create-3");
            elsewhere.metadata.namespace = "other".to_owned();
            let err = self
                .store
                .create(&self.namespace, elsewhere)
                .await
                .unwrap_err();
            assert!(err.is_bad_request(), "{err}");
        }

        let scope = NameSpace::from(self.namespace.as_str());
        let before = self
            .store
            .list(&scope, &ListOptions::default())
            .await
            .expect("list");
        for obj in invalid {
            let name = obj.metadata.name.clone();
            let err = self.store.create(&self.namespace, obj).await.unwrap_err();
            assert!(err.is_invalid(), "{name}: {err}");
        }
        let after = self
            .store
            .list(&scope, &ListOptions::default())
            .await
            .expect("list");
        assert_eq!(after, before, "rejected creates must leave no record");
    }

    pub async fn test_update(
        &self,
        valid: ResourceObject<S>,
        update: UpdateFn<S>,
        invalid_updates: Vec<UpdateFn<S>>,
    ) {
        let created = self.create(self.with_name(&valid, "update-1")).await;

        let (updated, was_created) = self
            .store
            .update(
                &self.namespace,
                "update-1",
                &update(created.clone()),
                &UpdateOptions::default(),
            )
            .await
            .expect("update");
        assert!(!was_created);
        assert_ne!(updated.resource_version(), created.resource_version());
        assert_eq!(updated.metadata.uid, created.metadata.uid);

        let stale = self
            .store
            .update(
                &self.namespace,
                "update-1",
                &update(created.clone()),
                &UpdateOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(stale.is_conflict(), "{stale}");

        let missing = self.with_name(&valid, "update-missing");
        let err = self
            .store
            .update(
                &self.namespace,
                "update-missing",
                &missing,
                &UpdateOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");

        for invalid in invalid_updates {
            let current = self
                .store
                .get(&self.namespace, "update-1")
                .await
                .expect("get");
            let err = self
                .store
                .update(
                    &self.namespace,
                    "update-1",
                    &invalid(current),
                    &UpdateOptions::default(),
                )
                .await
                .unwrap_err();
            assert!(err.is_invalid(), "{err}");
        }
    }

    pub async fn test_delete(&self, valid: ResourceObject<S>) {
        let created = self.create(self.with_name(&valid, "delete-1")).await;

        let err = self
            .store
            .delete(
                &self.namespace,
                "delete-1",
                &DeleteOptions::default().with_preconditions(Preconditions::uid("not-the-uid")),
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict(), "{err}");

        let options = if self.return_deleted {
            DeleteOptions::default().return_deleted()
        } else {
            DeleteOptions::default()
        };
        match self
            .store
            .delete(&self.namespace, "delete-1", &options)
            .await
            .expect("delete")
        {
            DeleteStatus::DeletedObject(obj) if self.return_deleted => assert_eq!(obj, created),
            DeleteStatus::Deleted(status) if !self.return_deleted => assert!(status.is_success()),
            other => panic!("unexpected delete outcome: {other:?}"),
        }

        let err = self
            .store
            .get(&self.namespace, "delete-1")
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");
        let err = self
            .store
            .delete(&self.namespace, "delete-1", &options)
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    pub async fn test_get(&self, valid: ResourceObject<S>) {
        let created = self.create(self.with_name(&valid, "get-1")).await;

        let found = self
            .store
            .get(&self.namespace, "get-1")
            .await
            .expect("get");
        assert_eq!(found, created);

        let err = self
            .store
            .get(&self.namespace, "get-missing")
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    pub async fn test_list(&self, valid: ResourceObject<S>) {
        let scope = NameSpace::from(self.namespace.as_str());
        let before = self
            .store
            .list(&scope, &ListOptions::default())
            .await
            .expect("list");

        for name in ["list-3", "list-1", "list-2"] {
            self.create(self.with_name(&valid, name)).await;
        }

        let all = self
            .store
            .list(&scope, &ListOptions::default())
            .await
            .expect("list");
        assert_eq!(all.len(), before.len() + 3);
        let names = all.names();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);

        let mut paged = vec![];
        let mut options = ListOptions::default().limit(1);
        loop {
            let page = self.store.list(&scope, &options).await.expect("page");
            assert!(page.len() <= 1);
            paged.extend(page.items.into_iter().map(|item| item.metadata.name));
            match page.metadata.continue_token {
                Some(token) => options = ListOptions::default().limit(1).continue_from(token),
                None => break,
            }
        }
        assert_eq!(paged, names);
    }

    /// objects carrying `labels` must be seen by every matching selector and none of the others.
    /// the object keeps the name of `valid` so field selectors can target it
    pub async fn test_watch(
        &self,
        valid: ResourceObject<S>,
        labels: Vec<(&str, &str)>,
        matching_labels: Vec<LabelSelector>,
        not_matching_labels: Vec<LabelSelector>,
        matching_fields: Vec<FieldSelector>,
        not_matching_fields: Vec<FieldSelector>,
    ) {
        let name = if valid.metadata.name.is_empty() {
            "watch-1".to_owned()
        } else {
            valid.metadata.name.clone()
        };
        let mut obj = self.with_name(&valid, &name);
        obj.metadata.labels = labels
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        let scope = NameSpace::from(self.namespace.as_str());
        let start = self
            .store
            .list(&scope, &ListOptions::default())
            .await
            .expect("list")
            .metadata
            .resource_version;

        let mut selections = vec![];
        for (selector, matching) in matching_labels
            .into_iter()
            .map(|selector| (selector, true))
            .chain(not_matching_labels.into_iter().map(|selector| (selector, false)))
        {
            let description = format!("labels {selector}");
            selections.push((description, WatchOptions::default().labels(selector), matching));
        }
        for (selector, matching) in matching_fields
            .into_iter()
            .map(|selector| (selector, true))
            .chain(not_matching_fields.into_iter().map(|selector| (selector, false)))
        {
            let description = format!("fields {selector}");
            selections.push((description, WatchOptions::default().fields(selector), matching));
        }

        let mut watchers = vec![];
        for (description, options, matching) in selections {
            let stream = self
                .store
                .watch(&scope, options.from_version(start.clone()))
                .await
                .expect("watch");
            watchers.push((description, stream, matching));
        }

        let created = self.create(obj).await;

        for (description, stream, matching) in watchers.iter_mut() {
            let event = next_event(stream).await;
            if *matching {
                match event {
                    Some(WatchEvent::Added(added)) => assert_eq!(added, created),
                    other => panic!("{description} expected added, got {other:?}"),
                }
            } else {
                assert!(event.is_none(), "{description} expected nothing, got {event:?}");
            }
        }
    }
}

/// next event or none after a short wait
pub async fn next_event<S: Spec>(stream: &mut WatchStream<S>) -> Option<WatchEvent<S>> {
    select! {
        event = stream.next() => event,
        _ = sleep(WATCH_TIMEOUT) => {
            debug!("no watch event before timeout");
            None
        }
    }
}

const MAX_TEST_REPLICA: u16 = 100;

/// strategy for the fixture test type
#[derive(Debug, Clone)]
pub struct TestStrategy {
    grace_period: Option<i64>,
    create_on_update: bool,
    unconditional_update: bool,
}

impl Default for TestStrategy {
    fn default() -> Self {
        Self {
            grace_period: None,
            create_on_update: false,
            unconditional_update: true,
        }
    }
}

impl TestStrategy {
    pub fn graceful(mut self, seconds: i64) -> Self {
        self.grace_period = Some(seconds);
        self
    }

    pub fn create_on_update(mut self) -> Self {
        self.create_on_update = true;
        self
    }

    pub fn conditional_only(mut self) -> Self {
        self.unconditional_update = false;
        self
    }

    fn validate_spec(obj: &TestObject) -> FieldErrorList {
        let mut errors = FieldErrorList::new();
        if obj.spec.replica > MAX_TEST_REPLICA {
            errors.push(FieldError::invalid(
                &FieldPath::new("spec").child("replica"),
                obj.spec.replica,
                format!("must be at most {MAX_TEST_REPLICA}"),
            ));
        }
        errors
    }
}

impl Strategy<TestSpec> for TestStrategy {
    fn namespace_scoped(&self) -> bool {
        true
    }

    fn prepare_for_create(&self, obj: &mut TestObject) {
        obj.status = Default::default();
        obj.metadata.generation = 1;
    }

    fn prepare_for_update(&self, obj: &mut TestObject, old: &TestObject) {
        obj.status = old.status.clone();
        if obj.spec != old.spec {
            obj.metadata.generation = old.metadata.generation + 1;
        }
    }

    fn validate_create(&self, obj: &TestObject) -> FieldErrorList {
        Self::validate_spec(obj)
    }

    fn validate_update(&self, obj: &TestObject, _old: &TestObject) -> FieldErrorList {
        Self::validate_spec(obj)
    }

    fn allow_create_on_update(&self) -> bool {
        self.create_on_update
    }

    fn allow_unconditional_update(&self) -> bool {
        self.unconditional_update
    }

    fn default_grace_period_seconds(&self, _obj: &TestObject) -> Option<i64> {
        self.grace_period
    }
}

/// in memory store for the fixture type under resource prefix "tests"
pub fn test_store(strategy: TestStrategy) -> (Store<TestSpec>, Arc<MemoryBackend>) {
    test_store_with(strategy, |config| config)
}

pub fn test_store_with<F>(strategy: TestStrategy, configure: F) -> (Store<TestSpec>, Arc<MemoryBackend>)
where
    F: FnOnce(StorageConfig) -> StorageConfig,
{
    let backend = MemoryBackend::new_shared();
    let options = RestOptions::new(configure(StorageConfig::new(backend.clone())), "tests");
    let store = Store::new(&options, Arc::new(strategy)).expect("test store");
    (store, backend)
}
