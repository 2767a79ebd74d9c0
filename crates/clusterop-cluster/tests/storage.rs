use futures_util::StreamExt;

use clusterop_cluster::{
    Cluster, ClusterMachineSet, ClusterSpec, ClusterStatus, ClusterStatusStore, ClusterStore,
    MachineSetConfig, NodeType, RESOURCE_PREFIX, new_storage,
};
use clusterop_kv_storage::MemoryBackend;
use clusterop_model::{LabelSelector, NameSpace, ObjectMeta, WatchEvent};
use clusterop_registry::testing::{RegistryTester, UpdateFn, next_event};
use clusterop_registry::{
    ApiError, DeleteOptions, DeleteStatus, ListOptions, MutateFn, RestOptions, StorageConfig, UpdateOptions,
    WatchOptions,
};

const NAMESPACE: &str = "test";

fn cluster_storage() -> (ClusterStore, ClusterStatusStore) {
    let options = RestOptions::new(
        StorageConfig::new(MemoryBackend::new_shared()),
        RESOURCE_PREFIX,
    );
    new_storage(options).expect("cluster storage")
}

fn valid_new_cluster(name: &str) -> Cluster {
    Cluster::new(
        ObjectMeta::named(name),
        ClusterSpec::new(vec![ClusterMachineSet::new(
            "master",
            MachineSetConfig::new(NodeType::Master, 1).infra(),
        )]),
    )
}

fn unchanged(obj: Cluster) -> Cluster {
    obj
}

fn without_machine_sets(mut obj: Cluster) -> Cluster {
    obj.spec.machine_sets.clear();
    obj
}

fn with_zero_size(mut obj: Cluster) -> Cluster {
    obj.spec.machine_sets[0].config.size = 0;
    obj
}

#[fluvio_future::test]
async fn test_create() {
    let (store, _) = cluster_storage();
    let mut cluster = valid_new_cluster("foo");
    cluster.metadata = ObjectMeta::generated("foo");

    RegistryTester::new(store)
        .test_create(
            cluster,
            vec![
                Cluster::new(ObjectMeta::named("*BadName!"), ClusterSpec::default()),
                without_machine_sets(valid_new_cluster("no-sets")),
            ],
        )
        .await;
}

#[fluvio_future::test]
async fn test_update() {
    let (store, _) = cluster_storage();
    RegistryTester::new(store)
        .test_update(
            valid_new_cluster("foo"),
            unchanged,
            vec![
                without_machine_sets as UpdateFn<ClusterSpec>,
                with_zero_size as UpdateFn<ClusterSpec>,
            ],
        )
        .await;
}

#[fluvio_future::test]
async fn test_delete() {
    let (store, _) = cluster_storage();
    RegistryTester::new(store)
        .return_deleted_object()
        .test_delete(valid_new_cluster("foo"))
        .await;
}

#[fluvio_future::test]
async fn test_get() {
    let (store, _) = cluster_storage();
    RegistryTester::new(store)
        .test_get(valid_new_cluster("foo"))
        .await;
}

#[fluvio_future::test]
async fn test_list() {
    let (store, _) = cluster_storage();
    RegistryTester::new(store)
        .test_list(valid_new_cluster("foo"))
        .await;
}

#[fluvio_future::test]
async fn test_watch() {
    let (store, _) = cluster_storage();
    RegistryTester::new(store)
        .test_watch(
            valid_new_cluster("foo"),
            vec![("name", "foo")],
            vec![
                LabelSelector::everything(),
                "name=foo".parse().expect("selector"),
            ],
            vec!["name=bar".parse().expect("selector")],
            vec!["metadata.name=foo".parse().expect("selector")],
            vec!["metadata.name=bar".parse().expect("selector")],
        )
        .await;
}

#[fluvio_future::test]
async fn test_version_lifecycle() {
    let (store, _) = cluster_storage();

    store
        .create(NAMESPACE, valid_new_cluster("foo"))
        .await
        .expect("create");
    let v1 = store.get(NAMESPACE, "foo").await.expect("get");
    assert!(!v1.resource_version().is_empty());

    let (v2, created) = store
        .update(NAMESPACE, "foo", &v1, &UpdateOptions::default())
        .await
        .expect("update at v1");
    assert!(!created);
    assert_ne!(v2.resource_version(), v1.resource_version());
    assert_eq!(v2.metadata.generation, v1.metadata.generation);

    let err = store
        .update(NAMESPACE, "foo", &v1, &UpdateOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "{err}");
    assert_eq!(err.code(), 409);

    match store
        .delete(NAMESPACE, "foo", &DeleteOptions::default().return_deleted())
        .await
        .expect("delete")
    {
        DeleteStatus::DeletedObject(deleted) => assert_eq!(deleted, v2),
        other => panic!("expected deleted object, got {other:?}"),
    }

    let err = store.get(NAMESPACE, "foo").await.unwrap_err();
    assert!(err.is_not_found(), "{err}");
    assert_eq!(err.code(), 404);
}

#[fluvio_future::test]
async fn test_spec_change_bumps_generation() {
    let (store, _) = cluster_storage();
    let created = store
        .create(NAMESPACE, valid_new_cluster("foo"))
        .await
        .expect("create");
    assert_eq!(created.metadata.generation, 1);

    let (resized, _) = store
        .update(
            NAMESPACE,
            "foo",
            &MutateFn(|mut obj: Cluster| {
                obj.spec.machine_sets[0].config.size = 3;
                obj.status.machine_set_count = 9;
                Ok::<_, ApiError>(obj)
            }),
            &UpdateOptions::default(),
        )
        .await
        .expect("resize");
    assert_eq!(resized.metadata.generation, 2);
    assert_eq!(resized.spec.machine_sets[0].config.size, 3);
    assert_eq!(resized.status, ClusterStatus::default());
}

#[fluvio_future::test]
async fn test_status_update() {
    let (store, status_store) = cluster_storage();
    let created = store
        .create(NAMESPACE, valid_new_cluster("foo"))
        .await
        .expect("create");

    let mut reported = created.clone();
    reported.status.machine_set_count = 1;
    reported.spec.machine_sets[0].config.size = 7;
    let (updated, created_new) = status_store
        .update(NAMESPACE, "foo", &reported, &UpdateOptions::default())
        .await
        .expect("status update");
    assert!(!created_new);
    assert_eq!(updated.status.machine_set_count, 1);
    assert_eq!(updated.spec, created.spec);
    assert_eq!(updated.metadata.generation, created.metadata.generation);

    let stored = status_store.get(NAMESPACE, "foo").await.expect("get");
    assert_eq!(stored, updated);

    let mut negative = stored.clone();
    negative.status.machine_set_count = -1;
    let err = status_store
        .update(NAMESPACE, "foo", &negative, &UpdateOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_invalid(), "{err}");
    assert_eq!(err.code(), 422);
}

#[fluvio_future::test]
async fn test_status_update_never_creates() {
    let (_, status_store) = cluster_storage();
    let mut missing = valid_new_cluster("ghost");
    missing.metadata.namespace = NAMESPACE.to_owned();

    let err = status_store
        .update(
            NAMESPACE,
            "ghost",
            &missing,
            &UpdateOptions {
                force_allow_create: true,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err}");
}

#[fluvio_future::test]
async fn test_invalid_cluster_reports_fields() {
    let (store, _) = cluster_storage();
    let mut cluster = valid_new_cluster("foo");
    cluster.spec.machine_sets.push(ClusterMachineSet::new(
        "master",
        MachineSetConfig::new(NodeType::Master, -1),
    ));

    let err = store.create(NAMESPACE, cluster).await.unwrap_err();
    assert!(err.is_invalid(), "{err}");
    let message = err.to_string();
    assert!(message.contains("spec.machineSets[1].name"), "{message}");
    assert!(message.contains("spec.machineSets[1].size"), "{message}");
}

#[fluvio_future::test]
async fn test_watch_follows_lifecycle() {
    let (store, _) = cluster_storage();
    let mut watch = store
        .watch(&NameSpace::from(NAMESPACE), WatchOptions::default())
        .await
        .expect("watch");

    let created = store
        .create(NAMESPACE, valid_new_cluster("foo"))
        .await
        .expect("create");
    match next_event(&mut watch).await {
        Some(WatchEvent::Added(obj)) => assert_eq!(obj, created),
        other => panic!("expected added, got {other:?}"),
    }

    let (updated, _) = store
        .update(NAMESPACE, "foo", &created, &UpdateOptions::default())
        .await
        .expect("update");
    match next_event(&mut watch).await {
        Some(WatchEvent::Modified(obj)) => assert_eq!(obj, updated),
        other => panic!("expected modified, got {other:?}"),
    }

    store
        .delete(NAMESPACE, "foo", &DeleteOptions::default())
        .await
        .expect("delete");
    match next_event(&mut watch).await {
        Some(WatchEvent::Deleted(obj)) => assert_eq!(obj.name(), "foo"),
        other => panic!("expected deleted, got {other:?}"),
    }

    watch.stop();
    assert!(watch.next().await.is_none());
}

#[fluvio_future::test]
async fn test_delete_collection() {
    let (store, _) = cluster_storage();
    for name in ["a", "b", "c"] {
        store
            .create(NAMESPACE, valid_new_cluster(name))
            .await
            .expect("create");
    }

    let deleted = store
        .delete_collection(
            &NameSpace::from(NAMESPACE),
            &DeleteOptions::default(),
            &ListOptions::default(),
        )
        .await
        .expect("delete collection");
    assert_eq!(deleted.len(), 3);

    let remaining = store
        .list(&NameSpace::from(NAMESPACE), &ListOptions::default())
        .await
        .expect("list");
    assert!(remaining.is_empty());
}
