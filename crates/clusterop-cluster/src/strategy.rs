use clusterop_model::FieldErrorList;
use clusterop_registry::Strategy;

use crate::Cluster;
use crate::spec::ClusterSpec;
use crate::status::ClusterStatus;
use crate::validation::{validate_cluster, validate_cluster_status_update, validate_cluster_update};

/// main resource: users own the spec, status survives their writes
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterStrategy;

impl Strategy<ClusterSpec> for ClusterStrategy {
    fn namespace_scoped(&self) -> bool {
        true
    }

    fn prepare_for_create(&self, obj: &mut Cluster) {
        obj.status = ClusterStatus::default();
        obj.metadata.generation = 1;
    }

    fn prepare_for_update(&self, obj: &mut Cluster, old: &Cluster) {
        obj.status = old.status.clone();
        if obj.spec != old.spec {
            obj.metadata.generation = old.metadata.generation + 1;
        }
    }

    fn validate_create(&self, obj: &Cluster) -> FieldErrorList {
        validate_cluster(obj)
    }

    fn validate_update(&self, obj: &Cluster, old: &Cluster) -> FieldErrorList {
        validate_cluster_update(obj, old)
    }
}

/// status subresource: only status moves, spec stays as stored
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterStatusStrategy;

impl Strategy<ClusterSpec> for ClusterStatusStrategy {
    fn namespace_scoped(&self) -> bool {
        ClusterStrategy.namespace_scoped()
    }

    fn prepare_for_create(&self, obj: &mut Cluster) {
        ClusterStrategy.prepare_for_create(obj)
    }

    fn prepare_for_update(&self, obj: &mut Cluster, old: &Cluster) {
        obj.spec = old.spec.clone();
        obj.metadata.labels = old.metadata.labels.clone();
    }

    fn validate_create(&self, obj: &Cluster) -> FieldErrorList {
        ClusterStrategy.validate_create(obj)
    }

    fn validate_update(&self, obj: &Cluster, old: &Cluster) -> FieldErrorList {
        validate_cluster_status_update(obj, old)
    }
}

#[cfg(test)]
mod test {
    use clusterop_model::ObjectMeta;
    use clusterop_registry::Strategy;

    use crate::Cluster;
    use crate::spec::{ClusterMachineSet, ClusterSpec, MachineSetConfig, NodeType};
    use crate::status::ClusterStatus;

    use super::{ClusterStatusStrategy, ClusterStrategy};

    fn cluster(size: i32) -> Cluster {
        Cluster::new(
            ObjectMeta::new("foo", "test"),
            ClusterSpec::new(vec![ClusterMachineSet::new(
                "master",
                MachineSetConfig::new(NodeType::Master, size).infra(),
            )]),
        )
    }

    #[test]
    fn test_create_resets_status() {
        let mut obj = cluster(1).with_status(ClusterStatus {
            machine_set_count: 4,
        });
        ClusterStrategy.prepare_for_create(&mut obj);
        assert_eq!(obj.status, ClusterStatus::default());
        assert_eq!(obj.metadata.generation, 1);
    }

    #[test]
    fn test_update_keeps_status_and_bumps_generation() {
        let mut old = cluster(1).with_status(ClusterStatus {
            machine_set_count: 1,
        });
        old.metadata.generation = 1;

        let mut same = cluster(1);
        same.metadata.generation = 1;
        ClusterStrategy.prepare_for_update(&mut same, &old);
        assert_eq!(same.status, old.status);
        assert_eq!(same.metadata.generation, 1);

        let mut resized = cluster(3);
        ClusterStrategy.prepare_for_update(&mut resized, &old);
        assert_eq!(resized.metadata.generation, 2);
    }

    #[test]
    fn test_status_update_keeps_spec() {
        let old = cluster(1);
        let mut obj = cluster(5).with_status(ClusterStatus {
            machine_set_count: 1,
        });
        obj.metadata.labels.insert("env".to_owned(), "prod".to_owned());

        ClusterStatusStrategy.prepare_for_update(&mut obj, &old);
        assert_eq!(obj.spec, old.spec);
        assert!(obj.metadata.labels.is_empty());
        assert_eq!(obj.status.machine_set_count, 1);
    }

    #[test]
    fn test_status_validation() {
        let old = cluster(1);
        let obj = cluster(1).with_status(ClusterStatus {
            machine_set_count: -2,
        });
        assert_eq!(ClusterStatusStrategy.validate_update(&obj, &old).len(), 1);
        assert!(ClusterStrategy.validate_update(&obj, &old).is_empty());
    }
}
