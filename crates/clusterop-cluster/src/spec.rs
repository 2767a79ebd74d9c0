use std::fmt;

use serde::{Deserialize, Serialize};

use clusterop_model::{Crd, CrdNames, Spec};

use crate::status::ClusterStatus;

const CLUSTER_API: Crd = Crd {
    group: "clusteroperator.openshift.io",
    version: "v1alpha1",
    names: CrdNames {
        kind: "Cluster",
        plural: "clusters",
        singular: "cluster",
    },
};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// ordered, names unique within the cluster
    #[serde(default)]
    pub machine_sets: Vec<ClusterMachineSet>,
}

impl Spec for ClusterSpec {
    type Status = ClusterStatus;

    fn metadata() -> &'static Crd {
        &CLUSTER_API
    }
}

impl ClusterSpec {
    pub fn new(machine_sets: Vec<ClusterMachineSet>) -> Self {
        Self { machine_sets }
    }

    pub fn master(&self) -> Option<&ClusterMachineSet> {
        self.machine_sets
            .iter()
            .find(|set| set.config.node_type == NodeType::Master)
    }
}

/// machine set of a cluster, config is inlined on the wire
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMachineSet {
    pub name: String,
    #[serde(flatten)]
    pub config: MachineSetConfig,
}

impl ClusterMachineSet {
    pub fn new(name: impl Into<String>, config: MachineSetConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSetConfig {
    pub node_type: NodeType,
    #[serde(default)]
    pub infra: bool,
    pub size: i32,
}

impl MachineSetConfig {
    pub fn new(node_type: NodeType, size: i32) -> Self {
        Self {
            node_type,
            infra: false,
            size,
        }
    }

    pub fn infra(mut self) -> Self {
        self.infra = true;
        self
    }
}

/// role of the nodes in a machine set
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    Master,
    #[default]
    Compute,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Master => write!(f, "Master"),
            Self::Compute => write!(f, "Compute"),
        }
    }
}

#[cfg(test)]
mod test {
    use clusterop_model::Spec;

    use super::{ClusterMachineSet, ClusterSpec, MachineSetConfig, NodeType};

    #[test]
    fn test_cluster_type_meta() {
        assert_eq!(ClusterSpec::kind(), "Cluster");
        assert_eq!(
            ClusterSpec::api_version(),
            "clusteroperator.openshift.io/v1alpha1"
        );
        assert_eq!(ClusterSpec::plural(), "clusters");
    }

    #[test]
    fn test_machine_set_config_inlined() {
        let spec = ClusterSpec::new(vec![ClusterMachineSet::new(
            "master",
            MachineSetConfig::new(NodeType::Master, 1).infra(),
        )]);

        let json = serde_json::to_string(&spec).expect("serialize");
        assert_eq!(
            json,
            r#"{"machineSets":[{"name":"master","nodeType":"Master","infra":true,"size":1}]}"#
        );

        let decoded: ClusterSpec = serde_json::from_str(
            r#"{"machineSets":[{"name":"compute","nodeType":"Compute","size":3}]}"#,
        )
        .expect("deserialize");
        let set = &decoded.machine_sets[0];
        assert_eq!(set.config.node_type, NodeType::Compute);
        assert!(!set.config.infra);
        assert_eq!(set.config.size, 3);
        assert!(decoded.master().is_none());
    }
}
