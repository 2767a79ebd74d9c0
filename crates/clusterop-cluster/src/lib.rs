//! Cluster resource served through the generic registry.
//!
//! A cluster is a desired set of machine sets. Exactly one of them holds the
//! masters and exactly one hosts infra workloads.

mod spec;
mod status;
mod storage;
mod strategy;
pub mod validation;

pub use self::spec::{ClusterMachineSet, ClusterSpec, MachineSetConfig, NodeType};
pub use self::status::ClusterStatus;
pub use self::storage::{ClusterStatusStore, ClusterStore, RESOURCE_PREFIX, new_storage};
pub use self::strategy::{ClusterStatusStrategy, ClusterStrategy};

use clusterop_model::{ResourceList, ResourceObject};

pub type Cluster = ResourceObject<ClusterSpec>;
pub type ClusterList = ResourceList<ClusterSpec>;
