//! Field rules for clusters. Object metadata is checked by the store itself.

use std::collections::HashSet;

use clusterop_model::validation::is_dns1123_label;
use clusterop_model::{FieldError, FieldErrorList, FieldPath};

use crate::spec::{ClusterMachineSet, ClusterSpec, NodeType};
use crate::status::ClusterStatus;
use crate::Cluster;

pub fn validate_cluster(cluster: &Cluster) -> FieldErrorList {
    validate_cluster_spec(&cluster.spec, &FieldPath::new("spec"))
}

pub fn validate_cluster_update(new: &Cluster, _old: &Cluster) -> FieldErrorList {
    validate_cluster(new)
}

pub fn validate_cluster_status_update(new: &Cluster, _old: &Cluster) -> FieldErrorList {
    validate_cluster_status(&new.status, &FieldPath::new("status"))
}

pub fn validate_cluster_spec(spec: &ClusterSpec, path: &FieldPath) -> FieldErrorList {
    let path = path.child("machineSets");
    let mut errors = FieldErrorList::new();

    if spec.machine_sets.is_empty() {
        errors.push(FieldError::required(
            &path,
            "must have at least one machine set",
        ));
        return errors;
    }

    let mut names = HashSet::new();
    for (index, set) in spec.machine_sets.iter().enumerate() {
        let set_path = path.index(index);
        errors.extend(validate_machine_set(set, &set_path));
        if !set.name.is_empty() && !names.insert(set.name.as_str()) {
            errors.push(FieldError::duplicate(&set_path.child("name"), &set.name));
        }
    }

    let masters = spec
        .machine_sets
        .iter()
        .filter(|set| set.config.node_type == NodeType::Master)
        .count();
    if masters != 1 {
        errors.push(FieldError::invalid(
            &path,
            masters,
            "must have exactly one machine set with node type Master",
        ));
    }

    let infra = spec
        .machine_sets
        .iter()
        .filter(|set| set.config.infra)
        .count();
    if infra != 1 {
        errors.push(FieldError::invalid(
            &path,
            infra,
            "must have exactly one infra machine set",
        ));
    }

    errors
}

fn validate_machine_set(set: &ClusterMachineSet, path: &FieldPath) -> FieldErrorList {
    let mut errors = FieldErrorList::new();

    if set.name.is_empty() {
        errors.push(FieldError::required(&path.child("name"), ""));
    } else {
        for msg in is_dns1123_label(&set.name) {
            errors.push(FieldError::invalid(&path.child("name"), &set.name, msg));
        }
    }

    if set.config.size <= 0 {
        errors.push(FieldError::invalid(
            &path.child("size"),
            set.config.size,
            "must be positive",
        ));
    }

    errors
}

pub fn validate_cluster_status(status: &ClusterStatus, path: &FieldPath) -> FieldErrorList {
    let mut errors = FieldErrorList::new();
    if status.machine_set_count < 0 {
        errors.push(FieldError::invalid(
            &path.child("machineSetCount"),
            status.machine_set_count,
            "must be non-negative",
        ));
    }
    errors
}
