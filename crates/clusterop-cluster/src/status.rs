use serde::{Deserialize, Serialize};

use clusterop_model::Status;

/// observed state, written only through the status store
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub machine_set_count: i32,
}

impl Status for ClusterStatus {}
