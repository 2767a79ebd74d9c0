use std::sync::Arc;

use tracing::{debug, instrument};

use clusterop_registry::{ApiError, RestOptions, StatusStore, Store};

use crate::spec::ClusterSpec;
use crate::strategy::{ClusterStatusStrategy, ClusterStrategy};

/// default resource prefix for clusters under the storage prefix
pub const RESOURCE_PREFIX: &str = "clusters";

pub type ClusterStore = Store<ClusterSpec>;
pub type ClusterStatusStore = StatusStore<ClusterSpec>;

/// store for clusters plus the status subresource sharing its backend and keys
#[instrument(skip(options), fields(prefix = %options.resource_prefix))]
pub fn new_storage(options: RestOptions) -> Result<(ClusterStore, ClusterStatusStore), ApiError> {
    let store = Store::new(&options, Arc::new(ClusterStrategy))?;
    let status = StatusStore::new(store.with_strategy(Arc::new(ClusterStatusStrategy)));
    debug!(root = store.key_root(), "cluster storage ready");
    Ok((store, status))
}
