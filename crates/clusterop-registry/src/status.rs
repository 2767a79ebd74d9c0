use tracing::instrument;

use clusterop_model::{ResourceObject, Spec};

use crate::error::ApiError;
use crate::options::{UpdateOptions, UpdatedObjectInfo};
use crate::store::Store;

/// status subresource: get and update only.
/// the wrapped store's strategy keeps spec changes out
#[derive(Debug, Clone)]
pub struct StatusStore<S: Spec> {
    store: Store<S>,
}

impl<S: Spec> StatusStore<S> {
    pub fn new(store: Store<S>) -> Self {
        Self { store }
    }

    pub fn new_object(&self) -> ResourceObject<S> {
        self.store.new_object()
    }

    pub async fn get(&self, namespace: &str, name: &str) -> Result<ResourceObject<S>, ApiError> {
        self.store.get(namespace, name).await
    }

    /// never creates, status of a missing object is NotFound
    #[instrument(skip(self, info, options), fields(kind = %S::kind()))]
    pub async fn update(
        &self,
        namespace: &str,
        name: &str,
        info: &dyn UpdatedObjectInfo<S>,
        options: &UpdateOptions,
    ) -> Result<(ResourceObject<S>, bool), ApiError> {
        let options = UpdateOptions {
            force_allow_create: false,
            ..options.clone()
        };
        self.store.update(namespace, name, info, &options).await
    }
}
