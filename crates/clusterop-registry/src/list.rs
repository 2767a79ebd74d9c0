use futures_util::stream::{self, StreamExt};
use tracing::{debug, instrument};

use clusterop_kv_storage::ListRequest;
use clusterop_model::{ListMeta, NameSpace, ResourceList, Spec};

use crate::error::ApiError;
use crate::options::{DeleteOptions, DeleteStatus, ListOptions};
use crate::pagination::{decode_continue, encode_continue};
use crate::store::{Store, parse_optional_version};
use crate::strategy::SelectionPredicate;

impl<S: Spec> Store<S> {
    /// objects in scope matching the selectors, in key order.
    /// every page of a paginated list reads the same snapshot
    #[instrument(skip(self, options), fields(kind = %S::kind()))]
    pub async fn list(
        &self,
        namespace: &NameSpace,
        options: &ListOptions,
    ) -> Result<ResourceList<S>, ApiError> {
        let prefix = self.layout.scope_prefix(namespace)?;
        let predicate = SelectionPredicate::new(
            options.label_selector.clone(),
            options.field_selector.clone(),
        );
        let limit = if self.paging {
            options.limit.filter(|limit| *limit > 0)
        } else {
            None
        };

        let (mut start_key, mut snapshot) = match options
            .continue_token
            .as_deref()
            .filter(|token| !token.is_empty())
        {
            Some(token) => {
                if parse_optional_version(options.resource_version.as_deref())?.is_some() {
                    return Err(ApiError::BadRequest(
                        "specifying resource version is not allowed when using continue"
                            .to_owned(),
                    ));
                }
                let (start, revision) = decode_continue(token, &prefix)?;
                (Some(start), Some(revision))
            }
            None => (
                None,
                parse_optional_version(options.resource_version.as_deref())?,
            ),
        };

        let mut items = vec![];
        let mut list_revision = 0;
        let mut resume_after = None;
        let mut remaining = 0;

        'pages: loop {
            let mut request = ListRequest::prefix(prefix.clone());
            if let Some(start) = start_key.take() {
                request = request.start_at(start);
            }
            if let Some(revision) = snapshot {
                request = request.at_revision(revision);
            }
            if let Some(limit) = limit {
                request = request.limit(limit);
            }

            let listing = self
                .backend
                .list(request)
                .await
                .map_err(|err| self.kv_error(err, ""))?;
            let more = listing.more();
            let left = listing.remaining;
            let fetched = listing.entries.len();
            list_revision = listing.revision;
            snapshot = Some(listing.revision);

            let mut last_key = None;
            for (index, entry) in listing.entries.into_iter().enumerate() {
                let obj = self.decode(&entry)?;
                if predicate.matches(&obj, self.strategy.as_ref()) {
                    items.push(obj);
                }
                if limit.is_some_and(|limit| items.len() >= limit) {
                    let unread = fetched - index - 1 + left;
                    if unread > 0 {
                        resume_after = Some(entry.key);
                        remaining = unread;
                    }
                    break 'pages;
                }
                last_key = Some(entry.key);
            }

            match last_key {
                Some(key) if more => start_key = Some(format!("{key}\0")),
                _ => break,
            }
        }

        let continue_token = resume_after
            .map(|key| encode_continue(&key, &prefix, list_revision))
            .transpose()?;
        let remaining_item_count = (continue_token.is_some() && predicate.is_empty())
            .then_some(remaining as i64);

        debug!(count = items.len(), revision = list_revision, "listed");
        Ok(ResourceList {
            metadata: ListMeta {
                resource_version: list_revision.to_string(),
                continue_token,
                remaining_item_count,
            },
            items,
        })
    }

    /// delete every object matched by `list_options` using a bounded pool of workers.
    /// objects that vanish concurrently are skipped
    #[instrument(skip(self, delete_options, list_options), fields(kind = %S::kind()))]
    pub async fn delete_collection(
        &self,
        namespace: &NameSpace,
        delete_options: &DeleteOptions,
        list_options: &ListOptions,
    ) -> Result<ResourceList<S>, ApiError> {
        let list_options = ListOptions {
            limit: None,
            continue_token: None,
            ..list_options.clone()
        };
        let listed = self.list(namespace, &list_options).await?;
        let workers = self.delete_collection_workers.max(1);

        let results: Vec<_> = stream::iter(listed.items)
            .map(|item| async move {
                let result = self
                    .delete(&item.metadata.namespace, &item.metadata.name, delete_options)
                    .await;
                (item, result)
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut deleted = vec![];
        let mut errors = vec![];
        for (item, result) in results {
            match result {
                Ok(DeleteStatus::Deleted(_)) => deleted.push(item),
                Ok(DeleteStatus::DeletedObject(obj) | DeleteStatus::Pending(obj)) => {
                    deleted.push(obj)
                }
                Err(err) if err.is_not_found() => {
                    debug!(name = %item.metadata.name, "already gone");
                }
                Err(err) => errors.push(err),
            }
        }

        if !errors.is_empty() {
            return Err(ApiError::Aggregate(errors));
        }

        deleted.sort_by(|a, b| {
            (&a.metadata.namespace, &a.metadata.name).cmp(&(&b.metadata.namespace, &b.metadata.name))
        });
        debug!(count = deleted.len(), "deleted collection");
        Ok(ResourceList {
            metadata: ListMeta {
                resource_version: listed.metadata.resource_version,
                ..Default::default()
            },
            items: deleted,
        })
    }
}
