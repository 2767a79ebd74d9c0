use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_channel::{Sender, bounded};
use fluvio_future::task::spawn;
use fluvio_types::event::StickyEvent;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use tokio::select;
use tracing::{debug, instrument, trace};

use clusterop_kv_storage::{KvEntry, KvEvent, ListRequest, Revision};
use clusterop_model::{NameSpace, ResourceObject, Spec, WatchEvent};

use crate::error::ApiError;
use crate::options::WatchOptions;
use crate::store::{Store, parse_optional_version};
use crate::strategy::SelectionPredicate;

/// ordered stream of changes for one consumer.
/// dropping it stops the producer
pub struct WatchStream<S: Spec> {
    events: BoxStream<'static, WatchEvent<S>>,
    stop: Arc<StickyEvent>,
}

impl<S: Spec> WatchStream<S> {
    /// stop producing, events already buffered are still delivered
    pub fn stop(&self) {
        self.stop.notify();
    }
}

impl<S: Spec> Stream for WatchStream<S> {
    type Item = WatchEvent<S>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_next_unpin(cx)
    }
}

impl<S: Spec> Drop for WatchStream<S> {
    fn drop(&mut self) {
        self.stop.notify();
    }
}

impl<S: Spec> Store<S> {
    /// changes in scope matching the selectors.
    /// without a resource version the current state is replayed as added events first
    #[instrument(skip(self, options), fields(kind = %S::kind()))]
    pub async fn watch(
        &self,
        namespace: &NameSpace,
        options: WatchOptions,
    ) -> Result<WatchStream<S>, ApiError> {
        let prefix = self.layout.scope_prefix(namespace)?;
        let start = parse_optional_version(options.resource_version.as_deref())?;
        let (sender, receiver) = bounded(self.watch_channel_capacity);
        let stop = StickyEvent::shared();

        let producer = WatchProducer {
            store: self.clone(),
            prefix,
            predicate: SelectionPredicate::new(options.label_selector, options.field_selector),
            sender,
            stop: stop.clone(),
        };
        spawn(producer.run(start));

        Ok(WatchStream {
            events: receiver.boxed(),
            stop,
        })
    }
}

struct WatchProducer<S: Spec> {
    store: Store<S>,
    prefix: String,
    predicate: SelectionPredicate,
    sender: Sender<WatchEvent<S>>,
    stop: Arc<StickyEvent>,
}

impl<S: Spec> WatchProducer<S> {
    #[instrument(skip(self), fields(kind = %S::kind(), prefix = %self.prefix))]
    async fn run(self, start: Option<Revision>) {
        let from = match start {
            Some(revision) => revision,
            None => match self.replay_current().await {
                Ok(Some(revision)) => revision,
                Ok(None) => return,
                Err(err) => {
                    self.send_error(err).await;
                    return;
                }
            },
        };

        let mut changes = match self.store.backend.watch(&self.prefix, from).await {
            Ok(changes) => changes,
            Err(err) => {
                self.send_error(self.store.kv_error(err, "")).await;
                return;
            }
        };
        debug!(from, "watch started");

        loop {
            select! {
                biased;
                _ = self.stop.listen() => {
                    debug!("watch stopped");
                    break;
                },
                change = changes.next() => match change {
                    Some(Ok(change)) => match self.translate(change) {
                        Ok(Some(event)) => {
                            if !self.send(event).await {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            self.send_error(err).await;
                            break;
                        }
                    },
                    Some(Err(err)) => {
                        self.send_error(self.store.kv_error(err, "")).await;
                        break;
                    }
                    None => {
                        debug!("change feed ended");
                        break;
                    }
                }
            }
        }
    }

    /// sends current matching objects as added, returns revision they were read at.
    /// none when the consumer went away
    async fn replay_current(&self) -> Result<Option<Revision>, ApiError> {
        let listing = self
            .store
            .backend
            .list(ListRequest::prefix(self.prefix.clone()))
            .await
            .map_err(|err| self.store.kv_error(err, ""))?;

        for entry in &listing.entries {
            let obj = self.store.decode(entry)?;
            if self.matches(&obj) && !self.send(WatchEvent::Added(obj)).await {
                return Ok(None);
            }
        }
        Ok(Some(listing.revision))
    }

    fn matches(&self, obj: &ResourceObject<S>) -> bool {
        self.predicate.matches(obj, self.store.strategy.as_ref())
    }

    fn decode_at(&self, entry: &KvEntry, revision: Revision) -> Result<ResourceObject<S>, ApiError> {
        Ok(self.store.codec.decode(&entry.value, revision)?)
    }

    /// objects moving in or out of the selection become added or deleted
    fn translate(&self, change: KvEvent) -> Result<Option<WatchEvent<S>>, ApiError> {
        match change {
            KvEvent::Put { entry, prev } => {
                let current = self.store.decode(&entry)?;
                let now_matches = self.matches(&current);
                let was_matching = match prev {
                    Some(prev) => Some(self.matches(&self.store.decode(&prev)?)),
                    None => None,
                };
                Ok(match (was_matching, now_matches) {
                    (Some(true), true) => Some(WatchEvent::Modified(current)),
                    (None | Some(false), true) => Some(WatchEvent::Added(current)),
                    (Some(true), false) => Some(WatchEvent::Deleted(current)),
                    (_, false) => None,
                })
            }
            KvEvent::Delete { prev, revision } => {
                let deleted = self.decode_at(&prev, revision)?;
                Ok(self.matches(&deleted).then_some(WatchEvent::Deleted(deleted)))
            }
        }
    }

    /// blocks while the consumer buffer is full, false once the consumer is gone
    async fn send(&self, event: WatchEvent<S>) -> bool {
        trace!(event = event.type_name(), "sending");
        select! {
            biased;
            _ = self.stop.listen() => false,
            result = self.sender.send(event) => result.is_ok(),
        }
    }

    async fn send_error(&self, err: ApiError) {
        debug!(%err, "watch terminated with error");
        self.send(WatchEvent::Error(err.to_status())).await;
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use fluvio_future::timer::sleep;
    use futures_util::StreamExt;
    use tokio::select;

    use clusterop_kv_storage::KvBackend;
    use clusterop_model::fixture::{TestObject, TestSpec};
    use clusterop_model::{NameSpace, ObjectMeta, StatusReason, WatchEvent};

    use super::WatchStream;
    use crate::options::{DeleteOptions, ListOptions, UpdateOptions, WatchOptions};
    use crate::store::Store;
    use crate::testing::{TestStrategy, next_event, test_store, test_store_with};

    async fn create(
        store: &Store<TestSpec>,
        namespace: &str,
        name: &str,
        labels: Vec<(&str, &str)>,
    ) -> TestObject {
        let meta = ObjectMeta::new(name, namespace).set_labels(labels);
        store
            .create(namespace, TestObject::new(meta, TestSpec::default()))
            .await
            .expect("create")
    }

    async fn expect_event(stream: &mut WatchStream<TestSpec>) -> WatchEvent<TestSpec> {
        next_event(stream).await.expect("watch event")
    }

    #[fluvio_future::test]
    async fn test_watch_replays_then_follows() {
        let (store, _) = test_store(TestStrategy::default());
        let created = create(&store, "ns1", "a", vec![]).await;
        let mut stream = store
            .watch(&NameSpace::All, WatchOptions::default())
            .await
            .expect("watch");

        assert_eq!(expect_event(&mut stream).await, WatchEvent::Added(created.clone()));

        let mut change = created.clone();
        change.spec.replica = 4;
        let (updated, _) = store
            .update("ns1", "a", &change, &UpdateOptions::default())
            .await
            .expect("update");
        assert_eq!(expect_event(&mut stream).await, WatchEvent::Modified(updated.clone()));

        store
            .delete("ns1", "a", &DeleteOptions::default())
            .await
            .expect("delete");
        match expect_event(&mut stream).await {
            WatchEvent::Deleted(deleted) => {
                assert_eq!(deleted.name(), "a");
                assert!(deleted.metadata.revision() > updated.metadata.revision());
            }
            other => panic!("expected deleted, got {other:?}"),
        }
    }

    type Key = (String, String);

    fn key(obj: &TestObject) -> Key {
        (obj.namespace().to_owned(), obj.name().to_owned())
    }

    /// applies events until the stream goes quiet
    async fn fold_events(
        stream: &mut WatchStream<TestSpec>,
        state: &mut BTreeMap<Key, TestObject>,
    ) {
        while let Some(event) = next_event(stream).await {
            match event {
                WatchEvent::Added(obj) | WatchEvent::Modified(obj) => {
                    state.insert(key(&obj), obj);
                }
                WatchEvent::Deleted(obj) => {
                    state.remove(&key(&obj));
                }
                WatchEvent::Error(status) => panic!("watch failed: {status:?}"),
            }
        }
    }

    #[fluvio_future::test]
    async fn test_watch_folds_into_latest_list() {
        let (store, _) = test_store(TestStrategy::default());
        create(&store, "ns1", "a", vec![]).await;
        create(&store, "ns2", "b", vec![]).await;

        let start = store
            .list(&NameSpace::All, &ListOptions::default())
            .await
            .expect("list");
        let mut from_start = store
            .watch(
                &NameSpace::All,
                WatchOptions::default().from_version(start.metadata.resource_version.clone()),
            )
            .await
            .expect("watch");
        let mut replayed = store
            .watch(&NameSpace::All, WatchOptions::default())
            .await
            .expect("watch");

        create(&store, "ns1", "c", vec![]).await;
        create(&store, "ns2", "d", vec![]).await;
        for (namespace, name, replica) in [("ns1", "a", 3), ("ns1", "c", 5), ("ns1", "c", 6)] {
            let mut change = store.get(namespace, name).await.expect("get");
            change.spec.replica = replica;
            store
                .update(namespace, name, &change, &UpdateOptions::default())
                .await
                .expect("update");
        }
        store
            .delete("ns2", "b", &DeleteOptions::default())
            .await
            .expect("delete");
        create(&store, "ns2", "e", vec![]).await;
        store
            .delete("ns2", "d", &DeleteOptions::default())
            .await
            .expect("delete");

        let latest = store
            .list(&NameSpace::All, &ListOptions::default())
            .await
            .expect("list");
        let expected = latest.items;
        assert_eq!(expected.len(), 3);

        let mut state: BTreeMap<Key, TestObject> =
            start.items.into_iter().map(|obj| (key(&obj), obj)).collect();
        fold_events(&mut from_start, &mut state).await;
        assert_eq!(state.into_values().collect::<Vec<_>>(), expected);

        let mut state = BTreeMap::new();
        fold_events(&mut replayed, &mut state).await;
        assert_eq!(state.into_values().collect::<Vec<_>>(), expected);
    }

    #[fluvio_future::test]
    async fn test_watch_from_version() {
        let (store, _) = test_store(TestStrategy::default());
        let first = create(&store, "ns1", "a", vec![]).await;
        let second = create(&store, "ns1", "b", vec![]).await;

        let mut stream = store
            .watch(
                &NameSpace::All,
                WatchOptions::default().from_version(first.resource_version()),
            )
            .await
            .expect("watch");

        assert_eq!(expect_event(&mut stream).await, WatchEvent::Added(second));
        assert!(next_event(&mut stream).await.is_none());
    }

    #[fluvio_future::test]
    async fn test_watch_selector_transitions() {
        let (store, _) = test_store(TestStrategy::default());
        let web = create(&store, "ns1", "a", vec![("app", "web")]).await;
        let mut stream = store
            .watch(
                &NameSpace::All,
                WatchOptions::default()
                    .labels("app=web".parse().expect("selector"))
                    .from_version(web.resource_version()),
            )
            .await
            .expect("watch");

        let mut relabeled = web.clone();
        relabeled.metadata.labels.insert("app".to_owned(), "db".to_owned());
        let (moved_out, _) = store
            .update("ns1", "a", &relabeled, &UpdateOptions::default())
            .await
            .expect("update");
        assert_eq!(expect_event(&mut stream).await, WatchEvent::Deleted(moved_out.clone()));

        create(&store, "ns1", "other", vec![("app", "db")]).await;

        let mut back = moved_out.clone();
        back.metadata.labels.insert("app".to_owned(), "web".to_owned());
        let (moved_in, _) = store
            .update("ns1", "a", &back, &UpdateOptions::default())
            .await
            .expect("update");
        assert_eq!(expect_event(&mut stream).await, WatchEvent::Added(moved_in));
    }

    #[fluvio_future::test]
    async fn test_watch_namespace_scope() {
        let (store, _) = test_store(TestStrategy::default());
        let mut stream = store
            .watch(&"ns1".into(), WatchOptions::default())
            .await
            .expect("watch");

        create(&store, "ns2", "a", vec![]).await;
        let mine = create(&store, "ns1", "b", vec![]).await;

        assert_eq!(expect_event(&mut stream).await, WatchEvent::Added(mine));
    }

    #[fluvio_future::test]
    async fn test_watch_too_old_version() {
        let (store, backend) = test_store(TestStrategy::default());
        let first = create(&store, "ns1", "a", vec![]).await;
        create(&store, "ns1", "b", vec![]).await;
        let current = backend.current_revision().await.expect("revision");
        backend.compact(current).await.expect("compact");

        let mut stream = store
            .watch(
                &NameSpace::All,
                WatchOptions::default().from_version(first.resource_version()),
            )
            .await
            .expect("watch");

        match expect_event(&mut stream).await {
            WatchEvent::Error(status) => {
                assert_eq!(status.code, 410);
                assert_eq!(status.reason, StatusReason::Expired);
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert!(stream.next().await.is_none());
    }

    #[fluvio_future::test]
    async fn test_watch_bad_version() {
        let (store, _) = test_store(TestStrategy::default());

        let err = store
            .watch(&NameSpace::All, WatchOptions::default().from_version("abc"))
            .await
            .err()
            .expect("bad version");

        assert!(err.is_bad_request(), "{err}");
    }

    #[fluvio_future::test]
    async fn test_watch_stop() {
        let (store, _) = test_store(TestStrategy::default());
        let mut stream = store
            .watch(&NameSpace::All, WatchOptions::default())
            .await
            .expect("watch");

        stream.stop();
        create(&store, "ns1", "a", vec![]).await;

        select! {
            event = stream.next() => assert!(event.is_none(), "got {event:?} after stop"),
            _ = sleep(Duration::from_secs(2)) => panic!("stream did not end after stop"),
        }
    }

    #[fluvio_future::test]
    async fn test_watch_slow_consumer_loses_nothing() {
        let (store, _) = test_store_with(TestStrategy::default(), |mut config| {
            config.watch_channel_capacity = 2;
            config
        });
        let names = ["w1", "w2", "w3", "w4", "w5"];
        for name in names {
            create(&store, "ns1", name, vec![]).await;
        }

        let mut stream = store
            .watch(&NameSpace::All, WatchOptions::default())
            .await
            .expect("watch");
        sleep(Duration::from_millis(20)).await;
        create(&store, "ns1", "w6", vec![]).await;

        let mut seen = vec![];
        for _ in 0..6 {
            match expect_event(&mut stream).await {
                WatchEvent::Added(obj) => seen.push(obj.metadata.name),
                other => panic!("expected added, got {other:?}"),
            }
        }
        assert_eq!(seen, vec!["w1", "w2", "w3", "w4", "w5", "w6"]);
    }
}
