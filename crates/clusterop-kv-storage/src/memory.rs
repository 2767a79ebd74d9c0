//! In-memory multi-version backend.
//!
//! Latest values are kept in an ordered map, every mutation is appended to a
//! bounded change history. Reads at an older revision roll the latest values
//! back through the history, watches replay the history and then follow the
//! published revision. Once history is trimmed, reads and watches older than
//! the compacted revision fail with [`KvError::Compacted`].

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_lock::RwLock;
use async_trait::async_trait;
use fluvio_types::event::offsets::{OffsetChangeListener, OffsetPublisher};
use futures_util::StreamExt;
use tracing::{debug, trace};

use crate::{KvBackend, KvEntry, KvError, KvEvent, KvEventStream, KvListing, ListRequest, Revision};

pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

#[derive(Debug)]
struct MemoryInner {
    state: RwLock<MvccState>,
    /// latest committed revision
    publisher: Arc<OffsetPublisher>,
    history_limit: usize,
    unavailable: AtomicBool,
}

#[derive(Debug, Default)]
struct MvccState {
    revision: Revision,
    /// newest revision no longer covered by history
    compacted: Revision,
    live: BTreeMap<String, KvEntry>,
    history: VecDeque<KvEvent>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// keep at most `history_limit` changes, older ones are compacted away
    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                state: RwLock::new(MvccState::default()),
                publisher: OffsetPublisher::shared(0),
                history_limit: history_limit.max(1),
                unavailable: AtomicBool::new(false),
            }),
        }
    }

    /// drop history up to and including `revision`
    pub async fn compact(&self, revision: Revision) -> Result<(), KvError> {
        let mut state = self.inner.state.write().await;
        if revision > state.revision {
            return Err(KvError::FutureRevision {
                requested: revision,
                current: state.revision,
            });
        }
        while state
            .history
            .front()
            .is_some_and(|event| event.revision() <= revision)
        {
            state.history.pop_front();
        }
        state.compacted = state.compacted.max(revision);
        debug!(compacted = state.compacted, "history compacted");
        Ok(())
    }

    pub async fn compacted_revision(&self) -> Revision {
        self.inner.state.read().await.compacted
    }

    /// simulate an outage, every call fails with `Unavailable` while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), KvError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            Err(KvError::Unavailable("memory backend offline".to_owned()))
        } else {
            Ok(())
        }
    }

    /// append change and publish new revision while still holding write lock
    fn commit(&self, state: &mut MvccState, event: KvEvent) {
        let revision = event.revision();
        state.revision = revision;
        state.history.push_back(event);
        while state.history.len() > self.inner.history_limit {
            if let Some(dropped) = state.history.pop_front() {
                state.compacted = dropped.revision();
            }
        }
        self.inner.publisher.update(revision);
    }
}

impl MvccState {
    fn check_revision(&self, revision: Revision) -> Result<(), KvError> {
        if revision < self.compacted {
            return Err(KvError::Compacted {
                requested: revision,
                compacted: self.compacted,
            });
        }
        if revision > self.revision {
            return Err(KvError::FutureRevision {
                requested: revision,
                current: self.revision,
            });
        }
        Ok(())
    }

    /// values under prefix as they were at `revision`
    fn range_at(&self, prefix: &str, revision: Revision) -> Result<BTreeMap<String, KvEntry>, KvError> {
        self.check_revision(revision)?;

        let mut view: BTreeMap<String, KvEntry> = self
            .live
            .range(prefix.to_owned()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();

        for event in self
            .history
            .iter()
            .rev()
            .take_while(|event| event.revision() > revision)
        {
            if !event.key().starts_with(prefix) {
                continue;
            }
            match event {
                KvEvent::Put { entry, prev } => match prev {
                    Some(prev) => {
                        view.insert(prev.key.clone(), prev.clone());
                    }
                    None => {
                        view.remove(&entry.key);
                    }
                },
                KvEvent::Delete { prev, .. } => {
                    view.insert(prev.key.clone(), prev.clone());
                }
            }
        }

        Ok(view)
    }

    /// changes under prefix newer than `after`
    fn changes_since(&self, prefix: &str, after: Revision) -> Result<Vec<KvEvent>, KvError> {
        if after < self.compacted {
            return Err(KvError::Compacted {
                requested: after,
                compacted: self.compacted,
            });
        }
        let start = self.history.partition_point(|event| event.revision() <= after);
        Ok(self
            .history
            .range(start..)
            .filter(|event| event.key().starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>, KvError> {
        self.check_available()?;
        let state = self.inner.state.read().await;
        Ok(state.live.get(key).cloned())
    }

    async fn create(&self, key: &str, value: Vec<u8>) -> Result<KvEntry, KvError> {
        self.check_available()?;
        let mut state = self.inner.state.write().await;
        if state.live.contains_key(key) {
            return Err(KvError::KeyExists(key.to_owned()));
        }

        let revision = state.revision + 1;
        let entry = KvEntry {
            key: key.to_owned(),
            value,
            create_revision: revision,
            mod_revision: revision,
        };
        state.live.insert(key.to_owned(), entry.clone());
        self.commit(
            &mut state,
            KvEvent::Put {
                entry: entry.clone(),
                prev: None,
            },
        );
        debug!(key, revision, "created");
        Ok(entry)
    }

    async fn update(
        &self,
        key: &str,
        value: Vec<u8>,
        expected_revision: Revision,
    ) -> Result<KvEntry, KvError> {
        self.check_available()?;
        let mut state = self.inner.state.write().await;
        let Some(prev) = state.live.get(key).cloned() else {
            return Err(KvError::KeyNotFound(key.to_owned()));
        };
        if prev.mod_revision != expected_revision {
            return Err(KvError::RevisionMismatch {
                key: key.to_owned(),
                expected: expected_revision,
                actual: prev.mod_revision,
            });
        }

        let revision = state.revision + 1;
        let entry = KvEntry {
            key: key.to_owned(),
            value,
            create_revision: prev.create_revision,
            mod_revision: revision,
        };
        state.live.insert(key.to_owned(), entry.clone());
        self.commit(
            &mut state,
            KvEvent::Put {
                entry: entry.clone(),
                prev: Some(prev),
            },
        );
        debug!(key, revision, "updated");
        Ok(entry)
    }

    async fn delete(
        &self,
        key: &str,
        expected_revision: Option<Revision>,
    ) -> Result<(KvEntry, Revision), KvError> {
        self.check_available()?;
        let mut state = self.inner.state.write().await;
        let Some(prev) = state.live.get(key) else {
            return Err(KvError::KeyNotFound(key.to_owned()));
        };
        if let Some(expected) = expected_revision {
            if prev.mod_revision != expected {
                return Err(KvError::RevisionMismatch {
                    key: key.to_owned(),
                    expected,
                    actual: prev.mod_revision,
                });
            }
        }

        let revision = state.revision + 1;
        let Some(prev) = state.live.remove(key) else {
            return Err(KvError::KeyNotFound(key.to_owned()));
        };
        self.commit(
            &mut state,
            KvEvent::Delete {
                prev: prev.clone(),
                revision,
            },
        );
        debug!(key, revision, "deleted");
        Ok((prev, revision))
    }

    async fn list(&self, request: ListRequest) -> Result<KvListing, KvError> {
        self.check_available()?;
        let state = self.inner.state.read().await;
        let revision = request.revision.unwrap_or(state.revision);
        let view = state.range_at(&request.prefix, revision)?;
        drop(state);

        let mut candidates = view.into_values().skip_while(|entry| {
            request
                .start_key
                .as_ref()
                .is_some_and(|start| &entry.key < start)
        });

        let limit = request.limit.unwrap_or(usize::MAX);
        let entries: Vec<KvEntry> = candidates.by_ref().take(limit).collect();
        let remaining = candidates.count();

        trace!(
            prefix = %request.prefix,
            revision,
            returned = entries.len(),
            remaining,
            "listed"
        );
        Ok(KvListing {
            entries,
            revision,
            remaining,
        })
    }

    async fn watch(&self, prefix: &str, from_revision: Revision) -> Result<KvEventStream, KvError> {
        self.check_available()?;
        let compacted = self.compacted_revision().await;
        if from_revision < compacted {
            return Err(KvError::Compacted {
                requested: from_revision,
                compacted,
            });
        }

        debug!(prefix, from_revision, "watch started");
        let cursor = WatchCursor {
            inner: self.inner.clone(),
            listener: self.inner.publisher.change_listener(),
            prefix: prefix.to_owned(),
            scanned: from_revision,
            pending: VecDeque::new(),
            done: false,
        };

        Ok(futures_util::stream::unfold(cursor, |mut cursor| async move {
            cursor.next_event().await.map(|event| (event, cursor))
        })
        .boxed())
    }

    async fn current_revision(&self) -> Result<Revision, KvError> {
        self.check_available()?;
        Ok(self.inner.state.read().await.revision)
    }
}

/// position of a single watcher in the change history
struct WatchCursor {
    inner: Arc<MemoryInner>,
    listener: OffsetChangeListener,
    prefix: String,
    scanned: Revision,
    pending: VecDeque<KvEvent>,
    done: bool,
}

impl WatchCursor {
    async fn next_event(&mut self) -> Option<Result<KvEvent, KvError>> {
        if self.done {
            return None;
        }
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }

            let state = self.inner.state.read().await;
            match state.changes_since(&self.prefix, self.scanned) {
                Ok(changes) => {
                    self.scanned = state.revision;
                    drop(state);
                    trace!(prefix = %self.prefix, scanned = self.scanned, changes = changes.len(), "scanned");
                    if changes.is_empty() {
                        let revision = self.listener.listen().await;
                        trace!(revision, "revision published");
                    } else {
                        self.pending.extend(changes);
                    }
                }
                Err(err) => {
                    debug!(prefix = %self.prefix, %err, "watcher fell behind compaction");
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
