//! In-process [`DocumentStore`] with real-time fan-out.
//!
//! All state lives behind one mutex, so each write is atomic and watchers
//! observe writes in the order they were applied. Notifications are pushed
//! into unbounded channels while the lock is held; no watcher can block a
//! writer.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::document::{
    apply_merges, ChangeKind, CollectionSnapshot, Document, DocumentChange, FieldMerge, Snapshot,
};
use crate::error::{Result, StoreError};
use crate::path::{CollectionPath, DocPath};
use crate::store::{DocumentStore, Transform};
use crate::subscription::Subscription;

struct Watcher<T> {
    id: u64,
    tx: mpsc::UnboundedSender<T>,
}

#[derive(Default)]
struct Inner {
    docs: BTreeMap<String, Document>,
    doc_watchers: HashMap<String, Vec<Watcher<Snapshot>>>,
    collection_watchers: HashMap<String, Vec<Watcher<CollectionSnapshot>>>,
    next_watcher_id: u64,
    writes: usize,
    failing_prefixes: Vec<String>,
}

impl Inner {
    fn check_writable(&self, path: &str) -> Result<()> {
        if self
            .failing_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return Err(StoreError::Unavailable(format!("write rejected: {path}")));
        }
        Ok(())
    }

    fn children(&self, collection: &str) -> Vec<(String, Document)> {
        let prefix = format!("{collection}/");
        self.docs
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| !key[prefix.len()..].contains('/'))
            .map(|(key, doc)| (key[prefix.len()..].to_string(), doc.clone()))
            .collect()
    }

    /// Fan out the state of `path` after a write. `changed` is the new
    /// document, or the removed one for [`ChangeKind::Removed`].
    fn notify(&mut self, path: &DocPath, kind: ChangeKind, changed: Document) {
        self.writes += 1;

        let current = self.docs.get(path.as_str()).cloned();
        if let Some(watchers) = self.doc_watchers.get_mut(path.as_str()) {
            watchers.retain(|w| {
                w.tx.send(Snapshot {
                    path: path.clone(),
                    data: current.clone(),
                })
                .is_ok()
            });
        }

        let parent = path.parent();
        if self.collection_watchers.contains_key(parent.as_str()) {
            let docs = self.children(parent.as_str());
            let change = DocumentChange {
                kind,
                id: path.id().to_string(),
                data: changed,
            };
            if let Some(watchers) = self.collection_watchers.get_mut(parent.as_str()) {
                watchers.retain(|w| {
                    w.tx.send(CollectionSnapshot {
                        path: parent.clone(),
                        docs: docs.clone(),
                        changes: vec![change.clone()],
                    })
                    .is_ok()
                });
            }
        }

        trace!(path = %path, ?kind, "fanned out write");
    }

    fn put(&mut self, path: &DocPath, data: Document) {
        let kind = if self.docs.contains_key(path.as_str()) {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        };
        self.docs.insert(path.as_str().to_string(), data.clone());
        self.notify(path, kind, data);
    }

    fn remove(&mut self, path: &DocPath) -> bool {
        match self.docs.remove(path.as_str()) {
            Some(old) => {
                self.notify(path, ChangeKind::Removed, old);
                true
            }
            None => false,
        }
    }
}

/// Shared handle to an in-memory store. Clones see the same documents.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    /// Reject every later write to a path starting with `prefix`.
    pub fn fail_writes_under(&self, prefix: impl Into<String>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing_prefixes.push(prefix.into());
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing_prefixes.clear();
        }
    }

    /// Number of successful document writes so far.
    pub fn write_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.writes).unwrap_or(0)
    }

    /// Number of registered, not yet released watchers.
    pub fn active_watchers(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| {
                inner.doc_watchers.values().map(Vec::len).sum::<usize>()
                    + inner.collection_watchers.values().map(Vec::len).sum::<usize>()
            })
            .unwrap_or(0)
    }

    fn release_doc_watcher(inner: &Arc<Mutex<Inner>>, key: &str, id: u64) {
        if let Ok(mut inner) = inner.lock() {
            if let Some(watchers) = inner.doc_watchers.get_mut(key) {
                watchers.retain(|w| w.id != id);
                if watchers.is_empty() {
                    inner.doc_watchers.remove(key);
                }
            }
        }
    }

    fn release_collection_watcher(inner: &Arc<Mutex<Inner>>, key: &str, id: u64) {
        if let Ok(mut inner) = inner.lock() {
            if let Some(watchers) = inner.collection_watchers.get_mut(key) {
                watchers.retain(|w| w.id != id);
                if watchers.is_empty() {
                    inner.collection_watchers.remove(key);
                }
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Snapshot> {
        let inner = self.lock()?;
        Ok(Snapshot {
            path: path.clone(),
            data: inner.docs.get(path.as_str()).cloned(),
        })
    }

    async fn set(&self, path: &DocPath, data: Document) -> Result<()> {
        let mut inner = self.lock()?;
        inner.check_writable(path.as_str())?;
        inner.put(path, data);
        Ok(())
    }

    async fn update(&self, path: &DocPath, merges: Vec<FieldMerge>) -> Result<()> {
        let mut inner = self.lock()?;
        inner.check_writable(path.as_str())?;
        let mut doc = inner
            .docs
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        apply_merges(&mut doc, &merges)?;
        inner.put(path, doc);
        Ok(())
    }

    async fn add(&self, collection: &CollectionPath, data: Document) -> Result<DocPath> {
        let path = collection.doc(&Uuid::new_v4().simple().to_string())?;
        let mut inner = self.lock()?;
        inner.check_writable(path.as_str())?;
        inner.put(&path, data);
        Ok(path)
    }

    async fn delete(&self, path: &DocPath) -> Result<()> {
        let mut inner = self.lock()?;
        inner.check_writable(path.as_str())?;
        inner.remove(path);
        Ok(())
    }

    async fn delete_collection(&self, collection: &CollectionPath) -> Result<usize> {
        let mut inner = self.lock()?;
        inner.check_writable(collection.as_str())?;
        let ids: Vec<String> = inner
            .children(collection.as_str())
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        let mut removed = 0;
        for id in ids {
            if inner.remove(&collection.doc(&id)?) {
                removed += 1;
            }
        }
        debug!(collection = %collection, removed, "deleted collection");
        Ok(removed)
    }

    async fn transact(&self, path: &DocPath, transform: &Transform) -> Result<bool> {
        let mut inner = self.lock()?;
        inner.check_writable(path.as_str())?;
        let mut doc = match inner.docs.get(path.as_str()) {
            Some(doc) => doc.clone(),
            None => return Ok(false),
        };

        let merges = transform(&doc)?;
        if merges.is_empty() {
            return Ok(false);
        }
        apply_merges(&mut doc, &merges)?;
        inner.put(path, doc);
        Ok(true)
    }

    fn watch(&self, path: &DocPath) -> Result<Subscription<Snapshot>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock()?;
        let id = inner.next_watcher_id;
        inner.next_watcher_id += 1;

        // Initial state; cannot fail, the receiver is still in hand.
        let _ = tx.send(Snapshot {
            path: path.clone(),
            data: inner.docs.get(path.as_str()).cloned(),
        });
        inner
            .doc_watchers
            .entry(path.as_str().to_string())
            .or_default()
            .push(Watcher { id, tx });

        let key = path.as_str().to_string();
        let shared = self.inner.clone();
        Ok(Subscription::new(rx, move || {
            MemoryStore::release_doc_watcher(&shared, &key, id)
        }))
    }

    fn watch_collection(
        &self,
        collection: &CollectionPath,
    ) -> Result<Subscription<CollectionSnapshot>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock()?;
        let id = inner.next_watcher_id;
        inner.next_watcher_id += 1;

        let docs = inner.children(collection.as_str());
        let changes = docs
            .iter()
            .map(|(id, data)| DocumentChange {
                kind: ChangeKind::Added,
                id: id.clone(),
                data: data.clone(),
            })
            .collect();
        let _ = tx.send(CollectionSnapshot {
            path: collection.clone(),
            docs,
            changes,
        });
        inner
            .collection_watchers
            .entry(collection.as_str().to_string())
            .or_default()
            .push(Watcher { id, tx });

        let key = collection.as_str().to_string();
        let shared = self.inner.clone();
        Ok(Subscription::new(rx, move || {
            MemoryStore::release_collection_watcher(&shared, &key, id)
        }))
    }
}
