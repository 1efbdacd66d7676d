use async_trait::async_trait;

use crate::document::{CollectionSnapshot, Document, FieldMerge, Snapshot};
use crate::error::Result;
use crate::path::{CollectionPath, DocPath};
use crate::subscription::Subscription;

/// Body of a [`DocumentStore::transact`] call: receives the current
/// document and returns the field merges to apply atomically. Must be pure,
/// since a backend may run it more than once.
pub type Transform = dyn Fn(&Document) -> Result<Vec<FieldMerge>> + Send + Sync;

/// A remote reactive document store.
///
/// Subscriptions deliver full snapshots, never diffs, and fire for every
/// change including the subscriber's own writes. A new subscription
/// immediately yields the current state.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> Result<Snapshot>;

    /// Overwrite (or create) a whole document.
    async fn set(&self, path: &DocPath, data: Document) -> Result<()>;

    /// Partial write. Fails with `NotFound` when the document is missing.
    async fn update(&self, path: &DocPath, merges: Vec<FieldMerge>) -> Result<()>;

    /// Create a document with a store-assigned id inside `collection`.
    async fn add(&self, collection: &CollectionPath, data: Document) -> Result<DocPath>;

    async fn delete(&self, path: &DocPath) -> Result<()>;

    /// Delete every direct child document of `collection`, returning how
    /// many were removed.
    async fn delete_collection(&self, collection: &CollectionPath) -> Result<usize>;

    /// Atomic read-modify-write of one document. Returns `false` without
    /// calling `transform` when the document does not exist, and `false`
    /// when `transform` returns no merges.
    async fn transact(&self, path: &DocPath, transform: &Transform) -> Result<bool>;

    fn watch(&self, path: &DocPath) -> Result<Subscription<Snapshot>>;

    fn watch_collection(
        &self,
        collection: &CollectionPath,
    ) -> Result<Subscription<CollectionSnapshot>>;
}
