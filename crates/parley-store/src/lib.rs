//! # parley-store
//!
//! Contract of the remote reactive document store the chat client is built
//! on, plus [`MemoryStore`], an in-process implementation with the same
//! fan-out semantics.
//!
//! Every document is a JSON object. Writers never receive acknowledgements
//! through their subscriptions specially: a write is fanned out as a full
//! snapshot to every watcher of that document, the writer included.

pub mod document;
pub mod memory;
pub mod path;
pub mod store;
pub mod subscription;

mod error;

pub use document::{
    from_document, to_document, ChangeKind, CollectionSnapshot, Document, DocumentChange,
    FieldMerge, FieldOp, Snapshot,
};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use path::{CollectionPath, DocPath};
pub use store::{DocumentStore, Transform};
pub use subscription::Subscription;
