use thiserror::Error;

/// Errors produced by a document store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The targeted document does not exist.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// A path with the wrong number of segments or an empty segment.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A dotted field path that does not resolve inside the document.
    #[error("Invalid field path: {0}")]
    InvalidFieldPath(String),

    /// A value could not be converted to or from a document.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backend rejected or could not perform the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A transaction body gave up.
    #[error("Transaction aborted: {0}")]
    Aborted(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
