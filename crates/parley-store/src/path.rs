//! Slash-separated document and collection paths.
//!
//! A document path has an even number of segments (`chats/c1`,
//! `calls/c1/offerCandidates/x`), a collection path an odd number
//! (`chats`, `calls/c1/offerCandidates`).

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

fn segment_count(raw: &str) -> Result<usize> {
    if raw.is_empty() || raw.split('/').any(str::is_empty) {
        return Err(StoreError::InvalidPath(raw.to_string()));
    }
    Ok(raw.split('/').count())
}

impl DocPath {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if segment_count(&raw)? % 2 != 0 {
            return Err(StoreError::InvalidPath(raw));
        }
        Ok(Self(raw))
    }

    /// The last segment.
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn parent(&self) -> CollectionPath {
        let end = self.0.rfind('/').unwrap_or(0);
        CollectionPath(self.0[..end].to_string())
    }

    /// Sub-collection `name` below this document.
    pub fn collection(&self, name: &str) -> Result<CollectionPath> {
        CollectionPath::parse(format!("{}/{}", self.0, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl CollectionPath {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if segment_count(&raw)? % 2 != 1 {
            return Err(StoreError::InvalidPath(raw));
        }
        Ok(Self(raw))
    }

    pub fn doc(&self, id: &str) -> Result<DocPath> {
        DocPath::parse(format!("{}/{}", self.0, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_path_segments() {
        let path = DocPath::parse("calls/c1/offerCandidates/x").unwrap();
        assert_eq!(path.id(), "x");
        assert_eq!(path.parent().as_str(), "calls/c1/offerCandidates");

        assert!(DocPath::parse("chats").is_err());
        assert!(DocPath::parse("chats//c1").is_err());
        assert!(DocPath::parse("").is_err());
    }

    #[test]
    fn test_collection_path() {
        let call = DocPath::parse("calls/c1").unwrap();
        let coll = call.collection("answerCandidates").unwrap();
        assert_eq!(coll.as_str(), "calls/c1/answerCandidates");
        assert_eq!(coll.doc("a").unwrap().as_str(), "calls/c1/answerCandidates/a");
        assert!(CollectionPath::parse("calls/c1").is_err());
    }
}
