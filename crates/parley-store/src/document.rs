//! Document values, snapshots and partial-write operations.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::path::{CollectionPath, DocPath};

/// A stored document: always a JSON object at the top level.
pub type Document = serde_json::Map<String, Value>;

pub fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!(
            "expected an object, got {other}"
        ))),
    }
}

pub fn from_document<T: DeserializeOwned>(doc: &Document) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(doc.clone()))?)
}

/// Full state of one document at some point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub path: DocPath,
    /// `None` when the document does not exist.
    pub data: Option<Document>,
}

impl Snapshot {
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.data.as_ref().map(from_document).transpose()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub id: String,
    pub data: Document,
}

/// Full current contents of a collection plus the changes since the
/// previous delivery to the same subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot {
    pub path: CollectionPath,
    pub docs: Vec<(String, Document)>,
    pub changes: Vec<DocumentChange>,
}

impl CollectionSnapshot {
    pub fn added(&self) -> impl Iterator<Item = &DocumentChange> {
        self.changes.iter().filter(|c| c.kind == ChangeKind::Added)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Set(Value),
    Delete,
    /// Append each value not already present, without reading the field
    /// first. A missing or non-array field becomes an array.
    ArrayUnion(Vec<Value>),
    /// Remove every occurrence of each value.
    ArrayRemove(Vec<Value>),
}

/// A write to one dotted field path (`tagline`, `chats.3.lastMessage`).
/// Numeric segments index into arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMerge {
    pub field: String,
    pub op: FieldOp,
}

impl FieldMerge {
    pub fn set(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FieldOp::Set(value),
        }
    }

    pub fn delete(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: FieldOp::Delete,
        }
    }

    pub fn array_union(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            op: FieldOp::ArrayUnion(values),
        }
    }

    pub fn array_remove(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            op: FieldOp::ArrayRemove(values),
        }
    }
}

/// Apply `merges` in order. On error `doc` is left untouched.
pub fn apply_merges(doc: &mut Document, merges: &[FieldMerge]) -> Result<()> {
    let mut next = doc.clone();
    for merge in merges {
        let segments: Vec<&str> = merge.field.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(StoreError::InvalidFieldPath(merge.field.clone()));
        }
        apply_in_map(&mut next, &segments, &merge.op, &merge.field)?;
    }
    *doc = next;
    Ok(())
}

fn apply_in_map(map: &mut Document, segments: &[&str], op: &FieldOp, field: &str) -> Result<()> {
    let (head, rest) = segments
        .split_first()
        .ok_or_else(|| StoreError::InvalidFieldPath(field.to_string()))?;

    if rest.is_empty() {
        match leaf_value(map.get(*head), op) {
            Some(value) => {
                map.insert(head.to_string(), value);
            }
            None => {
                map.remove(*head);
            }
        }
        return Ok(());
    }

    let child = map
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(Document::new()));
    apply_in_value(child, rest, op, field)
}

fn apply_in_value(value: &mut Value, segments: &[&str], op: &FieldOp, field: &str) -> Result<()> {
    match value {
        Value::Object(map) => apply_in_map(map, segments, op, field),
        Value::Array(items) => {
            let (head, rest) = segments
                .split_first()
                .ok_or_else(|| StoreError::InvalidFieldPath(field.to_string()))?;
            let index: usize = head
                .parse()
                .map_err(|_| StoreError::InvalidFieldPath(field.to_string()))?;
            let slot = items
                .get_mut(index)
                .ok_or_else(|| StoreError::InvalidFieldPath(field.to_string()))?;

            if rest.is_empty() {
                // Array elements can be replaced but not deleted by path.
                *slot = leaf_value(Some(&*slot), op)
                    .ok_or_else(|| StoreError::InvalidFieldPath(field.to_string()))?;
                Ok(())
            } else {
                apply_in_value(slot, rest, op, field)
            }
        }
        _ => Err(StoreError::InvalidFieldPath(field.to_string())),
    }
}

/// New value of a field, `None` meaning "remove the field".
fn leaf_value(existing: Option<&Value>, op: &FieldOp) -> Option<Value> {
    match op {
        FieldOp::Set(value) => Some(value.clone()),
        FieldOp::Delete => None,
        FieldOp::ArrayUnion(values) => {
            let mut items = match existing {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            for value in values {
                if !items.contains(value) {
                    items.push(value.clone());
                }
            }
            Some(Value::Array(items))
        }
        FieldOp::ArrayRemove(values) => {
            let items = match existing {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter(|item| !values.contains(item))
                    .cloned()
                    .collect(),
                _ => Vec::new(),
            };
            Some(Value::Array(items))
        }
    }
}
