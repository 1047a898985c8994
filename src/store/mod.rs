//! Document store abstraction.
//!
//! Every resource lives in a named collection of JSON documents keyed by a
//! string `id`. Backends implement [`RecordStore`]; handlers only see the
//! trait object.

pub mod memory;
pub mod mysql;
pub mod query;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

pub use query::{Condition, Order, Query};

pub type Document = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "camelCase")]
pub enum Collection {
    Users,
    VendorConnections,
    VendorProjects,
    Jobs,
    Applications,
    Interviews,
    Notices,
    LeaveRequests,
    LoanRequests,
    Attendance,
    RefreshTokens,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection} record '{id}' not found")]
    NotFound { collection: Collection, id: String },

    #[error("{collection} record '{id}' was modified concurrently")]
    GuardFailed { collection: Collection, id: String },

    #[error("{collection} record '{key}' already exists")]
    Duplicate { collection: Collection, key: String },

    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Backend(String),
}

/// Precondition attached to an update.
#[derive(Debug, Clone, PartialEq)]
pub enum Guard {
    /// The field must currently hold exactly this value.
    Equals(String, Value),
    /// The field must be absent.
    Missing(String),
}

impl Guard {
    pub fn equals(field: &str, value: impl Into<Value>) -> Self {
        Guard::Equals(field.to_string(), value.into())
    }

    pub fn missing(field: &str) -> Self {
        Guard::Missing(field.to_string())
    }

    pub fn holds(&self, doc: &Document) -> bool {
        match self {
            Guard::Equals(field, value) => doc.get(field) == Some(value),
            Guard::Missing(field) => matches!(doc.get(field), None | Some(Value::Null)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated(Document),
    NotFound,
    GuardFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(Document),
    Exists(Document),
}

/// One step of an all-or-nothing batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Insert {
        collection: Collection,
        doc: Document,
    },
    Update {
        collection: Collection,
        id: String,
        guard: Option<Guard>,
        patch: Document,
    },
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn find(&self, collection: Collection, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Number of documents matching the query, ignoring pagination.
    async fn count(&self, collection: Collection, query: &Query) -> Result<u64, StoreError>;

    /// Groups the matching documents by the string value of `field`.
    /// Missing or non-string values are grouped under `""`.
    async fn group_count(
        &self,
        collection: Collection,
        query: &Query,
        field: &str,
    ) -> Result<BTreeMap<String, u64>, StoreError>;

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError>;

    async fn find_by_key(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<Document>, StoreError>;

    async fn insert(&self, collection: Collection, doc: Document) -> Result<Document, StoreError>;

    /// Inserts `doc` unless a document with the same unique key exists, in
    /// which case the existing document is returned untouched.
    async fn insert_unique(
        &self,
        collection: Collection,
        key: &str,
        doc: Document,
    ) -> Result<InsertOutcome, StoreError>;

    /// Applies `patch` as a JSON merge patch.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        guard: Option<&Guard>,
        patch: Document,
    ) -> Result<UpdateOutcome, StoreError>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError>;

    /// Applies every op or none of them. Returns the written documents in
    /// op order.
    async fn commit(&self, ops: Vec<WriteOp>) -> Result<Vec<Document>, StoreError>;
}

pub fn to_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::Backend(
            "record must serialize to a JSON object".into(),
        )),
    }
}

pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

pub fn document_id(doc: &Document) -> Result<&str, StoreError> {
    doc.get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Backend("document has no string 'id'".into()))
}

/// RFC 7396 merge: `null` removes a key, nested objects merge, anything
/// else replaces.
pub fn merge_patch(target: &mut Document, patch: &Document) {
    for (key, value) in patch {
        match value {
            Value::Null => {
                target.remove(key);
            }
            Value::Object(inner) => match target.get_mut(key) {
                Some(Value::Object(existing)) => merge_patch(existing, inner),
                _ => {
                    let mut fresh = Document::new();
                    merge_patch(&mut fresh, inner);
                    target.insert(key.clone(), Value::Object(fresh));
                }
            },
            other => {
                target.insert(key.clone(), other.clone());
            }
        }
    }
}
