use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::{
    Collection, Document, Guard, InsertOutcome, Query, RecordStore, StoreError, UpdateOutcome,
    WriteOp, document_id, merge_patch,
};

#[derive(Debug, Clone)]
struct Row {
    key: Option<String>,
    doc: Document,
}

type Tables = HashMap<Collection, Vec<Row>>;

/// Process-local backend. Rows keep insertion order; every write takes the
/// single write lock, which also makes `insert_unique` and `commit` atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn matching(&self, collection: Collection, query: &Query) -> Result<Vec<Document>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .get(&collection)
            .map(|rows| {
                rows.iter()
                    .filter(|r| query.matches(&r.doc))
                    .map(|r| r.doc.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn apply_insert(
    tables: &mut Tables,
    collection: Collection,
    key: Option<&str>,
    doc: Document,
) -> Result<InsertOutcome, StoreError> {
    let id = document_id(&doc)?.to_string();
    let rows = tables.entry(collection).or_default();

    if let Some(key) = key {
        if let Some(existing) = rows.iter().find(|r| r.key.as_deref() == Some(key)) {
            return Ok(InsertOutcome::Exists(existing.doc.clone()));
        }
    }
    if rows.iter().any(|r| r.doc.get("id").and_then(Value::as_str) == Some(id.as_str())) {
        return Err(StoreError::Duplicate { collection, key: id });
    }

    rows.push(Row {
        key: key.map(str::to_string),
        doc: doc.clone(),
    });
    Ok(InsertOutcome::Inserted(doc))
}

fn apply_update(
    tables: &mut Tables,
    collection: Collection,
    id: &str,
    guard: Option<&Guard>,
    patch: &Document,
) -> UpdateOutcome {
    let Some(row) = tables.get_mut(&collection).and_then(|rows| {
        rows.iter_mut()
            .find(|r| r.doc.get("id").and_then(Value::as_str) == Some(id))
    }) else {
        return UpdateOutcome::NotFound;
    };

    if guard.is_some_and(|g| !g.holds(&row.doc)) {
        return UpdateOutcome::GuardFailed;
    }

    merge_patch(&mut row.doc, patch);
    // the id is immutable even if a patch names it
    row.doc.insert("id".into(), Value::String(id.to_string()));
    UpdateOutcome::Updated(row.doc.clone())
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn find(&self, collection: Collection, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut docs = self.matching(collection, query)?;
        query.arrange(&mut docs);
        Ok(docs)
    }

    async fn count(&self, collection: Collection, query: &Query) -> Result<u64, StoreError> {
        Ok(self.matching(collection, query)?.len() as u64)
    }

    async fn group_count(
        &self,
        collection: Collection,
        query: &Query,
        field: &str,
    ) -> Result<BTreeMap<String, u64>, StoreError> {
        let mut groups = BTreeMap::new();
        for doc in self.matching(collection, query)? {
            let key = doc
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            *groups.entry(key).or_insert(0) += 1;
        }
        Ok(groups)
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        let tables = self.read()?;
        Ok(tables.get(&collection).and_then(|rows| {
            rows.iter()
                .find(|r| r.doc.get("id").and_then(Value::as_str) == Some(id))
                .map(|r| r.doc.clone())
        }))
    }

    async fn find_by_key(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<Document>, StoreError> {
        let tables = self.read()?;
        Ok(tables.get(&collection).and_then(|rows| {
            rows.iter()
                .find(|r| r.key.as_deref() == Some(key))
                .map(|r| r.doc.clone())
        }))
    }

    async fn insert(&self, collection: Collection, doc: Document) -> Result<Document, StoreError> {
        let mut tables = self.write()?;
        match apply_insert(&mut tables, collection, None, doc)? {
            InsertOutcome::Inserted(doc) | InsertOutcome::Exists(doc) => Ok(doc),
        }
    }

    async fn insert_unique(
        &self,
        collection: Collection,
        key: &str,
        doc: Document,
    ) -> Result<InsertOutcome, StoreError> {
        let mut tables = self.write()?;
        apply_insert(&mut tables, collection, Some(key), doc)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        guard: Option<&Guard>,
        patch: Document,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut tables = self.write()?;
        Ok(apply_update(&mut tables, collection, id, guard, &patch))
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        let Some(rows) = tables.get_mut(&collection) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|r| r.doc.get("id").and_then(Value::as_str) != Some(id));
        Ok(rows.len() != before)
    }

    async fn commit(&self, ops: Vec<WriteOp>) -> Result<Vec<Document>, StoreError> {
        let mut tables = self.write()?;
        let mut undo = Vec::with_capacity(ops.len());

        match apply_ops(&mut tables, ops, &mut undo) {
            Ok(written) => Ok(written),
            Err(e) => {
                rollback(&mut tables, undo);
                Err(e)
            }
        }
    }
}

/// What to restore if a later op in the same batch fails.
enum Undo {
    /// Inserts always append, so undoing one pops the last row.
    Insert(Collection),
    Update(Collection, usize, Document),
}

fn apply_ops(
    tables: &mut Tables,
    ops: Vec<WriteOp>,
    undo: &mut Vec<Undo>,
) -> Result<Vec<Document>, StoreError> {
    let mut written = Vec::with_capacity(ops.len());

    for op in ops {
        match op {
            WriteOp::Insert { collection, doc } => {
                match apply_insert(tables, collection, None, doc)? {
                    InsertOutcome::Inserted(doc) => {
                        undo.push(Undo::Insert(collection));
                        written.push(doc)
                    }
                    InsertOutcome::Exists(doc) => written.push(doc),
                }
            }
            WriteOp::Update {
                collection,
                id,
                guard,
                patch,
            } => {
                let previous = tables.get(&collection).and_then(|rows| {
                    rows.iter()
                        .position(|r| r.doc.get("id").and_then(Value::as_str) == Some(id.as_str()))
                        .map(|i| (i, rows[i].doc.clone()))
                });
                match apply_update(tables, collection, &id, guard.as_ref(), &patch) {
                    UpdateOutcome::Updated(doc) => {
                        if let Some((index, before)) = previous {
                            undo.push(Undo::Update(collection, index, before));
                        }
                        written.push(doc)
                    }
                    UpdateOutcome::NotFound => return Err(StoreError::NotFound { collection, id }),
                    UpdateOutcome::GuardFailed => {
                        return Err(StoreError::GuardFailed { collection, id });
                    }
                }
            }
        }
    }

    Ok(written)
}

fn rollback(tables: &mut Tables, undo: Vec<Undo>) {
    for step in undo.into_iter().rev() {
        match step {
            Undo::Insert(collection) => {
                if let Some(rows) = tables.get_mut(&collection) {
                    rows.pop();
                }
            }
            Undo::Update(collection, index, before) => {
                if let Some(row) = tables.get_mut(&collection).and_then(|rows| rows.get_mut(index)) {
                    row.doc = before;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[actix_web::test]
    async fn insert_get_update_delete() {
        let store = MemoryStore::new();
        store
            .insert(Collection::Jobs, doc(json!({ "id": "j1", "title": "Nurse" })))
            .await
            .unwrap();

        let fetched = store.get(Collection::Jobs, "j1").await.unwrap().unwrap();
        assert_eq!(fetched["title"], "Nurse");

        let outcome = store
            .update(Collection::Jobs, "j1", None, doc(json!({ "vacancy": 3 })))
            .await
            .unwrap();
        let UpdateOutcome::Updated(updated) = outcome else {
            panic!("expected update");
        };
        assert_eq!(updated["title"], "Nurse");
        assert_eq!(updated["vacancy"], 3);

        assert!(store.delete(Collection::Jobs, "j1").await.unwrap());
        assert!(!store.delete(Collection::Jobs, "j1").await.unwrap());
        assert!(store.get(Collection::Jobs, "j1").await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn duplicate_ids_are_rejected() {
        let store = MemoryStore::new();
        store
            .insert(Collection::Jobs, doc(json!({ "id": "j1" })))
            .await
            .unwrap();
        let err = store
            .insert(Collection::Jobs, doc(json!({ "id": "j1" })))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[actix_web::test]
    async fn insert_unique_keeps_first_document() {
        let store = MemoryStore::new();
        let first = store
            .insert_unique(
                Collection::VendorConnections,
                "v@x.com|u@y.com",
                doc(json!({ "id": "c1", "notes": "first" })),
            )
            .await
            .unwrap();
        assert!(matches!(first, InsertOutcome::Inserted(_)));

        let second = store
            .insert_unique(
                Collection::VendorConnections,
                "v@x.com|u@y.com",
                doc(json!({ "id": "c2", "notes": "second" })),
            )
            .await
            .unwrap();
        let InsertOutcome::Exists(existing) = second else {
            panic!("expected existing connection");
        };
        assert_eq!(existing["id"], "c1");
        assert_eq!(
            store
                .count(Collection::VendorConnections, &Query::new())
                .await
                .unwrap(),
            1
        );
    }

    #[actix_web::test]
    async fn guarded_update_reports_lost_race() {
        let store = MemoryStore::new();
        store
            .insert(
                Collection::LeaveRequests,
                doc(json!({ "id": "L1", "status": "approved" })),
            )
            .await
            .unwrap();

        let outcome = store
            .update(
                Collection::LeaveRequests,
                "L1",
                Some(&Guard::equals("status", "pending")),
                doc(json!({ "status": "rejected" })),
            )
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::GuardFailed);

        let missing = store
            .update(Collection::LeaveRequests, "nope", None, Document::new())
            .await
            .unwrap();
        assert_eq!(missing, UpdateOutcome::NotFound);
    }

    #[actix_web::test]
    async fn failed_commit_writes_nothing() {
        let store = MemoryStore::new();
        store
            .insert(
                Collection::Applications,
                doc(json!({ "id": "a1", "status": "rejected" })),
            )
            .await
            .unwrap();

        let err = store
            .commit(vec![
                WriteOp::Insert {
                    collection: Collection::Interviews,
                    doc: doc(json!({ "id": "i1" })),
                },
                WriteOp::Update {
                    collection: Collection::Applications,
                    id: "a1".into(),
                    guard: Some(Guard::equals("status", "shortlisted")),
                    patch: doc(json!({ "status": "interview-scheduled" })),
                },
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::GuardFailed { .. }));
        assert!(store.get(Collection::Interviews, "i1").await.unwrap().is_none());
        let app = store.get(Collection::Applications, "a1").await.unwrap().unwrap();
        assert_eq!(app["status"], "rejected");
    }

    #[actix_web::test]
    async fn failed_commit_restores_earlier_updates() {
        let store = MemoryStore::new();
        for id in ["i1", "i2"] {
            store
                .insert(Collection::Interviews, doc(json!({ "id": id, "status": "scheduled" })))
                .await
                .unwrap();
        }

        let err = store
            .commit(vec![
                WriteOp::Update {
                    collection: Collection::Interviews,
                    id: "i2".into(),
                    guard: None,
                    patch: doc(json!({ "status": "cancelled" })),
                },
                WriteOp::Insert {
                    collection: Collection::Interviews,
                    doc: doc(json!({ "id": "i3" })),
                },
                WriteOp::Insert {
                    collection: Collection::Interviews,
                    doc: doc(json!({ "id": "i1" })),
                },
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Duplicate { .. }));
        let i2 = store.get(Collection::Interviews, "i2").await.unwrap().unwrap();
        assert_eq!(i2["status"], "scheduled");
        assert!(store.get(Collection::Interviews, "i3").await.unwrap().is_none());
        assert_eq!(store.count(Collection::Interviews, &Query::new()).await.unwrap(), 2);
    }

    #[actix_web::test]
    async fn group_count_buckets_missing_values_under_empty_key() {
        let store = MemoryStore::new();
        for (id, status) in [("1", json!("pending")), ("2", json!("pending")), ("3", Value::Null)] {
            let mut d = doc(json!({ "id": id }));
            if !status.is_null() {
                d.insert("status".into(), status);
            }
            store.insert(Collection::LoanRequests, d).await.unwrap();
        }

        let groups = store
            .group_count(Collection::LoanRequests, &Query::new(), "status")
            .await
            .unwrap();
        assert_eq!(groups.get("pending"), Some(&2));
        assert_eq!(groups.get(""), Some(&1));
    }
}
