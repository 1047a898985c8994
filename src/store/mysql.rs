use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{MySqlConnection, MySqlPool};

use super::{
    Collection, Condition, Document, Guard, InsertOutcome, Order, Query, RecordStore, StoreError,
    UpdateOutcome, WriteOp, document_id,
};

/// All collections share one `documents` table; see
/// `migrations/0001_documents.sql`.
pub struct MySqlStore {
    pool: MySqlPool,
}

// Helper enum for typed SQLx binding
#[derive(Debug, Clone)]
enum FilterValue {
    Str(String),
    U64(u64),
}

#[derive(Debug, Default)]
struct SqlFilter {
    sql: String,
    args: Vec<FilterValue>,
}

impl SqlFilter {
    fn push(&mut self, sql: &str, args: impl IntoIterator<Item = FilterValue>) {
        self.sql.push_str(sql);
        self.args.extend(args);
    }
}

fn path(field: &str) -> FilterValue {
    FilterValue::Str(format!("$.{field}"))
}

fn json_text(value: &serde_json::Value) -> FilterValue {
    FilterValue::Str(value.to_string())
}

fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn build_where(collection: Collection, query: &Query) -> SqlFilter {
    let mut filter = SqlFilter::default();
    filter.push(
        " WHERE collection = ?",
        [FilterValue::Str(collection.to_string())],
    );

    for condition in &query.conditions {
        match condition {
            Condition::Eq { field, value } => filter.push(
                " AND JSON_EXTRACT(body, ?) = CAST(? AS JSON)",
                [path(field), json_text(value)],
            ),
            Condition::Contains { fields, needle } => {
                let like = format!("%{}%", escape_like(needle));
                let clauses = vec!["LOWER(JSON_UNQUOTE(JSON_EXTRACT(body, ?))) LIKE ?"; fields.len()];
                filter.push(
                    &format!(" AND ({})", clauses.join(" OR ")),
                    fields
                        .iter()
                        .flat_map(|f| [path(f), FilterValue::Str(like.clone())]),
                );
            }
            Condition::Range { field, from, to } => {
                if let Some(from) = from {
                    filter.push(
                        " AND JSON_UNQUOTE(JSON_EXTRACT(body, ?)) >= ?",
                        [path(field), FilterValue::Str(from.clone())],
                    );
                }
                if let Some(to) = to {
                    filter.push(
                        " AND LEFT(JSON_UNQUOTE(JSON_EXTRACT(body, ?)), ?) <= ?",
                        [
                            path(field),
                            FilterValue::U64(to.chars().count() as u64),
                            FilterValue::Str(to.clone()),
                        ],
                    );
                }
            }
            Condition::In { field, values } => {
                if values.is_empty() {
                    filter.push(" AND 1 = 0", []);
                } else {
                    let clauses = vec!["JSON_EXTRACT(body, ?) = CAST(? AS JSON)"; values.len()];
                    filter.push(
                        &format!(" AND ({})", clauses.join(" OR ")),
                        values.iter().flat_map(|v| [path(field), json_text(v)]),
                    );
                }
            }
        }
    }

    filter
}

fn guard_sql(guard: &Guard) -> (&'static str, Vec<FilterValue>) {
    match guard {
        Guard::Equals(field, value) => (
            " AND JSON_EXTRACT(body, ?) = CAST(? AS JSON)",
            vec![path(field), json_text(value)],
        ),
        // absent and explicit JSON null both count as missing
        Guard::Missing(field) => (
            " AND COALESCE(JSON_TYPE(JSON_EXTRACT(body, ?)), 'NULL') = 'NULL'",
            vec![path(field)],
        ),
    }
}

fn is_duplicate(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23000"))
}

macro_rules! bind_all {
    ($query:expr, $args:expr) => {{
        let mut q = $query;
        for arg in $args {
            q = match arg {
                FilterValue::Str(s) => q.bind(s),
                FilterValue::U64(v) => q.bind(v),
            };
        }
        q
    }};
}

async fn fetch_one_doc(
    conn: &mut MySqlConnection,
    collection: Collection,
    column: &str,
    value: &str,
) -> Result<Option<Document>, StoreError> {
    let sql = format!("SELECT body FROM documents WHERE collection = ? AND {column} = ?");
    let row = sqlx::query_as::<_, (Json<Document>,)>(&sql)
        .bind(collection.to_string())
        .bind(value)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(|(Json(doc),)| doc))
}

async fn insert_row(
    conn: &mut MySqlConnection,
    collection: Collection,
    key: Option<&str>,
    doc: &Document,
) -> Result<(), sqlx::Error> {
    let id = doc.get("id").and_then(|v| v.as_str()).unwrap_or_default();
    sqlx::query(
        r#"
        INSERT INTO documents (collection, id, unique_key, body)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(collection.to_string())
    .bind(id)
    .bind(key)
    .bind(Json(doc))
    .execute(conn)
    .await?;
    Ok(())
}

async fn update_row(
    conn: &mut MySqlConnection,
    collection: Collection,
    id: &str,
    guard: Option<&Guard>,
    patch: &Document,
) -> Result<UpdateOutcome, StoreError> {
    let mut sql = String::from(
        "UPDATE documents SET body = JSON_MERGE_PATCH(body, ?) WHERE collection = ? AND id = ?",
    );
    let mut guard_args = Vec::new();
    if let Some(guard) = guard {
        let (clause, args) = guard_sql(guard);
        sql.push_str(clause);
        guard_args = args;
    }

    let q = sqlx::query(&sql)
        .bind(Json(patch))
        .bind(collection.to_string())
        .bind(id);
    let result = bind_all!(q, guard_args).execute(&mut *conn).await?;

    if result.rows_affected() == 0 {
        return match fetch_one_doc(conn, collection, "id", id).await? {
            Some(_) => Ok(UpdateOutcome::GuardFailed),
            None => Ok(UpdateOutcome::NotFound),
        };
    }

    match fetch_one_doc(conn, collection, "id", id).await? {
        Some(doc) => Ok(UpdateOutcome::Updated(doc)),
        None => Ok(UpdateOutcome::NotFound),
    }
}

impl MySqlStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = MySqlPool::connect(database_url).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordStore for MySqlStore {
    fn backend(&self) -> &'static str {
        "mysql"
    }

    async fn find(&self, collection: Collection, query: &Query) -> Result<Vec<Document>, StoreError> {
        let filter = build_where(collection, query);
        let mut args = filter.args.clone();

        let mut sql = format!("SELECT body FROM documents{}", filter.sql);
        match &query.sort {
            Some((field, order)) => {
                let dir = match order {
                    Order::Asc => "ASC",
                    Order::Desc => "DESC",
                };
                sql.push_str(&format!(
                    " ORDER BY LOWER(JSON_UNQUOTE(JSON_EXTRACT(body, ?))) {dir}, seq ASC"
                ));
                args.push(path(field));
            }
            None => sql.push_str(" ORDER BY seq ASC"),
        }
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ? OFFSET ?");
            args.push(FilterValue::U64(limit));
            args.push(FilterValue::U64(query.offset));
        }

        tracing::debug!(sql = %sql, args = ?args, "Fetching documents");

        let rows = bind_all!(sqlx::query_as::<_, (Json<Document>,)>(&sql), args)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(Json(doc),)| doc).collect())
    }

    async fn count(&self, collection: Collection, query: &Query) -> Result<u64, StoreError> {
        let filter = build_where(collection, query);
        let sql = format!("SELECT COUNT(*) FROM documents{}", filter.sql);

        let total: i64 = bind_all!(sqlx::query_scalar::<_, i64>(&sql), filter.args)
            .fetch_one(&self.pool)
            .await?;
        Ok(total.max(0) as u64)
    }

    async fn group_count(
        &self,
        collection: Collection,
        query: &Query,
        field: &str,
    ) -> Result<BTreeMap<String, u64>, StoreError> {
        let filter = build_where(collection, query);
        let sql = format!(
            "SELECT COALESCE(JSON_UNQUOTE(JSON_EXTRACT(body, ?)), '') AS grp, COUNT(*) \
             FROM documents{} GROUP BY grp",
            filter.sql
        );

        let mut args = vec![path(field)];
        args.extend(filter.args);

        let rows = bind_all!(sqlx::query_as::<_, (String, i64)>(&sql), args)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(k, n)| (k, n.max(0) as u64))
            .collect())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_one_doc(&mut conn, collection, "id", id).await
    }

    async fn find_by_key(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<Document>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_one_doc(&mut conn, collection, "unique_key", key).await
    }

    async fn insert(&self, collection: Collection, doc: Document) -> Result<Document, StoreError> {
        let id = document_id(&doc)?.to_string();
        let mut conn = self.pool.acquire().await?;
        match insert_row(&mut conn, collection, None, &doc).await {
            Ok(()) => Ok(doc),
            Err(e) if is_duplicate(&e) => Err(StoreError::Duplicate { collection, key: id }),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_unique(
        &self,
        collection: Collection,
        key: &str,
        doc: Document,
    ) -> Result<InsertOutcome, StoreError> {
        document_id(&doc)?;
        let mut conn = self.pool.acquire().await?;
        match insert_row(&mut conn, collection, Some(key), &doc).await {
            Ok(()) => Ok(InsertOutcome::Inserted(doc)),
            Err(e) if is_duplicate(&e) => {
                match fetch_one_doc(&mut conn, collection, "unique_key", key).await? {
                    Some(existing) => Ok(InsertOutcome::Exists(existing)),
                    None => Err(StoreError::Duplicate {
                        collection,
                        key: key.to_string(),
                    }),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        guard: Option<&Guard>,
        patch: Document,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut conn = self.pool.acquire().await?;
        update_row(&mut conn, collection, id, guard, &patch).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection.to_string())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(&self, ops: Vec<WriteOp>) -> Result<Vec<Document>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut written = Vec::with_capacity(ops.len());

        for op in ops {
            match op {
                WriteOp::Insert { collection, doc } => {
                    let id = document_id(&doc)?.to_string();
                    if let Err(e) = insert_row(&mut tx, collection, None, &doc).await {
                        tx.rollback().await?;
                        return Err(if is_duplicate(&e) {
                            StoreError::Duplicate { collection, key: id }
                        } else {
                            e.into()
                        });
                    }
                    written.push(doc);
                }
                WriteOp::Update {
                    collection,
                    id,
                    guard,
                    patch,
                } => match update_row(&mut tx, collection, &id, guard.as_ref(), &patch).await? {
                    UpdateOutcome::Updated(doc) => written.push(doc),
                    UpdateOutcome::NotFound => {
                        tx.rollback().await?;
                        return Err(StoreError::NotFound { collection, id });
                    }
                    UpdateOutcome::GuardFailed => {
                        tx.rollback().await?;
                        return Err(StoreError::GuardFailed { collection, id });
                    }
                },
            }
        }

        tx.commit().await?;
        Ok(written)
    }
}
