//! In-memory backend for tests.
//!
//! Evaluates the query model over JSON rows and records every call so tests can
//! assert which fetches happened.

use std::collections::HashMap;
use std::sync::Mutex;

use futures::FutureExt;
use serde_json::{Map, Value};

use super::backend::{Backend, BackendFuture};
use super::query::{Filter, Query, Table};
use crate::error::DeskflowError;

pub const TEST_USER_ID: &str = "00000000-0000-4000-8000-000000000001";

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: &'static str,
    pub table: Table,
    pub filters: Vec<Filter>,
}

#[derive(Default)]
pub struct MemoryBackend {
    rows: Mutex<HashMap<Table, Vec<Value>>>,
    calls: Mutex<Vec<Call>>,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_storage: bool,
    reject_session: bool,
    max_rows: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage calls fail, row calls still work.
    pub fn with_failing_storage() -> Self {
        Self { fail_storage: true, ..Self::default() }
    }

    /// Identity lookups fail as if the refresh token was revoked.
    pub fn with_rejected_session() -> Self {
        Self { reject_session: true, ..Self::default() }
    }

    /// Plain fetches return at most `max_rows` rows, like a PostgREST `max-rows` cap.
    /// Counts are not capped.
    pub fn with_max_rows(max_rows: usize) -> Self {
        Self { max_rows: Some(max_rows), ..Self::default() }
    }

    pub fn seed(&self, table: Table, rows: Vec<Value>) {
        self.rows.lock().unwrap().entry(table).or_default().extend(rows);
    }

    pub fn rows(&self, table: Table) -> Vec<Value> {
        self.rows.lock().unwrap().get(&table).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, table: Table) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.table == table).collect()
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    fn record(&self, op: &'static str, table: Table, filters: &[Filter]) {
        self.calls.lock().unwrap().push(Call { op, table, filters: filters.to_vec() });
    }

    fn matching(&self, table: Table, filters: &[Filter]) -> Vec<Value> {
        self.rows(table)
            .into_iter()
            .filter(|row| filters.iter().all(|f| matches(row, f)))
            .collect()
    }

    fn run_query(&self, query: &Query) -> Vec<Value> {
        let mut rows = self.matching(query.table, &query.filters);
        for order in query.order.iter().rev() {
            rows.sort_by(|a, b| {
                let ord = compare(a.get(order.column), b.get(order.column));
                if order.descending { ord.reverse() } else { ord }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        if let Some(cap) = self.max_rows {
            rows.truncate(cap);
        }
        let columns = query.column_names();
        if columns.is_empty() {
            return rows;
        }
        rows.into_iter()
            .map(|row| {
                let mut out = Map::new();
                for c in &columns {
                    if let Some(v) = row.get(*c) {
                        out.insert(c.to_string(), v.clone());
                    }
                }
                Value::Object(out)
            })
            .collect()
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn matches(row: &Value, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(col, expected) => row.get(*col) == Some(expected),
        Filter::In(col, values) => text(row.get(*col)).is_some_and(|v| values.contains(&v)),
        Filter::ILike(col, needle) => text(row.get(*col))
            .is_some_and(|v| v.to_lowercase().contains(&needle.to_lowercase())),
        Filter::IsNull(col) => row.get(*col).map_or(true, Value::is_null),
        Filter::AnyOf(inner) => inner.iter().any(|f| matches(row, f)),
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    match (a.and_then(Value::as_f64), b.and_then(Value::as_f64)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => text(a).cmp(&text(b)),
    }
}

impl Backend for MemoryBackend {
    fn fetch<'a>(&'a self, query: &'a Query) -> BackendFuture<'a, Vec<Value>> {
        self.record("fetch", query.table, &query.filters);
        let rows = self.run_query(query);
        async move { Ok(rows) }.boxed()
    }

    fn count<'a>(&'a self, query: &'a Query) -> BackendFuture<'a, u64> {
        self.record("count", query.table, &query.filters);
        let n = self.matching(query.table, &query.filters).len() as u64;
        async move { Ok(n) }.boxed()
    }

    fn insert<'a>(&'a self, table: Table, mut row: Value) -> BackendFuture<'a, Vec<Value>> {
        self.record("insert", table, &[]);
        if let Some(obj) = row.as_object_mut() {
            obj.entry("id").or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
            obj.entry("created_at").or_insert_with(|| Value::String(chrono::Utc::now().to_rfc3339()));
        }
        self.seed(table, vec![row.clone()]);
        async move { Ok(vec![row]) }.boxed()
    }

    fn update<'a>(&'a self, table: Table, filters: &'a [Filter], patch: Value) -> BackendFuture<'a, Vec<Value>> {
        self.record("update", table, filters);
        let mut updated = Vec::new();
        {
            let mut all = self.rows.lock().unwrap();
            for row in all.entry(table).or_default().iter_mut() {
                if !filters.iter().all(|f| matches(row, f)) {
                    continue;
                }
                if let (Some(obj), Some(changes)) = (row.as_object_mut(), patch.as_object()) {
                    for (k, v) in changes {
                        obj.insert(k.clone(), v.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        async move { Ok(updated) }.boxed()
    }

    fn delete<'a>(&'a self, table: Table, filters: &'a [Filter]) -> BackendFuture<'a, Vec<Value>> {
        self.record("delete", table, filters);
        let mut removed = Vec::new();
        {
            let mut all = self.rows.lock().unwrap();
            let rows = all.entry(table).or_default();
            rows.retain(|row| {
                if filters.iter().all(|f| matches(row, f)) {
                    removed.push(row.clone());
                    false
                } else {
                    true
                }
            });
        }
        async move { Ok(removed) }.boxed()
    }

    fn current_user_id(&self) -> BackendFuture<'_, String> {
        let result = if self.reject_session {
            Err(DeskflowError::Authentication("refresh token revoked".to_string()))
        } else {
            Ok(TEST_USER_ID.to_string())
        };
        async move { result }.boxed()
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://assets/{}", path)
    }

    fn upload_object<'a>(&'a self, path: &'a str, bytes: Vec<u8>, _content_type: &'a str) -> BackendFuture<'a, ()> {
        let result = if self.fail_storage {
            Err(DeskflowError::Backend("storage unavailable".to_string()))
        } else {
            self.objects.lock().unwrap().insert(path.to_string(), bytes);
            Ok(())
        };
        async move { result }.boxed()
    }

    fn remove_objects<'a>(&'a self, paths: &'a [String]) -> BackendFuture<'a, ()> {
        let result = if self.fail_storage {
            Err(DeskflowError::Backend("storage unavailable".to_string()))
        } else {
            let mut objects = self.objects.lock().unwrap();
            for p in paths {
                objects.remove(p);
            }
            Ok(())
        };
        async move { result }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_filters_order_and_projection() {
        let mem = MemoryBackend::new();
        mem.seed(
            Table::Notes,
            vec![
                json!({"id": "1", "desktop_id": "d1", "title": "Alpha", "z_index": 2}),
                json!({"id": "2", "desktop_id": "d1", "title": "beta plan", "z_index": 5}),
                json!({"id": "3", "desktop_id": "d2", "title": "Plan B", "z_index": 1}),
            ],
        );
        let q = Query::new(Table::Notes, "id, title")
            .in_list("desktop_id", &["d1".to_string(), "d2".to_string()])
            .ilike("title", "PLAN")
            .order("z_index", true);
        let rows = mem.fetch(&q).await.unwrap();
        assert_eq!(rows, vec![json!({"id": "2", "title": "beta plan"}), json!({"id": "3", "title": "Plan B"})]);
        assert_eq!(mem.calls_to(Table::Notes).len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_report_rows() {
        let mem = MemoryBackend::new();
        mem.seed(Table::Folders, vec![json!({"id": "f", "name": "old"})]);
        let filters = vec![Filter::eq("id", "f")];
        let updated = mem.update(Table::Folders, &filters, json!({"name": "new"})).await.unwrap();
        assert_eq!(updated[0]["name"], "new");
        assert_eq!(mem.delete(Table::Folders, &filters).await.unwrap().len(), 1);
        assert!(mem.delete(Table::Folders, &filters).await.unwrap().is_empty());
    }
}
