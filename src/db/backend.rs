//! The collaborator that owns all durable state.
//!
//! Object safe so request handlers can hold an `Arc<dyn Backend>`; every method
//! returns a boxed future.

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::query::{Filter, Query, Table};
use crate::error::{DeskflowError, DeskflowResult};

pub type BackendFuture<'a, T> = BoxFuture<'a, DeskflowResult<T>>;

pub trait Backend: Send + Sync {
    /// Rows matching `query`, projected to its columns.
    fn fetch<'a>(&'a self, query: &'a Query) -> BackendFuture<'a, Vec<Value>>;

    /// Exact number of rows matching `query`. Ordering and limit are ignored.
    fn count<'a>(&'a self, query: &'a Query) -> BackendFuture<'a, u64>;

    /// Insert one row and return the stored representation.
    fn insert<'a>(&'a self, table: Table, row: Value) -> BackendFuture<'a, Vec<Value>>;

    /// Apply `patch` to every matching row and return the updated rows.
    fn update<'a>(&'a self, table: Table, filters: &'a [Filter], patch: Value) -> BackendFuture<'a, Vec<Value>>;

    /// Delete every matching row and return what was deleted.
    fn delete<'a>(&'a self, table: Table, filters: &'a [Filter]) -> BackendFuture<'a, Vec<Value>>;

    /// Id of the user the backend authorizes requests as.
    fn current_user_id(&self) -> BackendFuture<'_, String>;

    /// Public URL for an object in the asset bucket.
    fn public_url(&self, path: &str) -> String;

    fn upload_object<'a>(&'a self, path: &'a str, bytes: Vec<u8>, content_type: &'a str) -> BackendFuture<'a, ()>;

    fn remove_objects<'a>(&'a self, paths: &'a [String]) -> BackendFuture<'a, ()>;
}

impl<'b> dyn Backend + 'b {
    /// `fetch` decoded into typed rows.
    pub async fn fetch_as<T: DeserializeOwned>(&self, query: &Query) -> DeskflowResult<Vec<T>> {
        let rows = self.fetch(query).await?;
        decode_rows(rows)
    }

    /// First matching row, if any.
    pub async fn fetch_first<T: DeserializeOwned>(&self, query: &Query) -> DeskflowResult<Option<T>> {
        let rows = self.fetch(query).await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    /// Like `fetch_first`, but a missing row is `NotFound` with `what` in the message.
    pub async fn fetch_one<T: DeserializeOwned>(&self, query: &Query, what: &str) -> DeskflowResult<T> {
        self.fetch_first(query)
            .await?
            .ok_or_else(|| DeskflowError::NotFound(what.to_string()))
    }

    /// Ids of the matching rows, in backend order.
    pub async fn fetch_ids(&self, query: &Query) -> DeskflowResult<Vec<String>> {
        let rows = self.fetch(query).await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    pub async fn insert_as<T: DeserializeOwned>(&self, table: Table, row: Value) -> DeskflowResult<T> {
        let rows = self.insert(table, row).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| DeskflowError::Backend(format!("insert into {} returned no row", table.as_str())))
            .and_then(|r| Ok(serde_json::from_value(r)?))
    }

    pub async fn update_as<T: DeserializeOwned>(
        &self,
        table: Table,
        filters: &[Filter],
        patch: Value,
    ) -> DeskflowResult<Vec<T>> {
        let rows = self.update(table, filters, patch).await?;
        decode_rows(rows)
    }
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> DeskflowResult<Vec<T>> {
    rows.into_iter()
        .map(|r| serde_json::from_value(r).map_err(DeskflowError::from))
        .collect()
}
