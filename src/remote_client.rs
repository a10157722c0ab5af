//! PostgREST/Supabase implementation of `Backend`.
//!
//! Every request carries the anon key as `apikey` and the session's access token
//! as the bearer, so row-level security applies as the signed-in user.

use std::sync::Arc;

use futures::FutureExt;
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

use crate::auth::Session;
use crate::db::{Backend, BackendFuture, Filter, Query, Table};
use crate::error::{DeskflowError, DeskflowResult};
use crate::settings::Settings;
use crate::utils::safe_truncate;

pub const ASSET_BUCKET: &str = "assets";

pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: Arc<Session>,
}

impl RemoteClient {
    pub fn new(settings: &Settings, session: Arc<Session>) -> DeskflowResult<Self> {
        let http = reqwest::Client::builder().timeout(settings.http_timeout()).build()?;
        Ok(Self {
            http,
            base_url: settings.supabase_url.trim_end_matches('/').to_string(),
            anon_key: settings.supabase_anon_key.clone(),
            session,
        })
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    async fn request(&self, method: Method, url: &str) -> DeskflowResult<RequestBuilder> {
        let user = self.session.user().await?;
        Ok(self
            .http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(user.access_token))
    }

    async fn rows(&self, resp: Response) -> DeskflowResult<Vec<Value>> {
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn fetch_rows(&self, query: &Query) -> DeskflowResult<Vec<Value>> {
        let params = query.to_params();
        debug!(table = query.table.as_str(), ?params, "fetch");
        let resp = self
            .request(Method::GET, &self.table_url(query.table))
            .await?
            .query(&params)
            .send()
            .await?;
        self.rows(resp).await
    }

    async fn count_rows(&self, query: &Query) -> DeskflowResult<u64> {
        let mut params = vec![("select".to_string(), "id".to_string())];
        params.extend(query.filters.iter().map(Filter::to_param));
        debug!(table = query.table.as_str(), ?params, "count");
        let resp = self
            .request(Method::HEAD, &self.table_url(query.table))
            .await?
            .header("Prefer", "count=exact")
            .query(&params)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let range = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        parse_content_range(range)
            .ok_or_else(|| DeskflowError::Backend(format!("missing count in Content-Range '{}'", range)))
    }

    async fn write_rows(
        &self,
        method: Method,
        table: Table,
        filters: &[Filter],
        body: Option<Value>,
    ) -> DeskflowResult<Vec<Value>> {
        let params: Vec<(String, String)> = filters.iter().map(Filter::to_param).collect();
        debug!(table = table.as_str(), %method, ?params, "write");
        let mut req = self
            .request(method, &self.table_url(table))
            .await?
            .header("Prefer", "return=representation")
            .query(&params);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await?;
        self.rows(resp).await
    }

    async fn user_id(&self) -> DeskflowResult<String> {
        Ok(self.session.user().await?.user_id)
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> DeskflowResult<()> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, ASSET_BUCKET, encode_object_path(path));
        let resp = self
            .request(Method::POST, &url)
            .await?
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn remove(&self, paths: &[String]) -> DeskflowResult<()> {
        let url = format!("{}/storage/v1/object/{}", self.base_url, ASSET_BUCKET);
        let resp = self
            .request(Method::DELETE, &url)
            .await?
            .json(&serde_json::json!({ "prefixes": paths }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}

impl Backend for RemoteClient {
    fn fetch<'a>(&'a self, query: &'a Query) -> BackendFuture<'a, Vec<Value>> {
        self.fetch_rows(query).boxed()
    }

    fn count<'a>(&'a self, query: &'a Query) -> BackendFuture<'a, u64> {
        self.count_rows(query).boxed()
    }

    fn insert<'a>(&'a self, table: Table, row: Value) -> BackendFuture<'a, Vec<Value>> {
        self.write_rows(Method::POST, table, &[], Some(row)).boxed()
    }

    fn update<'a>(&'a self, table: Table, filters: &'a [Filter], patch: Value) -> BackendFuture<'a, Vec<Value>> {
        self.write_rows(Method::PATCH, table, filters, Some(patch)).boxed()
    }

    fn delete<'a>(&'a self, table: Table, filters: &'a [Filter]) -> BackendFuture<'a, Vec<Value>> {
        self.write_rows(Method::DELETE, table, filters, None).boxed()
    }

    fn current_user_id(&self) -> BackendFuture<'_, String> {
        self.user_id().boxed()
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            ASSET_BUCKET,
            encode_object_path(path)
        )
    }

    fn upload_object<'a>(&'a self, path: &'a str, bytes: Vec<u8>, content_type: &'a str) -> BackendFuture<'a, ()> {
        self.upload(path, bytes, content_type).boxed()
    }

    fn remove_objects<'a>(&'a self, paths: &'a [String]) -> BackendFuture<'a, ()> {
        self.remove(paths).boxed()
    }
}

async fn check_status(resp: Response) -> DeskflowResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let msg = format!("{}: {}", status, safe_truncate(&body, 300));
    Err(match status.as_u16() {
        401 | 403 => DeskflowError::Authentication(msg),
        404 => DeskflowError::NotFound(msg),
        400 | 422 => DeskflowError::Validation(msg),
        _ => DeskflowError::Backend(msg),
    })
}

/// Total from a PostgREST `Content-Range` header: `0-9/42` or `*/0`.
pub fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit_once('/').and_then(|(_, total)| total.trim().parse().ok())
}

/// Percent-encode each segment of an object path, keeping the slashes.
fn encode_object_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("0-9/42"), Some(42));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-9/*"), None);
        assert_eq!(parse_content_range(""), None);
    }

    #[test]
    fn test_encode_object_path_keeps_separators() {
        assert_eq!(encode_object_path("u/n/a b.png"), "u/n/a%20b.png");
        assert_eq!(encode_object_path("u/n/x.png"), "u/n/x.png");
    }
}
