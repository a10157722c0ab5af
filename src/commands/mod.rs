//! Operations behind both the MCP tools and the REST endpoints.
//!
//! Each one validates its input, takes a slot from the rate limiter, then talks
//! to the backend. Input structs double as MCP tool parameters.

mod assets;
mod connections;
mod desktops;
mod folders;
mod notes;
mod search;
mod workspaces;

pub use assets::*;
pub use connections::*;
pub use desktops::*;
pub use folders::*;
pub use notes::*;
pub use search::*;
pub use workspaces::*;

use serde::Serialize;

use crate::app_state::AppState;
use crate::db::{Query, Table};
use crate::error::{DeskflowError, DeskflowResult};

/// Default color for new notes and connections.
pub const DEFAULT_COLOR: &str = "#00ff41";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpMessage {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_count: Option<usize>,
}

impl OpMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), deleted_count: None }
    }

    pub fn with_count(message: impl Into<String>, count: usize) -> Self {
        Self { message: message.into(), deleted_count: Some(count) }
    }
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Empty string clears a nullable text column.
fn blank_to_null(value: &str) -> serde_json::Value {
    if value.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::Value::String(value.to_string())
    }
}

impl AppState {
    /// Outcome of a delete that touched `rows` rows.
    fn deleted(&self, what: &str, id: &str, rows: usize) -> DeskflowResult<OpMessage> {
        if rows == 0 && self.settings.strict_deletes {
            return Err(DeskflowError::NotFound(format!("{} {} not found", what, id)));
        }
        tracing::info!(what, id, rows, "deleted");
        Ok(OpMessage::new(format!("{} {} deleted", what, id)))
    }

    /// Ids of every desktop in `workspace_id`.
    async fn workspace_desktop_ids(&self, workspace_id: &str) -> DeskflowResult<Vec<String>> {
        self.db()
            .fetch_ids(&Query::new(Table::Desktops, "id").eq("workspace_id", workspace_id))
            .await
    }

    /// Highest value of `column` among rows where `scope_column == scope_id`, 0 if none.
    async fn max_in_scope(
        &self,
        table: Table,
        column: &'static str,
        scope_column: &'static str,
        scope_id: &str,
    ) -> DeskflowResult<i64> {
        let query = Query::new(table, column)
            .eq(scope_column, scope_id)
            .order(column, true)
            .limit(1);
        let rows = self.db().fetch(&query).await?;
        Ok(rows
            .first()
            .and_then(|r| r.get(column))
            .and_then(|v| v.as_i64())
            .unwrap_or(0))
    }
}
