use serde::Deserialize;

use crate::app_state::AppState;
use crate::db::{Filter, Note, Query, Table};
use crate::dedup::{merge_by_id, MatchSource, Tagged};
use crate::error::DeskflowResult;
use crate::hierarchy::DEFAULT_MAX_DEPTH;
use crate::index::{default_workspace, workspace_index, WorkspaceIndex};
use crate::rate_limit::Access;
use crate::stats::{workspace_stats, WorkspaceStats};
use crate::traversal::{clamp_depth, find_connected_notes, ConnectedNotes};
use crate::utils::{clamp_limit, require_text, validate_id};

const SEARCH_COLUMNS: &str = "id, title, desktop_id, position_x, position_y, created_at, updated_at";
const DESKTOP_SEARCH_COLUMNS: &str = "id, title, content, position_x, position_y, created_at";
const RECENT_COLUMNS: &str = "id, title, desktop_id, updated_at, created_at";
pub const QUERY_MAX: usize = 500;

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
pub struct SearchNotes {
    /// UUID of the workspace to search
    pub workspace_id: String,
    /// Text to look for in titles and content (max 500 characters)
    pub query: String,
    /// Maximum results, 1 to 100 (default 20)
    #[serde(default)]
    pub limit: Option<i64>,
    /// Include note content in the results
    #[serde(default)]
    pub include_content: bool,
}

impl AppState {
    /// Title matches first, then content matches, each note once.
    pub async fn search_notes(&self, input: SearchNotes) -> DeskflowResult<Vec<Tagged<Note>>> {
        self.guard(Access::Read)?;
        validate_id("workspace_id", &input.workspace_id)?;
        let needle = require_text("query", &input.query, QUERY_MAX)?;
        let limit = clamp_limit(input.limit, 20, 100);

        let desktop_ids = self.workspace_desktop_ids(&input.workspace_id).await?;
        if desktop_ids.is_empty() {
            return Ok(Vec::new());
        }

        let columns = if input.include_content {
            format!("{}, content", SEARCH_COLUMNS)
        } else {
            SEARCH_COLUMNS.to_string()
        };
        let scoped = |column: &'static str| {
            Query::new(Table::Notes, &columns)
                .in_list("desktop_id", &desktop_ids)
                .ilike(column, &needle)
                .limit(limit)
        };
        let (title_q, content_q) = (scoped("title"), scoped("content"));
        let db = self.db();
        let (by_title, by_content) = futures::try_join!(
            db.fetch_as::<Note>(&title_q),
            db.fetch_as::<Note>(&content_q),
        )?;

        let mut merged = merge_by_id([(MatchSource::Title, by_title), (MatchSource::Content, by_content)]);
        merged.truncate(limit);
        tracing::debug!(workspace_id = %input.workspace_id, hits = merged.len(), "search");
        Ok(merged)
    }

    pub async fn search_notes_in_desktop(
        &self,
        desktop_id: &str,
        query: &str,
        limit: Option<i64>,
    ) -> DeskflowResult<Vec<Note>> {
        self.guard(Access::Read)?;
        validate_id("desktop_id", desktop_id)?;
        let needle = require_text("query", query, QUERY_MAX)?;
        let query = Query::new(Table::Notes, DESKTOP_SEARCH_COLUMNS)
            .eq("desktop_id", desktop_id)
            .any_of(vec![
                Filter::ILike("title", needle.clone()),
                Filter::ILike("content", needle),
            ])
            .limit(clamp_limit(limit, 20, 100));
        self.db().fetch_as(&query).await
    }

    /// Most recently edited notes of a workspace, or of the default one.
    pub async fn get_recent_notes(&self, workspace_id: Option<&str>, limit: Option<i64>) -> DeskflowResult<Vec<Note>> {
        self.guard(Access::Read)?;
        let workspace_id = match workspace_id {
            Some(id) => {
                validate_id("workspace_id", id)?;
                id.to_string()
            }
            None => default_workspace(self.db(), "id").await?.id,
        };

        let desktop_ids = self.workspace_desktop_ids(&workspace_id).await?;
        if desktop_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::new(Table::Notes, RECENT_COLUMNS)
            .in_list("desktop_id", &desktop_ids)
            .order("updated_at", true)
            .limit(clamp_limit(limit, 10, 50));
        self.db().fetch_as(&query).await
    }

    pub async fn get_workspace_stats(&self, workspace_id: &str) -> DeskflowResult<WorkspaceStats> {
        self.guard(Access::Read)?;
        validate_id("workspace_id", workspace_id)?;
        workspace_stats(self.db(), workspace_id).await
    }

    pub async fn find_connected_notes(&self, note_id: &str, depth: Option<i64>) -> DeskflowResult<ConnectedNotes> {
        self.guard(Access::Read)?;
        validate_id("note_id", note_id)?;
        find_connected_notes(self.db(), note_id, clamp_depth(depth)).await
    }

    /// Whole workspace in one response; the default workspace when no id is given.
    pub async fn get_workspace_index(
        &self,
        workspace_id: Option<&str>,
        include_content: bool,
    ) -> DeskflowResult<WorkspaceIndex> {
        self.guard(Access::Read)?;
        if let Some(id) = workspace_id {
            validate_id("workspace_id", id)?;
        }
        workspace_index(self.db(), workspace_id, include_content, DEFAULT_MAX_DEPTH).await
    }
}
