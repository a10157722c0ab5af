use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::app_state::AppState;
use crate::db::{Connection, Desktop, Filter, Folder, Note, Query, Table};
use crate::error::{not_found, validation, DeskflowResult};
use crate::hierarchy::{build_forest, flatten, LeveledRow, DEFAULT_MAX_DEPTH};
use crate::rate_limit::Access;
use crate::utils::{require_text, validate_id};

use super::{now_iso, OpMessage};

const LIST_COLUMNS: &str = "id, name, parent_id, position_order, created_at, updated_at";
const HIERARCHY_COLUMNS: &str = "id, name, parent_id, position_order, created_at";
const NOTE_COLUMNS: &str =
    "id, title, position_x, position_y, width, height, color, z_index, minimized, created_at, updated_at";
const FOLDER_COLUMNS: &str = "id, name, target_desktop_id, position_x, position_y, icon, color, created_at";
const CONNECTION_COLUMNS: &str = "id, from_note_id, to_note_id, color, created_at";
const NAME_MAX: usize = 100;
const HIERARCHY_DEPTH_CAP: i64 = 100;

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
pub struct CreateDesktop {
    /// UUID of the workspace
    pub workspace_id: String,
    /// Desktop name
    pub name: String,
    /// Parent desktop UUID; omit for a root desktop
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
pub struct UpdateDesktop {
    /// UUID of the desktop
    pub desktop_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// New parent UUID, or the string "null" to make it a root
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub position_order: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentCounts {
    pub notes: usize,
    pub folders: usize,
    pub connections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesktopContents {
    pub desktop: Desktop,
    pub notes: Vec<Note>,
    pub folders: Vec<Folder>,
    pub connections: Vec<Connection>,
    pub counts: ContentCounts,
}

impl AppState {
    pub async fn list_desktops(&self, workspace_id: &str) -> DeskflowResult<Vec<Desktop>> {
        self.guard(Access::Read)?;
        validate_id("workspace_id", workspace_id)?;
        let query = Query::new(Table::Desktops, LIST_COLUMNS)
            .eq("workspace_id", workspace_id)
            .order("position_order", false);
        self.db().fetch_as(&query).await
    }

    pub async fn get_desktop(&self, desktop_id: &str) -> DeskflowResult<Desktop> {
        self.guard(Access::Read)?;
        validate_id("desktop_id", desktop_id)?;
        self.db()
            .fetch_one(
                &Query::new(Table::Desktops, "*").eq("id", desktop_id),
                &format!("Desktop {} not found", desktop_id),
            )
            .await
    }

    /// The first root desktop (no parent) of a workspace.
    pub async fn get_root_desktop(&self, workspace_id: &str) -> DeskflowResult<Desktop> {
        self.guard(Access::Read)?;
        validate_id("workspace_id", workspace_id)?;
        let query = Query::new(Table::Desktops, "*")
            .eq("workspace_id", workspace_id)
            .is_null("parent_id")
            .order("position_order", false)
            .limit(1);
        self.db()
            .fetch_one(&query, &format!("Root desktop not found in workspace {}", workspace_id))
            .await
    }

    /// Every reachable desktop of a workspace, pre-order, with its level.
    pub async fn get_desktop_hierarchy(
        &self,
        workspace_id: &str,
        max_depth: Option<i64>,
    ) -> DeskflowResult<Vec<LeveledRow<Desktop>>> {
        self.guard(Access::Read)?;
        validate_id("workspace_id", workspace_id)?;
        let max_depth = max_depth
            .map(|d| d.clamp(0, HIERARCHY_DEPTH_CAP) as usize)
            .unwrap_or(DEFAULT_MAX_DEPTH);
        let query = Query::new(Table::Desktops, HIERARCHY_COLUMNS)
            .eq("workspace_id", workspace_id)
            .order("position_order", false);
        let desktops: Vec<Desktop> = self.db().fetch_as(&query).await?;
        Ok(flatten(&build_forest(&desktops, max_depth)))
    }

    pub async fn get_desktop_contents(
        &self,
        desktop_id: &str,
        include_note_content: bool,
    ) -> DeskflowResult<DesktopContents> {
        self.guard(Access::Read)?;
        validate_id("desktop_id", desktop_id)?;
        let db = self.db();
        let desktop: Desktop = db
            .fetch_one(
                &Query::new(Table::Desktops, "id, name, parent_id, workspace_id").eq("id", desktop_id),
                &format!("Desktop {} not found", desktop_id),
            )
            .await?;

        let note_columns = if include_note_content {
            format!("{}, content", NOTE_COLUMNS)
        } else {
            NOTE_COLUMNS.to_string()
        };
        let notes_q = Query::new(Table::Notes, &note_columns)
            .eq("desktop_id", desktop_id)
            .order("z_index", false);
        let folders_q = Query::new(Table::Folders, FOLDER_COLUMNS).eq("desktop_id", desktop_id);
        let connections_q = Query::new(Table::Connections, CONNECTION_COLUMNS).eq("desktop_id", desktop_id);
        let (notes, folders, connections) = futures::try_join!(
            db.fetch_as::<Note>(&notes_q),
            db.fetch_as::<Folder>(&folders_q),
            db.fetch_as::<Connection>(&connections_q),
        )?;

        let counts = ContentCounts {
            notes: notes.len(),
            folders: folders.len(),
            connections: connections.len(),
        };
        Ok(DesktopContents { desktop, notes, folders, connections, counts })
    }

    /// New desktop placed after every existing one in the workspace.
    pub async fn create_desktop(&self, input: CreateDesktop) -> DeskflowResult<Desktop> {
        self.guard(Access::Write)?;
        validate_id("workspace_id", &input.workspace_id)?;
        let name = require_text("name", &input.name, NAME_MAX)?;
        if let Some(parent) = &input.parent_id {
            validate_id("parent_id", parent)?;
        }

        let max_order = self
            .max_in_scope(Table::Desktops, "position_order", "workspace_id", &input.workspace_id)
            .await?;
        let row = json!({
            "workspace_id": input.workspace_id,
            "name": name,
            "parent_id": input.parent_id,
            "position_order": max_order + 1,
        });
        self.db().insert_as(Table::Desktops, row).await
    }

    pub async fn update_desktop(&self, input: UpdateDesktop) -> DeskflowResult<Desktop> {
        self.guard(Access::Write)?;
        validate_id("desktop_id", &input.desktop_id)?;

        let mut patch = Map::new();
        patch.insert("updated_at".into(), Value::String(now_iso()));
        if let Some(name) = &input.name {
            if name.trim().is_empty() {
                return Err(validation("name cannot be empty"));
            }
            patch.insert("name".into(), json!(require_text("name", name, NAME_MAX)?));
        }
        if let Some(parent) = &input.parent_id {
            if parent == "null" {
                patch.insert("parent_id".into(), Value::Null);
            } else {
                validate_id("parent_id", parent)?;
                if *parent == input.desktop_id {
                    return Err(validation("a desktop cannot be its own parent"));
                }
                patch.insert("parent_id".into(), json!(parent));
            }
        }
        if let Some(order) = input.position_order {
            patch.insert("position_order".into(), json!(order));
        }

        let filters = [Filter::eq("id", input.desktop_id.as_str())];
        let updated: Vec<Desktop> = self
            .db()
            .update_as(Table::Desktops, &filters, Value::Object(patch))
            .await?;
        updated
            .into_iter()
            .next()
            .ok_or_else(|| not_found(format!("Desktop {} not found", input.desktop_id)))
    }

    /// Notes, folders and connections on the desktop go with it (backend cascade).
    pub async fn delete_desktop(&self, desktop_id: &str) -> DeskflowResult<OpMessage> {
        self.guard(Access::Write)?;
        validate_id("desktop_id", desktop_id)?;
        let rows = self
            .db()
            .delete(Table::Desktops, &[Filter::eq("id", desktop_id)])
            .await?;
        self.deleted("Desktop", desktop_id, rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::error::DeskflowError;

    #[tokio::test]
    async fn test_hierarchy_levels() {
        let (state, _mem) = state();
        let rows = state.get_desktop_hierarchy(WS, None).await.unwrap();
        let got: Vec<(&str, usize)> = rows.iter().map(|r| (r.item.id.as_str(), r.level)).collect();
        assert_eq!(got, vec![(ROOT, 0), (DESK_A, 1)]);

        let shallow = state.get_desktop_hierarchy(WS, Some(0)).await.unwrap();
        assert_eq!(shallow.len(), 1);
    }

    #[tokio::test]
    async fn test_create_appends_position() {
        let (state, _mem) = state();
        let d = state
            .create_desktop(CreateDesktop { workspace_id: WS.into(), name: "Archive".into(), parent_id: Some(ROOT.into()) })
            .await
            .unwrap();
        assert_eq!(d.position_order, 3);
        assert_eq!(d.parent_id.as_deref(), Some(ROOT));
    }

    #[tokio::test]
    async fn test_update_null_parent_moves_to_root() {
        let (state, _mem) = state();
        let d = state
            .update_desktop(UpdateDesktop {
                desktop_id: DESK_A.into(),
                name: None,
                parent_id: Some("null".into()),
                position_order: None,
            })
            .await
            .unwrap();
        assert_eq!(d.parent_id, None);
        let roots = state.get_desktop_hierarchy(WS, None).await.unwrap();
        assert!(roots.iter().all(|r| r.level == 0));
    }

    #[tokio::test]
    async fn test_contents_counts_and_content_projection() {
        let (state, _mem) = state();
        let contents = state.get_desktop_contents(ROOT, false).await.unwrap();
        assert_eq!(contents.counts.notes, 2);
        assert!(contents.notes.iter().all(|n| n.content.is_none()));
        // ordered by z_index ascending
        assert_eq!(contents.notes[0].id, NOTE_2);

        let with_content = state.get_desktop_contents(ROOT, true).await.unwrap();
        assert!(with_content.notes.iter().all(|n| n.content.is_some()));
    }

    #[tokio::test]
    async fn test_root_desktop_and_missing() {
        let (state, _mem) = state();
        assert_eq!(state.get_root_desktop(WS).await.unwrap().id, ROOT);
        assert!(matches!(state.get_desktop(MISSING).await, Err(DeskflowError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_by_default() {
        let (state, _mem) = state();
        assert!(state.delete_desktop(DESK_A).await.is_ok());
        assert!(state.delete_desktop(DESK_A).await.is_ok());
    }
}
