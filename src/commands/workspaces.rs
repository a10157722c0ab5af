use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::app_state::AppState;
use crate::db::{Filter, Query, Table, Workspace};
use crate::error::{not_found, validation, DeskflowResult};
use crate::index::default_workspace;
use crate::rate_limit::Access;
use crate::utils::{require_text, validate_id};

use super::{now_iso, OpMessage, DEFAULT_COLOR};

const LIST_COLUMNS: &str = "id, name, description, is_default, theme_config, created_at, updated_at";
const NAME_MAX: usize = 100;

fn default_theme() -> Value {
    json!({
        "primaryColor": DEFAULT_COLOR,
        "glowIntensity": 0.5,
        "particlesEnabled": true,
        "animationsEnabled": true,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
pub struct CreateWorkspace {
    /// Workspace name (max 100 characters)
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Make this the default workspace
    #[serde(default)]
    pub is_default: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
pub struct UpdateWorkspace {
    /// UUID of the workspace
    pub workspace_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Empty string clears the description
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_default: Option<bool>,
    /// Replaces the whole theme object
    #[serde(default)]
    pub theme_config: Option<Value>,
}

impl AppState {
    pub async fn list_workspaces(&self) -> DeskflowResult<Vec<Workspace>> {
        self.guard(Access::Read)?;
        let query = Query::new(Table::Workspaces, LIST_COLUMNS)
            .is_null("deleted_at")
            .order("name", false);
        self.db().fetch_as(&query).await
    }

    pub async fn get_workspace(&self, workspace_id: &str) -> DeskflowResult<Workspace> {
        self.guard(Access::Read)?;
        validate_id("workspace_id", workspace_id)?;
        let query = Query::new(Table::Workspaces, "*")
            .eq("id", workspace_id)
            .is_null("deleted_at");
        self.db()
            .fetch_one(&query, &format!("Workspace {} not found", workspace_id))
            .await
    }

    pub async fn get_default_workspace(&self) -> DeskflowResult<Workspace> {
        self.guard(Access::Read)?;
        default_workspace(self.db(), "*").await
    }

    pub async fn create_workspace(&self, input: CreateWorkspace) -> DeskflowResult<Workspace> {
        self.guard(Access::Write)?;
        let name = require_text("name", &input.name, NAME_MAX)?;
        let user_id = self.db().current_user_id().await?;
        let description = input
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        let row = json!({
            "user_id": user_id,
            "name": name,
            "description": description,
            "is_default": input.is_default.unwrap_or(false),
            "theme_config": default_theme(),
        });
        let workspace: Workspace = self.db().insert_as(Table::Workspaces, row).await?;
        tracing::info!(workspace_id = %workspace.id, "workspace created");
        Ok(workspace)
    }

    pub async fn update_workspace(&self, input: UpdateWorkspace) -> DeskflowResult<Workspace> {
        self.guard(Access::Write)?;
        validate_id("workspace_id", &input.workspace_id)?;

        let mut patch = Map::new();
        patch.insert("updated_at".into(), Value::String(now_iso()));
        if let Some(name) = &input.name {
            if name.trim().is_empty() {
                return Err(validation("name cannot be empty"));
            }
            patch.insert("name".into(), json!(require_text("name", name, NAME_MAX)?));
        }
        if let Some(description) = &input.description {
            let d = description.trim();
            patch.insert("description".into(), if d.is_empty() { Value::Null } else { json!(d) });
        }
        if let Some(is_default) = input.is_default {
            patch.insert("is_default".into(), json!(is_default));
        }
        if let Some(theme) = input.theme_config {
            patch.insert("theme_config".into(), theme);
        }

        let filters = [Filter::eq("id", input.workspace_id.as_str())];
        let updated: Vec<Workspace> = self
            .db()
            .update_as(Table::Workspaces, &filters, Value::Object(patch))
            .await?;
        updated
            .into_iter()
            .next()
            .ok_or_else(|| not_found(format!("Workspace {} not found", input.workspace_id)))
    }

    /// Soft delete: stamps `deleted_at`, the row stays.
    pub async fn delete_workspace(&self, workspace_id: &str) -> DeskflowResult<OpMessage> {
        self.guard(Access::Write)?;
        validate_id("workspace_id", workspace_id)?;
        let filters = [Filter::eq("id", workspace_id)];
        let rows = self
            .db()
            .update(Table::Workspaces, &filters, json!({ "deleted_at": now_iso() }))
            .await?;
        self.deleted("Workspace", workspace_id, rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::db::memory::TEST_USER_ID;
    use crate::error::DeskflowError;

    #[tokio::test]
    async fn test_create_sets_owner_and_theme() {
        let (state, _mem) = state();
        let ws = state
            .create_workspace(CreateWorkspace {
                name: "  Research  ".into(),
                description: Some("   ".into()),
                is_default: None,
            })
            .await
            .unwrap();
        assert_eq!(ws.name.as_deref(), Some("Research"));
        assert_eq!(ws.user_id.as_deref(), Some(TEST_USER_ID));
        assert_eq!(ws.description, None);
        assert_eq!(ws.theme_config.unwrap()["primaryColor"], DEFAULT_COLOR);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_workspace() {
        let (state, _mem) = state();
        state.delete_workspace(WS).await.unwrap();
        let err = state.get_workspace(WS).await.unwrap_err();
        assert!(matches!(err, DeskflowError::NotFound(_)));
        assert!(state.list_workspaces().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_rejects_blank_name_and_unknown_id() {
        let (state, _mem) = state();
        let blank = UpdateWorkspace {
            workspace_id: WS.into(),
            name: Some("  ".into()),
            description: None,
            is_default: None,
            theme_config: None,
        };
        assert!(matches!(state.update_workspace(blank).await, Err(DeskflowError::Validation(_))));

        let unknown = UpdateWorkspace {
            workspace_id: MISSING.into(),
            name: Some("x".into()),
            description: None,
            is_default: None,
            theme_config: None,
        };
        assert!(matches!(state.update_workspace(unknown).await, Err(DeskflowError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_default_workspace() {
        let (state, _mem) = state();
        assert_eq!(state.get_default_workspace().await.unwrap().id, WS);
    }

    #[tokio::test]
    async fn test_invalid_id_is_validation() {
        let (state, mem) = state();
        let err = state.get_workspace("short").await.unwrap_err();
        assert!(matches!(err, DeskflowError::Validation(_)));
        assert!(mem.calls().is_empty());
    }
}
