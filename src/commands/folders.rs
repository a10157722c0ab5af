use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::app_state::AppState;
use crate::db::{Filter, Folder, Query, Table};
use crate::error::{not_found, validation, DeskflowResult};
use crate::rate_limit::Access;
use crate::utils::{require_text, validate_id};

use super::{blank_to_null, now_iso, OpMessage};

const LIST_COLUMNS: &str = "id, name, target_desktop_id, position_x, position_y, icon, color, created_at";
const NAME_MAX: usize = 100;

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
pub struct CreateFolder {
    /// UUID of the desktop the folder sits on
    pub desktop_id: String,
    /// UUID of the desktop the folder opens
    pub target_desktop_id: String,
    /// Folder name (max 100 characters)
    pub name: String,
    #[serde(default)]
    pub position_x: Option<f64>,
    #[serde(default)]
    pub position_y: Option<f64>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
pub struct UpdateFolder {
    /// UUID of the folder
    pub folder_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub target_desktop_id: Option<String>,
    #[serde(default)]
    pub position_x: Option<f64>,
    #[serde(default)]
    pub position_y: Option<f64>,
    /// Empty string clears the icon
    #[serde(default)]
    pub icon: Option<String>,
    /// Empty string clears the color
    #[serde(default)]
    pub color: Option<String>,
}

impl AppState {
    pub async fn list_folders(&self, desktop_id: &str) -> DeskflowResult<Vec<Folder>> {
        self.guard(Access::Read)?;
        validate_id("desktop_id", desktop_id)?;
        self.db()
            .fetch_as(&Query::new(Table::Folders, LIST_COLUMNS).eq("desktop_id", desktop_id))
            .await
    }

    pub async fn get_folder(&self, folder_id: &str) -> DeskflowResult<Folder> {
        self.guard(Access::Read)?;
        validate_id("folder_id", folder_id)?;
        self.db()
            .fetch_one(
                &Query::new(Table::Folders, "*").eq("id", folder_id),
                &format!("Folder {} not found", folder_id),
            )
            .await
    }

    pub async fn create_folder(&self, input: CreateFolder) -> DeskflowResult<Folder> {
        self.guard(Access::Write)?;
        validate_id("desktop_id", &input.desktop_id)?;
        validate_id("target_desktop_id", &input.target_desktop_id)?;
        let name = require_text("name", &input.name, NAME_MAX)?;
        let row = json!({
            "desktop_id": input.desktop_id,
            "target_desktop_id": input.target_desktop_id,
            "name": name,
            "position_x": input.position_x.unwrap_or(100.0),
            "position_y": input.position_y.unwrap_or(100.0),
            "icon": input.icon,
            "color": input.color,
        });
        self.db().insert_as(Table::Folders, row).await
    }

    pub async fn update_folder(&self, input: UpdateFolder) -> DeskflowResult<Folder> {
        self.guard(Access::Write)?;
        validate_id("folder_id", &input.folder_id)?;

        let mut patch = Map::new();
        patch.insert("updated_at".into(), Value::String(now_iso()));
        if let Some(name) = &input.name {
            if name.trim().is_empty() {
                return Err(validation("name cannot be empty"));
            }
            patch.insert("name".into(), json!(require_text("name", name, NAME_MAX)?));
        }
        if let Some(target) = &input.target_desktop_id {
            validate_id("target_desktop_id", target)?;
            patch.insert("target_desktop_id".into(), json!(target));
        }
        if let Some(x) = input.position_x {
            patch.insert("position_x".into(), json!(x));
        }
        if let Some(y) = input.position_y {
            patch.insert("position_y".into(), json!(y));
        }
        if let Some(icon) = &input.icon {
            patch.insert("icon".into(), blank_to_null(icon));
        }
        if let Some(color) = &input.color {
            patch.insert("color".into(), blank_to_null(color));
        }

        let filters = [Filter::eq("id", input.folder_id.as_str())];
        let updated: Vec<Folder> = self
            .db()
            .update_as(Table::Folders, &filters, Value::Object(patch))
            .await?;
        updated
            .into_iter()
            .next()
            .ok_or_else(|| not_found(format!("Folder {} not found", input.folder_id)))
    }

    pub async fn delete_folder(&self, folder_id: &str) -> DeskflowResult<OpMessage> {
        self.guard(Access::Write)?;
        validate_id("folder_id", folder_id)?;
        let rows = self.db().delete(Table::Folders, &[Filter::eq("id", folder_id)]).await?;
        self.deleted("Folder", folder_id, rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::error::DeskflowError;

    #[tokio::test]
    async fn test_folder_lifecycle() {
        let (state, _mem) = state();
        let folder = state
            .create_folder(CreateFolder {
                desktop_id: ROOT.into(),
                target_desktop_id: DESK_A.into(),
                name: "Projects".into(),
                position_x: None,
                position_y: Some(40.0),
                icon: Some("star".into()),
                color: None,
            })
            .await
            .unwrap();
        assert_eq!(folder.position_x, Some(100.0));
        assert_eq!(state.list_folders(ROOT).await.unwrap().len(), 1);

        let updated = state
            .update_folder(UpdateFolder { folder_id: folder.id.clone(), icon: Some(String::new()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(updated.icon, None);

        state.delete_folder(&folder.id).await.unwrap();
        assert!(matches!(state.get_folder(&folder.id).await, Err(DeskflowError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_bad_target_is_rejected() {
        let (state, _mem) = state();
        let err = state
            .update_folder(UpdateFolder {
                folder_id: MISSING.into(),
                target_desktop_id: Some("nope".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DeskflowError::Validation(_)));
    }
}
