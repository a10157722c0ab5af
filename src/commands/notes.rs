use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::app_state::AppState;
use crate::db::{Filter, Note, Query, Table};
use crate::error::{not_found, validation, DeskflowResult};
use crate::rate_limit::Access;
use crate::utils::{require_text, validate_id};

use super::{blank_to_null, now_iso, OpMessage};

const LIST_COLUMNS: &str =
    "id, title, position_x, position_y, width, height, color, z_index, minimized, created_at, updated_at";
pub const TITLE_MAX: usize = 200;
pub const CONTENT_MAX: usize = 100_000;

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
pub struct CreateNote {
    /// UUID of the desktop to place the note on
    pub desktop_id: String,
    /// Note title (max 200 characters)
    pub title: String,
    /// Note body, HTML or plain text (max 100000 characters)
    #[serde(default)]
    pub content: Option<String>,
    /// X position on the desktop (default 100)
    #[serde(default)]
    pub position_x: Option<f64>,
    /// Y position on the desktop (default 100)
    #[serde(default)]
    pub position_y: Option<f64>,
    /// Width (default 300)
    #[serde(default)]
    pub width: Option<f64>,
    /// Height (default 200)
    #[serde(default)]
    pub height: Option<f64>,
    /// Hex color, e.g. "#00ff41"
    #[serde(default)]
    pub color: Option<String>,
}

impl CreateNote {
    pub fn new(desktop_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            desktop_id: desktop_id.into(),
            title: title.into(),
            content: None,
            position_x: None,
            position_y: None,
            width: None,
            height: None,
            color: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
pub struct UpdateNote {
    /// UUID of the note
    pub note_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub position_x: Option<f64>,
    #[serde(default)]
    pub position_y: Option<f64>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    /// Empty string clears the color
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub z_index: Option<i64>,
    #[serde(default)]
    pub minimized: Option<bool>,
}

fn check_content(content: &str) -> DeskflowResult<()> {
    if content.chars().count() > CONTENT_MAX {
        return Err(validation(format!("content cannot exceed {} characters", CONTENT_MAX)));
    }
    Ok(())
}

impl AppState {
    pub async fn list_notes(&self, desktop_id: &str) -> DeskflowResult<Vec<Note>> {
        self.guard(Access::Read)?;
        validate_id("desktop_id", desktop_id)?;
        let query = Query::new(Table::Notes, LIST_COLUMNS)
            .eq("desktop_id", desktop_id)
            .order("z_index", false);
        self.db().fetch_as(&query).await
    }

    pub async fn get_note(&self, note_id: &str) -> DeskflowResult<Note> {
        self.guard(Access::Read)?;
        validate_id("note_id", note_id)?;
        self.fetch_note(note_id, "*").await
    }

    pub(crate) async fn fetch_note(&self, note_id: &str, columns: &str) -> DeskflowResult<Note> {
        self.db()
            .fetch_one(
                &Query::new(Table::Notes, columns).eq("id", note_id),
                &format!("Note {} not found", note_id),
            )
            .await
    }

    async fn next_z_index(&self, desktop_id: &str) -> DeskflowResult<i64> {
        Ok(self.max_in_scope(Table::Notes, "z_index", "desktop_id", desktop_id).await? + 1)
    }

    /// New note stacked above everything else on its desktop.
    pub async fn create_note(&self, input: CreateNote) -> DeskflowResult<Note> {
        self.guard(Access::Write)?;
        validate_id("desktop_id", &input.desktop_id)?;
        let title = require_text("title", &input.title, TITLE_MAX)?;
        let content = input.content.unwrap_or_default();
        check_content(&content)?;

        let z_index = self.next_z_index(&input.desktop_id).await?;
        let row = json!({
            "desktop_id": input.desktop_id,
            "title": title,
            "content": content,
            "position_x": input.position_x.unwrap_or(100.0),
            "position_y": input.position_y.unwrap_or(100.0),
            "width": input.width.unwrap_or(300.0),
            "height": input.height.unwrap_or(200.0),
            "color": input.color,
            "z_index": z_index,
            "minimized": false,
        });
        let note: Note = self.db().insert_as(Table::Notes, row).await?;
        tracing::info!(note_id = %note.id, z_index, "note created");
        Ok(note)
    }

    pub async fn update_note(&self, input: UpdateNote) -> DeskflowResult<Note> {
        self.guard(Access::Write)?;
        validate_id("note_id", &input.note_id)?;

        let mut patch = Map::new();
        patch.insert("updated_at".into(), Value::String(now_iso()));
        if let Some(title) = &input.title {
            if title.trim().is_empty() {
                return Err(validation("title cannot be empty"));
            }
            patch.insert("title".into(), json!(require_text("title", title, TITLE_MAX)?));
        }
        if let Some(content) = &input.content {
            check_content(content)?;
            patch.insert("content".into(), json!(content));
        }
        for (key, value) in [
            ("position_x", input.position_x),
            ("position_y", input.position_y),
            ("width", input.width),
            ("height", input.height),
        ] {
            if let Some(v) = value {
                patch.insert(key.into(), json!(v));
            }
        }
        if let Some(color) = &input.color {
            patch.insert("color".into(), blank_to_null(color));
        }
        if let Some(z) = input.z_index {
            patch.insert("z_index".into(), json!(z));
        }
        if let Some(minimized) = input.minimized {
            patch.insert("minimized".into(), json!(minimized));
        }

        self.patch_note(&input.note_id, Value::Object(patch)).await
    }

    async fn patch_note(&self, note_id: &str, patch: Value) -> DeskflowResult<Note> {
        let filters = [Filter::eq("id", note_id)];
        let updated: Vec<Note> = self.db().update_as(Table::Notes, &filters, patch).await?;
        updated
            .into_iter()
            .next()
            .ok_or_else(|| not_found(format!("Note {} not found", note_id)))
    }

    /// Assets and connections of the note go with it (backend cascade).
    pub async fn delete_note(&self, note_id: &str) -> DeskflowResult<OpMessage> {
        self.guard(Access::Write)?;
        validate_id("note_id", note_id)?;
        let rows = self.db().delete(Table::Notes, &[Filter::eq("id", note_id)]).await?;
        self.deleted("Note", note_id, rows.len())
    }

    pub async fn bring_note_to_front(&self, note_id: &str) -> DeskflowResult<Note> {
        self.guard(Access::Write)?;
        validate_id("note_id", note_id)?;
        let note = self.fetch_note(note_id, "id, desktop_id").await?;
        let desktop_id = note
            .desktop_id
            .ok_or_else(|| not_found(format!("Note {} has no desktop", note_id)))?;
        let z_index = self.next_z_index(&desktop_id).await?;
        self.patch_note(note_id, json!({ "z_index": z_index, "updated_at": now_iso() }))
            .await
    }

    /// Copy of a note, shifted by the offsets and placed on top.
    pub async fn duplicate_note(
        &self,
        note_id: &str,
        offset_x: Option<f64>,
        offset_y: Option<f64>,
    ) -> DeskflowResult<Note> {
        self.guard(Access::Write)?;
        validate_id("note_id", note_id)?;
        let original = self.fetch_note(note_id, "*").await?;
        let desktop_id = original
            .desktop_id
            .clone()
            .ok_or_else(|| not_found(format!("Note {} has no desktop", note_id)))?;
        let z_index = self.next_z_index(&desktop_id).await?;

        let title = format!("{} (copy)", original.title.as_deref().unwrap_or_default());
        let row = json!({
            "desktop_id": desktop_id,
            "title": title,
            "content": original.content,
            "position_x": original.position_x.unwrap_or(0.0) + offset_x.unwrap_or(30.0),
            "position_y": original.position_y.unwrap_or(0.0) + offset_y.unwrap_or(30.0),
            "width": original.width,
            "height": original.height,
            "color": original.color,
            "z_index": z_index,
            "minimized": false,
        });
        self.db().insert_as(Table::Notes, row).await
    }
}
