use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::app_state::AppState;
use crate::db::{Connection, Filter, Query, Table};
use crate::error::{not_found, validation, DeskflowResult};
use crate::rate_limit::Access;
use crate::utils::validate_id;

use super::{now_iso, OpMessage, DEFAULT_COLOR};

const LIST_COLUMNS: &str = "id, from_note_id, to_note_id, color, created_at";

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
pub struct CreateConnection {
    /// UUID of the desktop both notes are on
    pub desktop_id: String,
    /// UUID of the source note
    pub from_note_id: String,
    /// UUID of the target note
    pub to_note_id: String,
    /// Line color in hex (default "#00ff41")
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteConnections {
    pub outgoing: Vec<Connection>,
    pub incoming: Vec<Connection>,
    pub total: usize,
}

impl AppState {
    pub async fn list_connections(&self, desktop_id: &str) -> DeskflowResult<Vec<Connection>> {
        self.guard(Access::Read)?;
        validate_id("desktop_id", desktop_id)?;
        self.db()
            .fetch_as(&Query::new(Table::Connections, LIST_COLUMNS).eq("desktop_id", desktop_id))
            .await
    }

    pub async fn get_connection(&self, connection_id: &str) -> DeskflowResult<Connection> {
        self.guard(Access::Read)?;
        validate_id("connection_id", connection_id)?;
        self.db()
            .fetch_one(
                &Query::new(Table::Connections, "*").eq("id", connection_id),
                &format!("Connection {} not found", connection_id),
            )
            .await
    }

    /// Edges leaving and entering a note, kept apart.
    pub async fn get_note_connections(&self, note_id: &str) -> DeskflowResult<NoteConnections> {
        self.guard(Access::Read)?;
        validate_id("note_id", note_id)?;
        let db = self.db();
        let outgoing_q = Query::new(Table::Connections, "id, to_note_id, color, created_at").eq("from_note_id", note_id);
        let incoming_q = Query::new(Table::Connections, "id, from_note_id, color, created_at").eq("to_note_id", note_id);
        let (outgoing, incoming) = futures::try_join!(
            db.fetch_as::<Connection>(&outgoing_q),
            db.fetch_as::<Connection>(&incoming_q),
        )?;
        let total = outgoing.len() + incoming.len();
        Ok(NoteConnections { outgoing, incoming, total })
    }

    /// Both notes must be on `desktop_id`, and the same directed edge must not
    /// already exist.
    pub async fn create_connection(&self, input: CreateConnection) -> DeskflowResult<Connection> {
        self.guard(Access::Write)?;
        validate_id("desktop_id", &input.desktop_id)?;
        validate_id("from_note_id", &input.from_note_id)?;
        validate_id("to_note_id", &input.to_note_id)?;
        if input.from_note_id == input.to_note_id {
            return Err(validation("a note cannot be connected to itself"));
        }

        let db = self.db();
        let endpoints = [input.from_note_id.clone(), input.to_note_id.clone()];
        let on_desktop = db
            .fetch_ids(
                &Query::new(Table::Notes, "id")
                    .eq("desktop_id", input.desktop_id.as_str())
                    .in_list("id", &endpoints),
            )
            .await?;
        if on_desktop.len() != 2 {
            return Err(validation("both notes must exist on the same desktop"));
        }

        let existing = db
            .fetch_ids(
                &Query::new(Table::Connections, "id")
                    .eq("from_note_id", input.from_note_id.as_str())
                    .eq("to_note_id", input.to_note_id.as_str()),
            )
            .await?;
        if !existing.is_empty() {
            return Err(validation("a connection between these notes already exists"));
        }

        let row = json!({
            "desktop_id": input.desktop_id,
            "from_note_id": input.from_note_id,
            "to_note_id": input.to_note_id,
            "color": input.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
        });
        db.insert_as(Table::Connections, row).await
    }

    pub async fn update_connection(&self, connection_id: &str, color: Option<String>) -> DeskflowResult<Connection> {
        self.guard(Access::Write)?;
        validate_id("connection_id", connection_id)?;
        let Some(color) = color else {
            return Err(validation("at least one field to update is required"));
        };
        let filters = [Filter::eq("id", connection_id)];
        let updated: Vec<Connection> = self
            .db()
            .update_as(Table::Connections, &filters, json!({ "color": color, "updated_at": now_iso() }))
            .await?;
        updated
            .into_iter()
            .next()
            .ok_or_else(|| not_found(format!("Connection {} not found", connection_id)))
    }

    pub async fn delete_connection(&self, connection_id: &str) -> DeskflowResult<OpMessage> {
        self.guard(Access::Write)?;
        validate_id("connection_id", connection_id)?;
        let rows = self
            .db()
            .delete(Table::Connections, &[Filter::eq("id", connection_id)])
            .await?;
        self.deleted("Connection", connection_id, rows.len())
    }

    /// Remove every edge touching a note, in either direction.
    pub async fn delete_note_connections(&self, note_id: &str) -> DeskflowResult<OpMessage> {
        self.guard(Access::Write)?;
        validate_id("note_id", note_id)?;
        let db = self.db();
        let outgoing = db
            .delete(Table::Connections, &[Filter::eq("from_note_id", note_id)])
            .await?;
        let incoming = db
            .delete(Table::Connections, &[Filter::eq("to_note_id", note_id)])
            .await?;
        let count = outgoing.len() + incoming.len();
        Ok(OpMessage::with_count(format!("Deleted {} connections", count), count))
    }
}
