//! Per-workspace entity counts.
//!
//! Assets hang off notes, not desktops, so they are counted through the note ids
//! of the workspace. An empty scope short-circuits to zero without querying.

use serde::Serialize;

use crate::db::{Backend, Query, Table};
use crate::error::DeskflowResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkspaceStats {
    pub workspace_id: String,
    pub desktops: u64,
    pub notes: u64,
    pub folders: u64,
    pub connections: u64,
    pub assets: u64,
}

impl WorkspaceStats {
    pub fn empty(workspace_id: &str) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            ..Default::default()
        }
    }
}

/// Number of assets attached to `note_ids`. No query for an empty scope.
pub async fn count_assets(backend: &dyn Backend, note_ids: &[String]) -> DeskflowResult<u64> {
    if note_ids.is_empty() {
        return Ok(0);
    }
    backend
        .count(&Query::new(Table::Assets, "id").in_list("note_id", note_ids))
        .await
}

pub async fn workspace_stats(backend: &dyn Backend, workspace_id: &str) -> DeskflowResult<WorkspaceStats> {
    let desktop_ids = backend
        .fetch_ids(&Query::new(Table::Desktops, "id").eq("workspace_id", workspace_id))
        .await?;
    if desktop_ids.is_empty() {
        return Ok(WorkspaceStats::empty(workspace_id));
    }

    let notes = Query::new(Table::Notes, "id").in_list("desktop_id", &desktop_ids);
    let folders = Query::new(Table::Folders, "id").in_list("desktop_id", &desktop_ids);
    let connections = Query::new(Table::Connections, "id").in_list("desktop_id", &desktop_ids);
    let (note_count, note_ids, folder_count, connection_count) = futures::try_join!(
        backend.count(&notes),
        backend.fetch_ids(&notes),
        backend.count(&folders),
        backend.count(&connections),
    )?;
    let assets = count_assets(backend, &note_ids).await?;

    Ok(WorkspaceStats {
        workspace_id: workspace_id.to_string(),
        desktops: desktop_ids.len() as u64,
        notes: note_count,
        folders: folder_count,
        connections: connection_count,
        assets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryBackend;
    use serde_json::json;

    #[tokio::test]
    async fn test_zero_scope_issues_no_child_queries() {
        let mem = MemoryBackend::new();
        let stats = workspace_stats(&mem, "w-empty").await.unwrap();
        assert_eq!(stats, WorkspaceStats::empty("w-empty"));
        let tables: Vec<Table> = mem.calls().iter().map(|c| c.table).collect();
        assert_eq!(tables, vec![Table::Desktops]);
    }

    #[tokio::test]
    async fn test_counts_through_notes() {
        let mem = MemoryBackend::new();
        mem.seed(
            Table::Desktops,
            vec![
                json!({"id": "d1", "workspace_id": "w"}),
                json!({"id": "d2", "workspace_id": "w"}),
                json!({"id": "dx", "workspace_id": "other"}),
            ],
        );
        mem.seed(
            Table::Notes,
            vec![
                json!({"id": "n1", "desktop_id": "d1"}),
                json!({"id": "n2", "desktop_id": "d2"}),
                json!({"id": "nx", "desktop_id": "dx"}),
            ],
        );
        mem.seed(Table::Folders, vec![json!({"id": "f1", "desktop_id": "d1"})]);
        mem.seed(Table::Connections, vec![json!({"id": "c1", "desktop_id": "d1"})]);
        mem.seed(
            Table::Assets,
            vec![json!({"id": "a1", "note_id": "n1"}), json!({"id": "a2", "note_id": "nx"})],
        );

        let stats = workspace_stats(&mem, "w").await.unwrap();
        assert_eq!(stats.desktops, 2);
        assert_eq!(stats.notes, 2);
        assert_eq!(stats.folders, 1);
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.assets, 1);
    }

    #[tokio::test]
    async fn test_note_count_ignores_row_cap() {
        let mem = MemoryBackend::with_max_rows(2);
        mem.seed(Table::Desktops, vec![json!({"id": "d1", "workspace_id": "w"})]);
        mem.seed(
            Table::Notes,
            (0..5).map(|i| json!({"id": format!("n{}", i), "desktop_id": "d1"})).collect(),
        );
        let stats = workspace_stats(&mem, "w").await.unwrap();
        assert_eq!(stats.notes, 5);
        assert!(mem.calls_to(Table::Notes).iter().any(|c| c.op == "count"));
    }

    #[tokio::test]
    async fn test_no_notes_means_no_asset_query() {
        let mem = MemoryBackend::new();
        mem.seed(Table::Desktops, vec![json!({"id": "d1", "workspace_id": "w"})]);
        let stats = workspace_stats(&mem, "w").await.unwrap();
        assert_eq!(stats.desktops, 1);
        assert_eq!(stats.assets, 0);
        assert!(mem.calls_to(Table::Assets).is_empty());
    }
}
