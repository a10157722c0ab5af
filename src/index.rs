//! Workspace index: one workspace, its desktop tree, and everything on it.
//!
//! Fetch order is fixed by the data dependencies: workspace, then its desktops,
//! then notes/folders/connections scoped to those desktops (concurrently), then
//! one asset count scoped to the notes.

use std::collections::HashMap;

use serde::Serialize;

use crate::db::{Backend, Connection, Desktop, Folder, Note, Query, Table, Workspace};
use crate::error::{DeskflowError, DeskflowResult};
use crate::hierarchy::{build_forest, detached_ids, HierarchyNode, TreeNode};
use crate::stats::{count_assets, WorkspaceStats};

const WORKSPACE_COLUMNS: &str = "id, name, description, is_default, created_at";
const DESKTOP_COLUMNS: &str = "id, name, parent_id, position_order";
const NOTE_COLUMNS: &str = "id, title, desktop_id, updated_at";
const NOTE_COLUMNS_WITH_CONTENT: &str = "id, title, desktop_id, updated_at, content";
const FOLDER_COLUMNS: &str = "id, name, desktop_id, target_desktop_id";
const CONNECTION_COLUMNS: &str = "id, desktop_id, from_note_id, to_note_id";

/// A desktop with its own notes and folders attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesktopEntry {
    #[serde(flatten)]
    pub desktop: Desktop,
    pub note_count: usize,
    pub folder_count: usize,
    pub connection_count: usize,
    pub notes: Vec<Note>,
    pub folders: Vec<Folder>,
}

impl TreeNode for DesktopEntry {
    fn node_id(&self) -> &str {
        &self.desktop.id
    }

    fn parent_id(&self) -> Option<&str> {
        self.desktop.parent_id.as_deref()
    }

    fn position_order(&self) -> i64 {
        self.desktop.position_order
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkspaceIndex {
    pub workspace: Workspace,
    pub tree: Vec<HierarchyNode<DesktopEntry>>,
    pub notes: Vec<Note>,
    pub folders: Vec<Folder>,
    pub connections: Vec<Connection>,
    /// Desktops that exist but are not reachable from a root.
    pub detached_desktop_ids: Vec<String>,
    pub stats: WorkspaceStats,
}

/// The caller's default workspace (not soft-deleted).
pub async fn default_workspace(backend: &dyn Backend, columns: &str) -> DeskflowResult<Workspace> {
    let query = Query::new(Table::Workspaces, columns)
        .eq("is_default", true)
        .is_null("deleted_at")
        .limit(1);
    backend
        .fetch_first(&query)
        .await?
        .ok_or_else(|| DeskflowError::NotFound("No default workspace found".to_string()))
}

/// Group rows under the desktop they live on.
fn group_by_desktop<T: Clone>(rows: &[T], desktop_of: impl Fn(&T) -> Option<&str>) -> HashMap<String, Vec<T>> {
    let mut grouped: HashMap<String, Vec<T>> = HashMap::new();
    for row in rows {
        if let Some(desktop_id) = desktop_of(row) {
            grouped.entry(desktop_id.to_string()).or_default().push(row.clone());
        }
    }
    grouped
}

/// Attach notes, folders and connection counts to each desktop. Pure.
pub fn attach_contents(
    desktops: Vec<Desktop>,
    notes: &[Note],
    folders: &[Folder],
    connections: &[Connection],
) -> Vec<DesktopEntry> {
    let mut notes_by = group_by_desktop(notes, |n| n.desktop_id.as_deref());
    let mut folders_by = group_by_desktop(folders, |f| f.desktop_id.as_deref());
    let mut conn_counts: HashMap<&str, usize> = HashMap::new();
    for c in connections {
        if let Some(d) = c.desktop_id.as_deref() {
            *conn_counts.entry(d).or_default() += 1;
        }
    }

    desktops
        .into_iter()
        .map(|desktop| {
            let notes = notes_by.remove(&desktop.id).unwrap_or_default();
            let folders = folders_by.remove(&desktop.id).unwrap_or_default();
            let connection_count = conn_counts.get(desktop.id.as_str()).copied().unwrap_or(0);
            DesktopEntry {
                note_count: notes.len(),
                folder_count: folders.len(),
                connection_count,
                notes,
                folders,
                desktop,
            }
        })
        .collect()
}

pub async fn workspace_index(
    backend: &dyn Backend,
    workspace_id: Option<&str>,
    include_content: bool,
    max_depth: usize,
) -> DeskflowResult<WorkspaceIndex> {
    let workspace: Workspace = match workspace_id {
        Some(id) => backend
            .fetch_first(
                &Query::new(Table::Workspaces, WORKSPACE_COLUMNS)
                    .eq("id", id)
                    .is_null("deleted_at"),
            )
            .await?
            .ok_or_else(|| DeskflowError::NotFound(format!("Workspace {} not found", id)))?,
        None => default_workspace(backend, WORKSPACE_COLUMNS).await?,
    };

    let desktops: Vec<Desktop> = backend
        .fetch_as(
            &Query::new(Table::Desktops, DESKTOP_COLUMNS)
                .eq("workspace_id", workspace.id.as_str())
                .order("position_order", false),
        )
        .await?;
    if desktops.is_empty() {
        let stats = WorkspaceStats::empty(&workspace.id);
        return Ok(WorkspaceIndex {
            workspace,
            tree: Vec::new(),
            notes: Vec::new(),
            folders: Vec::new(),
            connections: Vec::new(),
            detached_desktop_ids: Vec::new(),
            stats,
        });
    }

    let desktop_ids: Vec<String> = desktops.iter().map(|d| d.id.clone()).collect();
    let note_columns = if include_content { NOTE_COLUMNS_WITH_CONTENT } else { NOTE_COLUMNS };
    let note_query = Query::new(Table::Notes, note_columns).in_list("desktop_id", &desktop_ids);
    let folder_query = Query::new(Table::Folders, FOLDER_COLUMNS).in_list("desktop_id", &desktop_ids);
    let connection_query = Query::new(Table::Connections, CONNECTION_COLUMNS).in_list("desktop_id", &desktop_ids);
    let (notes, folders, connections) = futures::try_join!(
        backend.fetch_as::<Note>(&note_query),
        backend.fetch_as::<Folder>(&folder_query),
        backend.fetch_as::<Connection>(&connection_query),
    )?;

    let note_ids: Vec<String> = notes.iter().map(|n| n.id.clone()).collect();
    let assets = count_assets(backend, &note_ids).await?;

    let stats = WorkspaceStats {
        workspace_id: workspace.id.clone(),
        desktops: desktops.len() as u64,
        notes: notes.len() as u64,
        folders: folders.len() as u64,
        connections: connections.len() as u64,
        assets,
    };

    let entries = attach_contents(desktops, &notes, &folders, &connections);
    let tree = build_forest(&entries, max_depth);
    let detached_desktop_ids = detached_ids(&entries, &tree);
    if !detached_desktop_ids.is_empty() {
        tracing::warn!(
            workspace_id = %workspace.id,
            count = detached_desktop_ids.len(),
            "Desktops unreachable from a root"
        );
    }

    Ok(WorkspaceIndex {
        workspace,
        tree,
        notes,
        folders,
        connections,
        detached_desktop_ids,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryBackend;
    use crate::hierarchy::DEFAULT_MAX_DEPTH;
    use serde_json::json;

    fn seeded() -> MemoryBackend {
        let mem = MemoryBackend::new();
        mem.seed(
            Table::Workspaces,
            vec![json!({"id": "W", "name": "Work", "is_default": true, "deleted_at": null})],
        );
        mem.seed(
            Table::Desktops,
            vec![
                json!({"id": "B", "workspace_id": "W", "parent_id": "Root", "name": "B", "position_order": 2}),
                json!({"id": "Root", "workspace_id": "W", "parent_id": null, "name": "Root", "position_order": 0}),
                json!({"id": "A", "workspace_id": "W", "parent_id": "Root", "name": "A", "position_order": 1}),
            ],
        );
        mem.seed(
            Table::Notes,
            vec![
                json!({"id": "n-root", "desktop_id": "Root", "title": "r", "content": "secret"}),
                json!({"id": "n-a", "desktop_id": "A", "title": "a"}),
                json!({"id": "n-b", "desktop_id": "B", "title": "b"}),
            ],
        );
        mem
    }

    #[tokio::test]
    async fn test_index_builds_tree_and_stats() {
        let mem = seeded();
        let index = workspace_index(&mem, Some("W"), false, DEFAULT_MAX_DEPTH).await.unwrap();

        assert_eq!(index.tree.len(), 1);
        let root = &index.tree[0];
        assert_eq!(root.item.desktop.id, "Root");
        assert_eq!(root.level, 0);
        let kids: Vec<(&str, usize, usize)> = root
            .children
            .iter()
            .map(|c| (c.item.desktop.id.as_str(), c.level, c.item.note_count))
            .collect();
        assert_eq!(kids, vec![("A", 1, 1), ("B", 1, 1)]);

        assert_eq!(index.stats.desktops, 3);
        assert_eq!(index.stats.notes, 3);
        assert!(index.detached_desktop_ids.is_empty());
        // content is not projected unless asked for
        assert!(index.notes.iter().all(|n| n.content.is_none()));
    }

    #[tokio::test]
    async fn test_index_defaults_workspace_and_includes_content() {
        let mem = seeded();
        let index = workspace_index(&mem, None, true, DEFAULT_MAX_DEPTH).await.unwrap();
        assert_eq!(index.workspace.id, "W");
        let root_note = index.notes.iter().find(|n| n.id == "n-root").unwrap();
        assert_eq!(root_note.content.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_empty_workspace_short_circuits() {
        let mem = MemoryBackend::new();
        mem.seed(Table::Workspaces, vec![json!({"id": "E", "name": "Empty"})]);
        let index = workspace_index(&mem, Some("E"), false, DEFAULT_MAX_DEPTH).await.unwrap();
        assert!(index.tree.is_empty());
        assert_eq!(index.stats, WorkspaceStats::empty("E"));
        assert!(mem.calls_to(Table::Notes).is_empty());
        assert!(mem.calls_to(Table::Assets).is_empty());
    }

    #[tokio::test]
    async fn test_null_position_order_still_indexes() {
        let mem = MemoryBackend::new();
        mem.seed(Table::Workspaces, vec![json!({"id": "W", "name": "Work"})]);
        mem.seed(
            Table::Desktops,
            vec![
                json!({"id": "Root", "workspace_id": "W", "parent_id": null, "position_order": null}),
                json!({"id": "A", "workspace_id": "W", "parent_id": "Root", "position_order": 1}),
                json!({"id": "B", "workspace_id": "W", "parent_id": "Root", "position_order": null}),
            ],
        );
        let index = workspace_index(&mem, Some("W"), false, DEFAULT_MAX_DEPTH).await.unwrap();
        assert_eq!(index.tree.len(), 1);
        let kids: Vec<&str> = index.tree[0].children.iter().map(|c| c.item.desktop.id.as_str()).collect();
        assert_eq!(kids, vec!["B", "A"]);
    }

    #[tokio::test]
    async fn test_unknown_workspace() {
        let mem = MemoryBackend::new();
        let err = workspace_index(&mem, Some("nope"), false, DEFAULT_MAX_DEPTH).await.unwrap_err();
        assert!(matches!(err, DeskflowError::NotFound(_)));
        let err = workspace_index(&mem, None, false, DEFAULT_MAX_DEPTH).await.unwrap_err();
        assert!(matches!(err, DeskflowError::NotFound(_)));
    }

    #[test]
    fn test_attach_contents_counts() {
        let desktops = vec![Desktop {
            id: "d".into(),
            workspace_id: None,
            parent_id: None,
            name: None,
            position_order: 0,
            created_at: None,
            updated_at: None,
        }];
        let conn = Connection {
            id: "c".into(),
            desktop_id: Some("d".into()),
            from_note_id: None,
            to_note_id: None,
            color: None,
            created_at: None,
        };
        let entries = attach_contents(desktops, &[], &[], &[conn.clone(), Connection { id: "c2".into(), ..conn }]);
        assert_eq!(entries[0].connection_count, 2);
        assert_eq!(entries[0].note_count, 0);
    }
}
