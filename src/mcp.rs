//! MCP (Model Context Protocol) server over stdio.
//!
//! Every operation of `AppState` is one tool. Read tools and write tools are
//! listed separately so `--read-only` can hide and refuse the writers. Prompt
//! templates and reference resources come from `catalog`.
//! Launch: `deskflow-cli mcp-server --stdio [--read-only]`
//!
//! Tool parameters must be wrapped in `Parameters<T>`; plain structs do not
//! satisfy the `#[tool_router]` extractor bound.

use std::collections::HashSet;

use rmcp::{
    RoleServer, ServerHandler, ServiceExt,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    service::RequestContext,
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError,
};
use serde::Serialize;

use crate::app_state::AppState;
use crate::catalog;
use crate::commands::{
    CreateConnection, CreateDesktop, CreateFolder, CreateNote, CreateWorkspace, SearchNotes, UpdateDesktop,
    UpdateFolder, UpdateNote, UpdateWorkspace, UploadAsset,
};
use crate::error::{DeskflowError, DeskflowResult};

pub const READ_TOOLS: &[&str] = &[
    "list_workspaces",
    "get_workspace",
    "get_default_workspace",
    "list_desktops",
    "get_desktop",
    "get_root_desktop",
    "get_desktop_hierarchy",
    "get_desktop_contents",
    "list_notes",
    "get_note",
    "list_folders",
    "get_folder",
    "list_connections",
    "get_connection",
    "get_note_connections",
    "list_note_assets",
    "get_asset",
    "get_asset_url",
    "search_notes",
    "search_notes_in_desktop",
    "get_recent_notes",
    "get_workspace_stats",
    "find_connected_notes",
    "get_workspace_index",
];

pub const WRITE_TOOLS: &[&str] = &[
    "create_workspace",
    "update_workspace",
    "delete_workspace",
    "create_desktop",
    "update_desktop",
    "delete_desktop",
    "create_note",
    "update_note",
    "delete_note",
    "bring_note_to_front",
    "duplicate_note",
    "create_folder",
    "update_folder",
    "delete_folder",
    "create_connection",
    "update_connection",
    "delete_connection",
    "delete_note_connections",
    "upload_asset",
    "update_asset_position",
    "delete_asset",
    "delete_note_assets",
];

// ─── Parameter Structs ───────────────────────────────────────────────────────

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct NoParams {}

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct WorkspaceIdParams {
    /// Workspace UUID
    workspace_id: String,
}

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct DesktopIdParams {
    /// Desktop UUID
    desktop_id: String,
}

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct NoteIdParams {
    /// Note UUID
    note_id: String,
}

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct FolderIdParams {
    /// Folder UUID
    folder_id: String,
}

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct ConnectionIdParams {
    /// Connection UUID
    connection_id: String,
}

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct AssetIdParams {
    /// Asset UUID
    asset_id: String,
}

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct HierarchyParams {
    /// Workspace UUID
    workspace_id: String,
    /// Deepest level to include (default: 10)
    max_depth: Option<i64>,
}

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct DesktopContentsParams {
    /// Desktop UUID
    desktop_id: String,
    /// Include full note content (default: false)
    #[serde(default)]
    include_note_content: bool,
}

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct DuplicateNoteParams {
    /// Note UUID to copy
    note_id: String,
    /// Horizontal offset of the copy (default: 30)
    offset_x: Option<f64>,
    /// Vertical offset of the copy (default: 30)
    offset_y: Option<f64>,
}

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct UpdateConnectionParams {
    /// Connection UUID
    connection_id: String,
    /// New line color in hex
    color: Option<String>,
}

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct AssetPositionParams {
    /// Asset UUID
    asset_id: String,
    position_x: f64,
    position_y: f64,
}

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct DesktopSearchParams {
    /// Desktop UUID
    desktop_id: String,
    /// Text to look for in titles and content
    query: String,
    /// Maximum results, 1 to 100 (default: 20)
    limit: Option<i64>,
}

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct RecentNotesParams {
    /// Workspace UUID (default: your default workspace)
    workspace_id: Option<String>,
    /// Maximum results, 1 to 50 (default: 10)
    limit: Option<i64>,
}

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct ConnectedNotesParams {
    /// Note UUID to start from
    note_id: String,
    /// Hops to follow, 1 to 5 (default: 2)
    depth: Option<i64>,
}

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct WorkspaceIndexParams {
    /// Workspace UUID (default: your default workspace)
    workspace_id: Option<String>,
    /// Include full note content (default: false)
    #[serde(default)]
    include_content: bool,
}

// ─── Tools ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct Tools {
    tool_router: ToolRouter<Self>,
    state: AppState,
}

impl Tools {
    fn tool_error(msg: impl Into<String>) -> CallToolResult {
        let mut result = CallToolResult::success(vec![Content::text(msg.into())]);
        result.is_error = Some(true);
        result
    }

    fn tool_ok(value: &impl Serialize) -> CallToolResult {
        let json = serde_json::to_string_pretty(value).unwrap_or_default();
        CallToolResult::success(vec![Content::text(json)])
    }

    /// Operation failures are tool results, not protocol errors.
    fn respond<T: Serialize>(tool: &str, result: DeskflowResult<T>) -> Result<CallToolResult, McpError> {
        match result {
            Ok(value) => Ok(Self::tool_ok(&value)),
            Err(e) => {
                match &e {
                    DeskflowError::Validation(_) | DeskflowError::NotFound(_) => {
                        tracing::debug!(tool, error = %e, "tool rejected")
                    }
                    _ => tracing::warn!(tool, kind = e.kind(), error = %e, "tool failed"),
                }
                Ok(Self::tool_error(e.to_string()))
            }
        }
    }
}

// ─── Tool Implementations ────────────────────────────────────────────────────

#[tool_router]
impl Tools {
    fn new(state: AppState) -> Self {
        Self {
            tool_router: Self::tool_router(),
            state,
        }
    }

    // ── Workspaces ───────────────────────────────────────────────────────

    #[tool(description = "List all workspaces of the signed-in user.")]
    async fn list_workspaces(&self, Parameters(_): Parameters<NoParams>) -> Result<CallToolResult, McpError> {
        Self::respond("list_workspaces", self.state.list_workspaces().await)
    }

    #[tool(description = "Get a workspace by ID, including its theme configuration.")]
    async fn get_workspace(&self, Parameters(p): Parameters<WorkspaceIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("get_workspace", self.state.get_workspace(&p.workspace_id).await)
    }

    #[tool(description = "Get the default workspace of the signed-in user.")]
    async fn get_default_workspace(&self, Parameters(_): Parameters<NoParams>) -> Result<CallToolResult, McpError> {
        Self::respond("get_default_workspace", self.state.get_default_workspace().await)
    }

    #[tool(description = "Create a workspace.")]
    async fn create_workspace(&self, Parameters(p): Parameters<CreateWorkspace>) -> Result<CallToolResult, McpError> {
        Self::respond("create_workspace", self.state.create_workspace(p).await)
    }

    #[tool(description = "Update a workspace's name, description, default flag or theme.")]
    async fn update_workspace(&self, Parameters(p): Parameters<UpdateWorkspace>) -> Result<CallToolResult, McpError> {
        Self::respond("update_workspace", self.state.update_workspace(p).await)
    }

    #[tool(description = "Delete a workspace (soft delete).")]
    async fn delete_workspace(&self, Parameters(p): Parameters<WorkspaceIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("delete_workspace", self.state.delete_workspace(&p.workspace_id).await)
    }

    // ── Desktops ─────────────────────────────────────────────────────────

    #[tool(description = "List the desktops of a workspace, ordered by position.")]
    async fn list_desktops(&self, Parameters(p): Parameters<WorkspaceIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("list_desktops", self.state.list_desktops(&p.workspace_id).await)
    }

    #[tool(description = "Get a desktop by ID.")]
    async fn get_desktop(&self, Parameters(p): Parameters<DesktopIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("get_desktop", self.state.get_desktop(&p.desktop_id).await)
    }

    #[tool(description = "Get the root desktop (no parent) of a workspace.")]
    async fn get_root_desktop(&self, Parameters(p): Parameters<WorkspaceIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("get_root_desktop", self.state.get_root_desktop(&p.workspace_id).await)
    }

    #[tool(description = "Get the desktop tree of a workspace as a list with a level per desktop.")]
    async fn get_desktop_hierarchy(&self, Parameters(p): Parameters<HierarchyParams>) -> Result<CallToolResult, McpError> {
        Self::respond(
            "get_desktop_hierarchy",
            self.state.get_desktop_hierarchy(&p.workspace_id, p.max_depth).await,
        )
    }

    #[tool(description = "Get everything on a desktop: notes, folders and connections, with counts.")]
    async fn get_desktop_contents(&self, Parameters(p): Parameters<DesktopContentsParams>) -> Result<CallToolResult, McpError> {
        Self::respond(
            "get_desktop_contents",
            self.state.get_desktop_contents(&p.desktop_id, p.include_note_content).await,
        )
    }

    #[tool(description = "Create a desktop, optionally nested under a parent desktop.")]
    async fn create_desktop(&self, Parameters(p): Parameters<CreateDesktop>) -> Result<CallToolResult, McpError> {
        Self::respond("create_desktop", self.state.create_desktop(p).await)
    }

    #[tool(description = "Update a desktop. Pass parent_id \"null\" to make it a root desktop.")]
    async fn update_desktop(&self, Parameters(p): Parameters<UpdateDesktop>) -> Result<CallToolResult, McpError> {
        Self::respond("update_desktop", self.state.update_desktop(p).await)
    }

    #[tool(description = "Delete a desktop together with its notes, folders and connections.")]
    async fn delete_desktop(&self, Parameters(p): Parameters<DesktopIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("delete_desktop", self.state.delete_desktop(&p.desktop_id).await)
    }

    // ── Notes ────────────────────────────────────────────────────────────

    #[tool(description = "List the notes on a desktop (without content), ordered by z-index.")]
    async fn list_notes(&self, Parameters(p): Parameters<DesktopIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("list_notes", self.state.list_notes(&p.desktop_id).await)
    }

    #[tool(description = "Get a note by ID, including its content.")]
    async fn get_note(&self, Parameters(p): Parameters<NoteIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("get_note", self.state.get_note(&p.note_id).await)
    }

    #[tool(description = "Create a note on a desktop. It is placed above all existing notes.")]
    async fn create_note(&self, Parameters(p): Parameters<CreateNote>) -> Result<CallToolResult, McpError> {
        Self::respond("create_note", self.state.create_note(p).await)
    }

    #[tool(description = "Update a note's title, content, geometry, color, z-index or minimized state.")]
    async fn update_note(&self, Parameters(p): Parameters<UpdateNote>) -> Result<CallToolResult, McpError> {
        Self::respond("update_note", self.state.update_note(p).await)
    }

    #[tool(description = "Delete a note together with its assets and connections.")]
    async fn delete_note(&self, Parameters(p): Parameters<NoteIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("delete_note", self.state.delete_note(&p.note_id).await)
    }

    #[tool(description = "Move a note above every other note on its desktop.")]
    async fn bring_note_to_front(&self, Parameters(p): Parameters<NoteIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("bring_note_to_front", self.state.bring_note_to_front(&p.note_id).await)
    }

    #[tool(description = "Copy a note onto the same desktop, shifted by an offset.")]
    async fn duplicate_note(&self, Parameters(p): Parameters<DuplicateNoteParams>) -> Result<CallToolResult, McpError> {
        Self::respond(
            "duplicate_note",
            self.state.duplicate_note(&p.note_id, p.offset_x, p.offset_y).await,
        )
    }

    // ── Folders ──────────────────────────────────────────────────────────

    #[tool(description = "List the folders on a desktop.")]
    async fn list_folders(&self, Parameters(p): Parameters<DesktopIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("list_folders", self.state.list_folders(&p.desktop_id).await)
    }

    #[tool(description = "Get a folder by ID.")]
    async fn get_folder(&self, Parameters(p): Parameters<FolderIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("get_folder", self.state.get_folder(&p.folder_id).await)
    }

    #[tool(description = "Create a folder on a desktop that opens another desktop.")]
    async fn create_folder(&self, Parameters(p): Parameters<CreateFolder>) -> Result<CallToolResult, McpError> {
        Self::respond("create_folder", self.state.create_folder(p).await)
    }

    #[tool(description = "Update a folder. Empty icon or color clears it.")]
    async fn update_folder(&self, Parameters(p): Parameters<UpdateFolder>) -> Result<CallToolResult, McpError> {
        Self::respond("update_folder", self.state.update_folder(p).await)
    }

    #[tool(description = "Delete a folder. The target desktop is kept.")]
    async fn delete_folder(&self, Parameters(p): Parameters<FolderIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("delete_folder", self.state.delete_folder(&p.folder_id).await)
    }

    // ── Connections ──────────────────────────────────────────────────────

    #[tool(description = "List the connections between notes on a desktop.")]
    async fn list_connections(&self, Parameters(p): Parameters<DesktopIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("list_connections", self.state.list_connections(&p.desktop_id).await)
    }

    #[tool(description = "Get a connection by ID.")]
    async fn get_connection(&self, Parameters(p): Parameters<ConnectionIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("get_connection", self.state.get_connection(&p.connection_id).await)
    }

    #[tool(description = "Get the outgoing and incoming connections of a note.")]
    async fn get_note_connections(&self, Parameters(p): Parameters<NoteIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("get_note_connections", self.state.get_note_connections(&p.note_id).await)
    }

    #[tool(description = "Connect two notes on the same desktop with a directed line.")]
    async fn create_connection(&self, Parameters(p): Parameters<CreateConnection>) -> Result<CallToolResult, McpError> {
        Self::respond("create_connection", self.state.create_connection(p).await)
    }

    #[tool(description = "Change the color of a connection.")]
    async fn update_connection(&self, Parameters(p): Parameters<UpdateConnectionParams>) -> Result<CallToolResult, McpError> {
        Self::respond(
            "update_connection",
            self.state.update_connection(&p.connection_id, p.color).await,
        )
    }

    #[tool(description = "Delete a connection.")]
    async fn delete_connection(&self, Parameters(p): Parameters<ConnectionIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("delete_connection", self.state.delete_connection(&p.connection_id).await)
    }

    #[tool(description = "Delete every connection to or from a note.")]
    async fn delete_note_connections(&self, Parameters(p): Parameters<NoteIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("delete_note_connections", self.state.delete_note_connections(&p.note_id).await)
    }

    // ── Assets ───────────────────────────────────────────────────────────

    #[tool(description = "List the images attached to a note.")]
    async fn list_note_assets(&self, Parameters(p): Parameters<NoteIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("list_note_assets", self.state.list_note_assets(&p.note_id).await)
    }

    #[tool(description = "Get an asset by ID.")]
    async fn get_asset(&self, Parameters(p): Parameters<AssetIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("get_asset", self.state.get_asset(&p.asset_id).await)
    }

    #[tool(description = "Get the public URL of an asset.")]
    async fn get_asset_url(&self, Parameters(p): Parameters<AssetIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("get_asset_url", self.state.get_asset_url(&p.asset_id).await)
    }

    #[tool(description = "Upload a Base64 image (max 5MB) and attach it to a note.")]
    async fn upload_asset(&self, Parameters(p): Parameters<UploadAsset>) -> Result<CallToolResult, McpError> {
        Self::respond("upload_asset", self.state.upload_asset(p).await)
    }

    #[tool(description = "Move an asset inside its note.")]
    async fn update_asset_position(&self, Parameters(p): Parameters<AssetPositionParams>) -> Result<CallToolResult, McpError> {
        Self::respond(
            "update_asset_position",
            self.state.update_asset_position(&p.asset_id, p.position_x, p.position_y).await,
        )
    }

    #[tool(description = "Delete an asset and its stored file.")]
    async fn delete_asset(&self, Parameters(p): Parameters<AssetIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("delete_asset", self.state.delete_asset(&p.asset_id).await)
    }

    #[tool(description = "Delete every asset attached to a note.")]
    async fn delete_note_assets(&self, Parameters(p): Parameters<NoteIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("delete_note_assets", self.state.delete_note_assets(&p.note_id).await)
    }

    // ── Search & Aggregation ─────────────────────────────────────────────

    #[tool(description = "Search note titles and content across a workspace. Each result says whether the title or the content matched.")]
    async fn search_notes(&self, Parameters(p): Parameters<SearchNotes>) -> Result<CallToolResult, McpError> {
        Self::respond("search_notes", self.state.search_notes(p).await)
    }

    #[tool(description = "Search note titles and content on one desktop.")]
    async fn search_notes_in_desktop(&self, Parameters(p): Parameters<DesktopSearchParams>) -> Result<CallToolResult, McpError> {
        Self::respond(
            "search_notes_in_desktop",
            self.state.search_notes_in_desktop(&p.desktop_id, &p.query, p.limit).await,
        )
    }

    #[tool(description = "Most recently edited notes of a workspace.")]
    async fn get_recent_notes(&self, Parameters(p): Parameters<RecentNotesParams>) -> Result<CallToolResult, McpError> {
        Self::respond(
            "get_recent_notes",
            self.state.get_recent_notes(p.workspace_id.as_deref(), p.limit).await,
        )
    }

    #[tool(description = "Count desktops, notes, folders, connections and assets in a workspace.")]
    async fn get_workspace_stats(&self, Parameters(p): Parameters<WorkspaceIdParams>) -> Result<CallToolResult, McpError> {
        Self::respond("get_workspace_stats", self.state.get_workspace_stats(&p.workspace_id).await)
    }

    #[tool(description = "Find notes linked to a note within a number of hops, following connections in both directions.")]
    async fn find_connected_notes(&self, Parameters(p): Parameters<ConnectedNotesParams>) -> Result<CallToolResult, McpError> {
        Self::respond(
            "find_connected_notes",
            self.state.find_connected_notes(&p.note_id, p.depth).await,
        )
    }

    #[tool(description = "Get a whole workspace in one call: the desktop tree with notes and folders, plus stats.")]
    async fn get_workspace_index(&self, Parameters(p): Parameters<WorkspaceIndexParams>) -> Result<CallToolResult, McpError> {
        Self::respond(
            "get_workspace_index",
            self.state.get_workspace_index(p.workspace_id.as_deref(), p.include_content).await,
        )
    }
}

// ─── ServerHandler ───────────────────────────────────────────────────────────

#[tool_handler]
impl ServerHandler for Tools {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("DeskFlow workspace (inner).".to_string()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Wrapper that hides write tools in read-only mode.
pub struct McpServer {
    inner: Tools,
    allowed_tools: HashSet<String>,
    read_only: bool,
}

impl McpServer {
    pub fn new(state: AppState, read_only: bool) -> Self {
        let mut allowed: HashSet<String> = READ_TOOLS.iter().map(|s| s.to_string()).collect();
        if !read_only {
            allowed.extend(WRITE_TOOLS.iter().map(|s| s.to_string()));
        }
        Self {
            inner: Tools::new(state),
            allowed_tools: allowed,
            read_only,
        }
    }

    fn permits(&self, tool: &str) -> bool {
        self.allowed_tools.contains(tool)
    }

    fn prompts() -> Vec<Prompt> {
        catalog::PROMPTS
            .iter()
            .map(|p| {
                let args = p
                    .args
                    .iter()
                    .map(|a| PromptArgument {
                        name: a.name.to_string(),
                        title: None,
                        description: Some(a.description.to_string()),
                        required: Some(true),
                    })
                    .collect();
                Prompt::new(p.name, Some(p.description), Some(args))
            })
            .collect()
    }

    fn prompt(&self, request: &GetPromptRequestParams) -> Result<GetPromptResult, McpError> {
        let template = catalog::find_prompt(&request.name)
            .ok_or_else(|| McpError::invalid_params(format!("Unknown prompt '{}'", request.name), None))?;
        let text = template
            .render(request.arguments.as_ref())
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        Ok(GetPromptResult {
            description: Some(template.description.to_string()),
            messages: vec![PromptMessage::new_text(PromptMessageRole::User, text)],
        })
    }

    fn resources() -> Vec<Resource> {
        catalog::RESOURCES
            .iter()
            .map(|r| {
                let mut raw = RawResource::new(r.uri, r.name);
                raw.description = Some(r.description.to_string());
                raw.mime_type = Some("text/markdown".to_string());
                raw.no_annotation()
            })
            .collect()
    }

    fn resource(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        let text = catalog::read_resource(uri, &self.inner.state.settings, self.read_only)
            .map_err(|_| McpError::resource_not_found(format!("Unknown resource '{}'", uri), None))?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::TextResourceContents {
                uri: uri.to_string(),
                mime_type: Some("text/markdown".to_string()),
                text,
                meta: None,
            }],
        })
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        let mode = if self.read_only { "read-only" } else { "read-write" };
        ServerInfo {
            instructions: Some(format!(
                "DeskFlow workspace ({}). Workspaces contain nested desktops; desktops hold \
                 notes, folders and connections; notes hold image assets. \
                 Start with get_workspace_index for an overview.",
                mode
            )),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_prompts()
                .enable_resources()
                .build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        request: Option<PaginatedRequestParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let mut result = self.inner.list_tools(request, context).await?;
        result.tools.retain(|t| self.permits(t.name.as_ref()));
        Ok(result)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        if !self.permits(request.name.as_ref()) {
            return Ok(Tools::tool_error(format!(
                "Tool '{}' is not available in read-only mode",
                request.name
            )));
        }
        self.inner.call_tool(request, context).await
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        Ok(ListPromptsResult::with_all_items(Self::prompts()))
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        self.prompt(&request)
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult::with_all_items(Self::resources()))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        self.resource(&request.uri)
    }
}

// ─── Entry Point ─────────────────────────────────────────────────────────────

pub async fn run_mcp_server(state: AppState, read_only: bool) -> Result<(), String> {
    tracing::info!(read_only, "Starting MCP server on stdio");
    let server = McpServer::new(state, read_only);
    let service = server
        .serve(stdio())
        .await
        .map_err(|e| format!("MCP server error: {}", e))?;
    service
        .waiting()
        .await
        .map_err(|e| format!("MCP server terminated: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::db::memory::MemoryBackend;
    use crate::db::Table;

    const NOTE: &str = "33333333-3333-4333-8333-333333333301";

    fn tools() -> Tools {
        let mem = Arc::new(MemoryBackend::new());
        mem.seed(Table::Notes, vec![json!({"id": NOTE, "title": "Roadmap", "content": "ship it"})]);
        Tools::new(AppState::in_memory(mem))
    }

    fn text_of(result: &CallToolResult) -> String {
        serde_json::to_string(result).unwrap()
    }

    #[test]
    fn test_every_tool_is_classified_once() {
        let names: HashSet<String> = Tools::tool_router()
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        let read: HashSet<String> = READ_TOOLS.iter().map(|s| s.to_string()).collect();
        let write: HashSet<String> = WRITE_TOOLS.iter().map(|s| s.to_string()).collect();
        assert!(read.is_disjoint(&write));
        let classified: HashSet<String> = read.union(&write).cloned().collect();
        assert_eq!(names, classified);
    }

    #[test]
    fn test_read_only_hides_writers() {
        let server = McpServer::new(tools().state, true);
        assert!(server.permits("get_note"));
        assert!(server.permits("get_workspace_index"));
        assert!(!server.permits("create_note"));
        assert!(!server.permits("delete_workspace"));

        let rw = McpServer::new(tools().state, false);
        assert!(rw.permits("create_note"));
    }

    #[test]
    fn test_prompts_and_resources_are_listed() {
        let prompts: Vec<String> = McpServer::prompts().into_iter().map(|p| p.name).collect();
        assert_eq!(
            prompts,
            vec![
                "summarize_workspace",
                "organize_desktop",
                "find_related_notes",
                "create_note_from_conversation",
                "backup_workspace",
            ]
        );
        let uris: Vec<String> = McpServer::resources().into_iter().map(|r| r.raw.uri).collect();
        assert_eq!(
            uris,
            vec!["schema://deskflow", "schema://tables/workspaces", "schema://tables/notes", "config://app"]
        );

        let caps = McpServer::new(tools().state, true).get_info().capabilities;
        assert!(caps.prompts.is_some());
        assert!(caps.resources.is_some());
    }

    #[test]
    fn test_get_prompt_renders_arguments() {
        let server = McpServer::new(tools().state, false);
        let request = GetPromptRequestParams {
            meta: None,
            name: "organize_desktop".into(),
            arguments: json!({"desktop_name": "Ideas"}).as_object().cloned(),
        };
        let result = server.prompt(&request).unwrap();
        assert_eq!(result.messages.len(), 1);
        match &result.messages[0].content {
            PromptMessageContent::Text { text } => assert!(text.contains("\"Ideas\"")),
            other => panic!("expected text, got {:?}", other),
        }

        let missing = GetPromptRequestParams { meta: None, name: "organize_desktop".into(), arguments: None };
        assert!(server.prompt(&missing).is_err());
        let unknown = GetPromptRequestParams { meta: None, name: "nope".into(), arguments: None };
        assert!(server.prompt(&unknown).is_err());
    }

    #[test]
    fn test_read_resource() {
        let server = McpServer::new(tools().state, true);
        let result = server.resource("config://app").unwrap();
        let body = serde_json::to_string(&result).unwrap();
        assert!(body.contains("read-only"));
        assert!(server.resource("schema://tables/folders").is_err());
    }

    #[tokio::test]
    async fn test_tool_returns_json() {
        let t = tools();
        let result = t
            .get_note(Parameters(NoteIdParams { note_id: NOTE.into() }))
            .await
            .unwrap();
        assert_ne!(result.is_error, Some(true));
        assert!(text_of(&result).contains("Roadmap"));
    }

    #[tokio::test]
    async fn test_failures_become_error_results() {
        let t = tools();
        let bad = t
            .get_note(Parameters(NoteIdParams { note_id: "not-a-uuid".into() }))
            .await
            .unwrap();
        assert_eq!(bad.is_error, Some(true));
        assert!(text_of(&bad).contains("note_id must be a valid UUID"));

        let missing = t
            .get_note(Parameters(NoteIdParams { note_id: "99999999-9999-4999-8999-999999999999".into() }))
            .await
            .unwrap();
        assert_eq!(missing.is_error, Some(true));
        assert!(text_of(&missing).contains("Not found"));
    }
}
