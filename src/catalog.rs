//! Prompt templates and reference documents offered to assistant hosts.
//!
//! Prompts are workflows phrased in terms of the tool names; resources describe
//! the data model and the limits this build enforces.

use serde_json::{Map, Value};

use crate::commands::{CONTENT_MAX, DEFAULT_COLOR, MAX_UPLOAD_BYTES, QUERY_MAX, TITLE_MAX};
use crate::error::{DeskflowError, DeskflowResult};
use crate::settings::Settings;

pub struct PromptArg {
    pub name: &'static str,
    pub description: &'static str,
}

pub struct PromptTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub args: &'static [PromptArg],
    body: &'static str,
}

pub struct ResourceDoc {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const PROMPTS: &[PromptTemplate] = &[
    PromptTemplate {
        name: "summarize_workspace",
        description: "Summarize the structure, content and connections of a workspace",
        args: &[PromptArg { name: "workspace_name", description: "Name of the workspace to analyze" }],
        body: r#"Analyze the DeskFlow workspace "{workspace_name}" and report:

1. Overview: desktop count and nesting depth, totals of notes, folders and connections, latest activity.
2. Content: main themes, the largest or most central notes, patterns in note titles.
3. Connections: the most connected notes, clusters of related notes, links that seem to be missing.
4. Recommendations: organization changes, notes to merge or split, areas worth documenting further.

Start with list_workspaces to find the workspace, then get_workspace_index for the whole tree.
Use get_workspace_stats, search_notes and find_connected_notes for detail."#,
    },
    PromptTemplate {
        name: "organize_desktop",
        description: "Suggest a better layout and grouping for one desktop",
        args: &[PromptArg { name: "desktop_name", description: "Name of the desktop to organize" }],
        body: r#"Review the desktop "{desktop_name}" and propose a better organization:

1. Current state: every note with its position, notes that overlap or crowd each other, existing connections.
2. Proposal: group notes by topic, give each note a target position, suggest new connections.
3. Structure: notes that belong on a sub-desktop, folders worth adding, titles worth rewording.
4. Apply only after the user approves: update_note for positions, create_connection for links, create_folder for folders.

Read the desktop with get_desktop_contents and include_note_content set to true."#,
    },
    PromptTemplate {
        name: "find_related_notes",
        description: "Find notes related to a given note and propose connections",
        args: &[PromptArg { name: "note_title", description: "Title of the starting note" }],
        body: r#"Find notes related to "{note_title}":

1. Locate the note with search_notes, then read it with get_note.
2. Search for its key terms with search_notes to find notes on similar topics.
3. Inspect existing links with get_note_connections and walk the graph with find_connected_notes.
4. List notes that should be connected but are not, each with a reason, most relevant first.
5. Create the approved links with create_connection."#,
    },
    PromptTemplate {
        name: "create_note_from_conversation",
        description: "Capture the current conversation as a note on a desktop",
        args: &[
            PromptArg { name: "desktop_name", description: "Name of the desktop that receives the note" },
            PromptArg { name: "topic", description: "Topic or working title of the note" },
        ],
        body: r#"Create a note on the desktop "{desktop_name}" about "{topic}":

1. Find the desktop with list_desktops and read it with get_desktop_contents.
2. Pick a position that does not overlap existing notes.
3. Summarize the key points of this conversation about "{topic}" in clear sections; keep code blocks formatted.
4. Call create_note with a descriptive title, the summary, the chosen position and a fitting color.
5. If related notes exist, propose connections and create them once the user agrees.

The content should read well both as plain text and as simple HTML."#,
    },
    PromptTemplate {
        name: "backup_workspace",
        description: "Produce a read-only JSON backup of a workspace",
        args: &[PromptArg { name: "workspace_name", description: "Name of the workspace to back up" }],
        body: r#"Produce a backup of the workspace "{workspace_name}":

1. Collect: get_workspace_index with include_content set to true, then list_note_assets for each note.
2. Build readable JSON with metadata (date, user) and every id preserved so relations survive.
3. Summarize the number of items and the approximate size. Assets are referenced by URL, not embedded.
4. Show the JSON, or store it as a note titled "BACKUP_<date>" if the user asks.

This workflow only reads data."#,
    },
];

pub const RESOURCES: &[ResourceDoc] = &[
    ResourceDoc {
        uri: "schema://deskflow",
        name: "DeskFlow data model",
        description: "Entity hierarchy, tables, cascades and access rules",
    },
    ResourceDoc {
        uri: "schema://tables/workspaces",
        name: "workspaces table",
        description: "Columns and indexes of workspaces",
    },
    ResourceDoc {
        uri: "schema://tables/notes",
        name: "notes table",
        description: "Columns and indexes of notes",
    },
    ResourceDoc {
        uri: "config://app",
        name: "Gateway configuration",
        description: "Limits and defaults enforced by this server",
    },
];

const DATA_MODEL: &str = r#"# DeskFlow data model

```
User
└── Workspaces
    └── Desktops (nested through parent_id, null = root)
        ├── Notes
        │   └── Assets (images in the `assets` storage bucket)
        ├── Folders (links to another desktop)
        └── Connections (directed lines between two notes)
```

## workspaces
id, user_id, name (max 100), description, is_default, theme_config (JSON),
created_at, updated_at, deleted_at (soft delete)

## desktops
id, workspace_id, parent_id (null = root), name (max 100), position_order,
created_at, updated_at

## notes
id, desktop_id, title (max 200), content (text or HTML), position_x, position_y,
width, height, color, z_index, minimized, created_at, updated_at

## assets
id, note_id, storage_path, original_name, mime_type, width, height,
position_x, position_y, created_at

## folders
id, desktop_id (where it is drawn), target_desktop_id (where it leads),
name (max 100), position_x, position_y, icon, color, created_at

## connections
id, desktop_id, from_note_id, to_note_id, color, created_at

## Cascades
Deleting a desktop removes its notes, folders and connections. Deleting a note
removes its assets and every connection touching it. Workspaces are soft deleted.

## Access
Row level security limits every table to the rows of the signed-in user.
"#;

const WORKSPACES_TABLE: &str = r#"# workspaces

| Column | Type | Required | Notes |
|--------|------|----------|-------|
| id | uuid | auto | primary key |
| user_id | uuid | yes | owner |
| name | varchar(100) | yes | |
| description | text | no | |
| is_default | boolean | yes | the user's main workspace |
| theme_config | jsonb | no | |
| created_at | timestamptz | auto | |
| updated_at | timestamptz | auto | |
| deleted_at | timestamptz | no | set by soft delete |

Indexes: primary key (id), (user_id), unique (user_id, name) where deleted_at is null.
"#;

const NOTES_TABLE: &str = r#"# notes

| Column | Type | Required | Notes |
|--------|------|----------|-------|
| id | uuid | auto | primary key |
| desktop_id | uuid | yes | containing desktop |
| title | varchar(200) | yes | |
| content | text | no | plain text or HTML |
| position_x | integer | yes | canvas x |
| position_y | integer | yes | canvas y |
| width | integer | yes | |
| height | integer | yes | |
| color | varchar(7) | no | #RRGGBB |
| z_index | integer | yes | stacking order |
| minimized | boolean | yes | |
| created_at | timestamptz | auto | |
| updated_at | timestamptz | auto | |

Indexes: primary key (id), (desktop_id), (updated_at).
Deleting the desktop deletes its notes; deleting a note deletes its assets and connections.
"#;

pub fn find_prompt(name: &str) -> Option<&'static PromptTemplate> {
    PROMPTS.iter().find(|p| p.name == name)
}

impl PromptTemplate {
    /// Fill every `{arg}` placeholder. All arguments are required.
    pub fn render(&self, args: Option<&Map<String, Value>>) -> DeskflowResult<String> {
        let mut text = self.body.to_string();
        for arg in self.args {
            let value = args
                .and_then(|a| a.get(arg.name))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    DeskflowError::Validation(format!("Prompt '{}' needs argument '{}'", self.name, arg.name))
                })?;
            text = text.replace(&format!("{{{}}}", arg.name), value);
        }
        Ok(text)
    }
}

fn app_config(settings: &Settings, read_only: bool) -> String {
    format!(
        "# DeskFlow gateway configuration\n\n\
         - Version: {version}\n\
         - Backend: {backend}\n\
         - Mode: {mode}\n\n\
         ## Limits\n\
         - Note title: {title} characters\n\
         - Note content: {content} characters\n\
         - Search query: {query} characters\n\
         - Asset upload: {upload} MB, images only\n\
         - Reads per minute: {reads}\n\
         - Writes per minute: {writes}\n\n\
         ## Defaults\n\
         - Note and connection color: {color}\n\
         - Storage bucket: assets\n\
         - Deleting a missing row: {deletes}\n",
        version = env!("CARGO_PKG_VERSION"),
        backend = settings.supabase_url,
        mode = if read_only { "read-only" } else { "read-write" },
        title = TITLE_MAX,
        content = CONTENT_MAX,
        query = QUERY_MAX,
        upload = MAX_UPLOAD_BYTES / (1024 * 1024),
        reads = settings.rate_limit_read,
        writes = settings.rate_limit_write,
        color = DEFAULT_COLOR,
        deletes = if settings.strict_deletes { "not found error" } else { "succeeds" },
    )
}

/// Markdown body of a resource.
pub fn read_resource(uri: &str, settings: &Settings, read_only: bool) -> DeskflowResult<String> {
    match uri {
        "schema://deskflow" => Ok(DATA_MODEL.to_string()),
        "schema://tables/workspaces" => Ok(WORKSPACES_TABLE.to_string()),
        "schema://tables/notes" => Ok(NOTES_TABLE.to_string()),
        "config://app" => Ok(app_config(settings, read_only)),
        other => Err(DeskflowError::NotFound(format!("Resource {}", other))),
    }
}
