//! DeskFlow CLI - MCP server launcher and read-only workspace queries
//!
//! Usage: deskflow-cli [OPTIONS] <COMMAND>
//!
//! Every query command prints JSON, so the output can be piped into jq.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use deskflow_lib::logging::init_tracing;
use deskflow_lib::{commands::SearchNotes, AppState, Settings};
use serde::Serialize;

// ============================================================================
// Main CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "deskflow-cli")]
#[command(version, about = "DeskFlow workspace CLI", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file (default: <config dir>/deskflow/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Refresh token to act as (default: USER_REFRESH_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Single-line JSON instead of pretty output
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[cfg(feature = "mcp")]
    /// Start the MCP server for an assistant host
    McpServer {
        /// Use stdio transport (required)
        #[arg(long)]
        stdio: bool,
        /// Hide and refuse every tool that writes
        #[arg(long)]
        read_only: bool,
    },
    /// Whole workspace: desktop tree, notes, folders and stats
    Index {
        /// Workspace UUID (default: your default workspace)
        #[arg(long)]
        workspace: Option<String>,
        /// Include note content
        #[arg(long)]
        content: bool,
    },
    /// Search note titles and content
    Search {
        /// Text to look for
        query: String,
        /// Workspace UUID
        #[arg(long)]
        workspace: String,
        /// Maximum results (1-100)
        #[arg(long)]
        limit: Option<i64>,
        /// Include note content
        #[arg(long)]
        content: bool,
    },
    /// Entity counts of a workspace
    Stats {
        /// Workspace UUID
        workspace: String,
    },
    /// Notes reachable from a note through connections
    Connected {
        /// Note UUID to start from
        note: String,
        /// Hops to follow (1-5)
        #[arg(long)]
        depth: Option<i64>,
    },
    /// Desktop tree of a workspace as a leveled list
    Hierarchy {
        /// Workspace UUID
        workspace: String,
        /// Deepest level to include
        #[arg(long)]
        max_depth: Option<i64>,
    },
    /// Recently edited notes
    Recent {
        /// Workspace UUID (default: your default workspace)
        #[arg(long)]
        workspace: Option<String>,
        /// Maximum results (1-50)
        #[arg(long)]
        limit: Option<i64>,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() {
    // Exit cleanly on broken pipe (`deskflow-cli index | head`) instead of panicking.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if info.to_string().contains("Broken pipe") {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run_cli(cli).await {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_json(value: &impl Serialize, compact: bool) -> Result<(), String> {
    let out = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    println!("{}", out.map_err(|e| format!("Failed to encode output: {}", e))?);
    Ok(())
}

async fn run_cli(cli: Cli) -> Result<(), String> {
    let settings = Settings::load(cli.config.as_deref()).map_err(|e| e.to_string())?;
    settings.validate(false).map_err(|e| e.to_string())?;

    let token = cli
        .token
        .clone()
        .or_else(|| settings.user_refresh_token.clone())
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| "No refresh token: pass --token or set USER_REFRESH_TOKEN".to_string())?;

    let settings = Arc::new(settings);
    let limiter = AppState::limiter_for(&settings);
    let state = AppState::connect(settings, limiter, &token).map_err(|e| e.to_string())?;
    let compact = cli.compact;

    match cli.command {
        #[cfg(feature = "mcp")]
        Commands::McpServer { stdio, read_only } => {
            if !stdio {
                return Err("Only --stdio transport is currently supported".to_string());
            }
            state
                .verify_session()
                .await
                .map_err(|e| format!("Authentication failed: {}", e))?;
            deskflow_lib::mcp::run_mcp_server(state, read_only).await
        }
        Commands::Index { workspace, content } => {
            let index = state
                .get_workspace_index(workspace.as_deref(), content)
                .await
                .map_err(|e| e.to_string())?;
            print_json(&index, compact)
        }
        Commands::Search { query, workspace, limit, content } => {
            let results = state
                .search_notes(SearchNotes { workspace_id: workspace, query, limit, include_content: content })
                .await
                .map_err(|e| e.to_string())?;
            print_json(&serde_json::json!({"count": results.len(), "results": results}), compact)
        }
        Commands::Stats { workspace } => {
            let stats = state.get_workspace_stats(&workspace).await.map_err(|e| e.to_string())?;
            print_json(&stats, compact)
        }
        Commands::Connected { note, depth } => {
            let found = state.find_connected_notes(&note, depth).await.map_err(|e| e.to_string())?;
            print_json(&found, compact)
        }
        Commands::Hierarchy { workspace, max_depth } => {
            let rows = state
                .get_desktop_hierarchy(&workspace, max_depth)
                .await
                .map_err(|e| e.to_string())?;
            print_json(&rows, compact)
        }
        Commands::Recent { workspace, limit } => {
            let notes = state
                .get_recent_notes(workspace.as_deref(), limit)
                .await
                .map_err(|e| e.to_string())?;
            print_json(&serde_json::json!({"count": notes.len(), "notes": notes}), compact)
        }
    }
}
