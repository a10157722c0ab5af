//! DeskFlow gateway: MCP tools and a REST API over a PostgREST/Supabase note store.
//!
//! Workspaces hold a tree of desktops; desktops hold notes, folders and
//! connections; notes hold image assets. Besides plain CRUD the crate assembles
//! flat backend rows into larger shapes: the workspace index tree, leveled
//! desktop hierarchies, connected-note walks, stats and merged search results.

pub mod app_state;
pub mod auth;
pub mod catalog;
pub mod commands;
pub mod db;
pub mod dedup;
pub mod error;
pub mod hierarchy;
pub mod http_server;
pub mod index;
pub mod logging;
#[cfg(feature = "mcp")]
pub mod mcp;
pub mod rate_limit;
pub mod remote_client;
pub mod settings;
pub mod stats;
pub mod traversal;
pub mod utils;

pub use app_state::AppState;
pub use error::{DeskflowError, DeskflowResult};
pub use settings::Settings;
