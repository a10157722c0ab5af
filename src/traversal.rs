//! Bounded breadth-first search over note connections.
//!
//! Connections are directed, but reachability ignores direction: each round
//! follows edges whose `from` or `to` endpoint is in the frontier. Edges come back
//! with their stored direction.
//!
//! `Traversal` holds the bookkeeping and does no I/O. `find_connected_notes`
//! drives it against a backend, one round per hop.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::db::{Backend, Connection, Note, Query, Table};
use crate::error::{DeskflowError, DeskflowResult};

pub const DEFAULT_DEPTH: usize = 2;
pub const MAX_DEPTH: usize = 5;

const NOTE_COLUMNS: &str = "id, title, desktop_id";
const EDGE_COLUMNS: &str = "id, from_note_id, to_note_id, color";

// ---------------------------------------------------------------------------
// Bookkeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Traversal {
    visited: HashSet<String>,
    frontier: Vec<String>,
    seen_edges: HashSet<String>,
    edges: Vec<Connection>,
}

impl Traversal {
    pub fn new(start_id: &str) -> Self {
        Self {
            visited: HashSet::from([start_id.to_string()]),
            frontier: vec![start_id.to_string()],
            seen_edges: HashSet::new(),
            edges: Vec::new(),
        }
    }

    pub fn frontier(&self) -> &[String] {
        &self.frontier
    }

    pub fn is_exhausted(&self) -> bool {
        self.frontier.is_empty()
    }

    /// Take one round of edges. Returns the ids seen for the first time, in
    /// discovery order; they become the next frontier.
    pub fn absorb(&mut self, round: impl IntoIterator<Item = Connection>) -> Vec<String> {
        let mut fresh = Vec::new();
        for edge in round {
            if !self.seen_edges.insert(edge.id.clone()) {
                continue;
            }
            for endpoint in edge.endpoints() {
                if self.visited.insert(endpoint.to_string()) {
                    fresh.push(endpoint.to_string());
                }
            }
            self.edges.push(edge);
        }
        self.frontier = fresh.clone();
        fresh
    }

    pub fn visited(&self) -> usize {
        self.visited.len()
    }

    pub fn into_edges(self) -> Vec<Connection> {
        self.edges
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectedNotes {
    pub root: Note,
    pub connected_notes: Vec<Note>,
    pub connections: Vec<Connection>,
}

/// Clamp a caller's depth into `1..=MAX_DEPTH`.
pub fn clamp_depth(depth: Option<i64>) -> usize {
    match depth {
        Some(d) => d.clamp(1, MAX_DEPTH as i64) as usize,
        None => DEFAULT_DEPTH,
    }
}

/// Reorder `notes` to follow `ids`. Rows the backend did not return are skipped.
fn in_discovery_order(notes: Vec<Note>, ids: &[String]) -> Vec<Note> {
    let mut by_id: HashMap<String, Note> = notes.into_iter().map(|n| (n.id.clone(), n)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

/// Notes reachable from `note_id` within `depth` hops, plus the edges walked.
pub async fn find_connected_notes(
    backend: &dyn Backend,
    note_id: &str,
    depth: usize,
) -> DeskflowResult<ConnectedNotes> {
    let root: Note = backend
        .fetch_first(&Query::new(Table::Notes, NOTE_COLUMNS).eq("id", note_id))
        .await?
        .ok_or_else(|| DeskflowError::NotFound(format!("Note {} not found", note_id)))?;

    let mut walk = Traversal::new(note_id);
    let mut connected = Vec::new();

    for _ in 0..depth {
        if walk.is_exhausted() {
            break;
        }
        let frontier = walk.frontier().to_vec();
        let outgoing = Query::new(Table::Connections, EDGE_COLUMNS).in_list("from_note_id", &frontier);
        let incoming = Query::new(Table::Connections, EDGE_COLUMNS).in_list("to_note_id", &frontier);
        let (out_edges, in_edges) = futures::try_join!(
            backend.fetch_as::<Connection>(&outgoing),
            backend.fetch_as::<Connection>(&incoming),
        )?;

        let fresh = walk.absorb(out_edges.into_iter().chain(in_edges));
        if fresh.is_empty() {
            continue;
        }
        let notes: Vec<Note> = backend
            .fetch_as(&Query::new(Table::Notes, NOTE_COLUMNS).in_list("id", &fresh))
            .await?;
        connected.extend(in_discovery_order(notes, &fresh));
    }

    tracing::debug!(note_id, depth, visited = walk.visited(), "connected notes walk done");
    Ok(ConnectedNotes {
        root,
        connected_notes: connected,
        connections: walk.into_edges(),
    })
}
