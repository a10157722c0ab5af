mod backend;
mod models;
mod query;
#[cfg(test)]
pub(crate) mod memory;

pub use backend::{Backend, BackendFuture};
pub use models::{Asset, Connection, Desktop, Folder, Note, Workspace};
pub use query::{Filter, Order, Query, Table};
