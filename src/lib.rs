//! Categorize transactions into a tree of spending categories and keep that tree in a flat record
//! store, one tree per owner and period.
//!
//! - [`graph::GraphEngine`] holds one tree in memory and performs every edit on it.
//! - [`graph::decode`] and [`graph::encode`] convert between the tree and stored records.
//! - [`store::RecordStore`] is the storage seam, implemented by [`db::Db`] (SQLite) and
//!   [`store::MemoryStore`].
//! - [`sync::SyncAdapter`] loads a scope into an engine and saves it back.

pub mod args;
pub mod backup;
pub mod commands;
mod config;
pub mod db;
mod error;
pub mod graph;
pub mod model;
pub mod store;
pub mod sync;
mod utils;


pub use config::Config;
pub use error::{Error, GraphError, GraphResult, NodeKind, Result};
