//! Command handlers for the expenses CLI.
//!
//! This module contains implementations for all CLI subcommands. Every command that changes the
//! tree follows the same path: load the scope, apply one engine operation, take a `pre-save`
//! backup of the stored records and save.

mod delete;
mod init;
mod insert;
mod query;
mod sync;
mod update;

use crate::backup::{ScopeSnapshot, PRE_SAVE};
use crate::db::Db;
use crate::error::GraphResult;
use crate::graph::GraphEngine;
use crate::model::Scope;
use crate::store::ChangeSummary;
use crate::sync::{SyncAdapter, SyncState};
use crate::{Config, Result};
use anyhow::bail;
use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, info};

pub use delete::{clear, delete, delete_category};
pub use init::init;
pub use insert::{add, import, ImportRow, Imported};
pub use query::{periods, show};
pub use sync::{export, restore};
pub use update::{edit, move_category, rename_category};

/// The output type for a command. This allows the command to return a consistent message and,
/// optionally, structured data.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// A message that can be printed to the user regarding the outcome of the command execution.
    message: String,

    /// Any structured data that needs to be output from the call.
    structure: Option<T>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// Create a new `Out` object that has `Some(structure)`.
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
        }
    }

    /// Create a new `Out` object that has `None` for `structure`.
    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    /// Print the message to `info!` and the structured data (if it exists) as JSON to `debug!`.
    pub fn print(&self) {
        info!("{}", self.message);
        if let Some(structure) = self.structure() {
            if let Ok(json) = serde_json::to_string_pretty(structure) {
                debug!("Command output:\n\n{json}\n\n");
            }
        }
    }
}

/// Works out which tree a command operates on. An explicit `owner` wins over the configured
/// `default_owner`.
///
/// # Errors
/// - When neither an owner nor a default owner is available.
pub fn resolve_scope(config: &Config, owner: Option<&str>, period: &str) -> Result<Scope> {
    let owner = match owner.or(config.default_owner()) {
        Some(owner) if !owner.trim().is_empty() => owner.trim(),
        _ => bail!(
            "No owner given. Pass --owner, set EXPENSES_OWNER or set default_owner in '{}'",
            config.config_path().display()
        ),
    };
    Ok(Scope::new(owner, period))
}

fn adapter(config: &Config) -> SyncAdapter<Db> {
    SyncAdapter::new(config.db().clone())
}

/// Loads the tree of `scope`, runs `edit` against it and saves the result.
///
/// When `edit` changed the tree and the scope already has stored records, those records are
/// written to a `pre-save` backup before the save.
async fn load_edit_save<T, F>(config: &Config, scope: &Scope, edit: F) -> Result<(T, ChangeSummary)>
where
    F: FnOnce(&mut GraphEngine) -> GraphResult<T>,
{
    let adapter = adapter(config);
    let mut graph = adapter.load(scope.clone()).await?;
    let value = edit(graph.engine_mut())?;
    if graph.state() == SyncState::Clean {
        debug!("Nothing changed in {scope}, skipping save");
        return Ok((value, ChangeSummary::default()));
    }

    let records = adapter.snapshot(scope).await?;
    if !records.is_empty() {
        let path = config
            .backup()
            .save_snapshot(PRE_SAVE, &ScopeSnapshot::new(scope, records))
            .await?;
        debug!("Backed up {scope} to {}", path.display());
    }

    let summary = adapter.save(&mut graph).await?;
    Ok((value, summary))
}
