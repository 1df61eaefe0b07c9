//! Loads trees from a `RecordStore` and saves them back.
//!
//! A scope is either not loaded, or loaded as a [`ScopedGraph`] that is `Clean` (matches what
//! was last loaded or saved) or `Dirty` (edited since). Each `load` returns an independent copy.
//! Saves for the same scope through one `SyncAdapter` are queued, never interleaved. Two
//! adapters, or two graphs of the same scope saved one after the other, follow last writer wins.

mod plan;

pub use plan::SavePlan;

use crate::error::{GraphError, GraphResult};
use crate::graph::{codec, GraphEngine};
use crate::model::{Scope, StoredRecord};
use crate::store::{ChangeSet, ChangeSummary, RecordStore};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Clean,
    Dirty,
}

impl Display for SyncState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Clean => f.write_str("clean"),
            SyncState::Dirty => f.write_str("dirty"),
        }
    }
}

/// A loaded tree together with the scope it belongs to.
#[derive(Debug, Clone)]
pub struct ScopedGraph {
    scope: Scope,
    engine: GraphEngine,
    saved_revision: u64,
}

impl ScopedGraph {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn engine(&self) -> &GraphEngine {
        &self.engine
    }

    /// Mutable access for edits. Any successful edit makes the graph `Dirty`.
    pub fn engine_mut(&mut self) -> &mut GraphEngine {
        &mut self.engine
    }

    pub fn state(&self) -> SyncState {
        if self.engine.revision() == self.saved_revision {
            SyncState::Clean
        } else {
            SyncState::Dirty
        }
    }

    pub fn into_engine(self) -> GraphEngine {
        self.engine
    }
}

/// The single entry point for loading and saving trees.
pub struct SyncAdapter<S> {
    store: Arc<S>,
    save_locks: Mutex<HashMap<Scope, Arc<Mutex<()>>>>,
}

impl<S> SyncAdapter<S>
where
    S: RecordStore,
{
    pub fn new(store: S) -> Self {
        Self::from_arc(Arc::new(store))
    }

    pub fn from_arc(store: Arc<S>) -> Self {
        Self {
            store,
            save_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reads every record of `scope` and builds a `Clean` tree from them, with each node's
    /// current name recorded as its persisted baseline.
    ///
    /// # Errors
    /// - `StorageFailure` when the store cannot be read.
    /// - `CorruptSnapshot` when the records cannot form a tree.
    pub async fn load(&self, scope: Scope) -> GraphResult<ScopedGraph> {
        let records = self.store.query_by_scope(&scope).await?;
        let mut engine = codec::decode(&records)?.into_engine()?;
        engine.mark_persisted();
        debug!(
            "Loaded {} record(s) for {scope} into {} node(s)",
            records.len(),
            engine.len()
        );
        Ok(ScopedGraph {
            saved_revision: engine.revision(),
            scope,
            engine,
        })
    }

    /// Makes the stored records of the graph's scope match the graph.
    ///
    /// The writes are worked out by [`SavePlan`] and applied in one atomic unit. Renamed nodes
    /// have their old `(name, index)` record deleted, and the records of deleted nodes are
    /// removed. Only when the store accepts the writes does the graph become `Clean`, with every
    /// node's baseline moved to its current name. On error the graph is unchanged and still
    /// `Dirty`, and saving again is safe.
    pub async fn save(&self, graph: &mut ScopedGraph) -> GraphResult<ChangeSummary> {
        let lock = self.save_lock(&graph.scope).await;
        let _guard = lock.lock().await;

        let stored = self.store.query_by_scope(&graph.scope).await?;
        let encoded = codec::encode_engine(&graph.scope, &graph.engine);
        let plan = SavePlan::new(stored, encoded);
        debug!(
            "Save plan for {}: {} delete(s), {} update(s), {} insert(s), {} rename(s), {} unchanged",
            graph.scope,
            plan.changes.deletes.len(),
            plan.changes.updates.len(),
            plan.changes.inserts.len(),
            plan.renamed,
            plan.unchanged
        );

        let summary = if plan.is_noop() {
            ChangeSummary::default()
        } else {
            self.store.apply(plan.changes).await?
        };

        graph.engine.mark_persisted();
        graph.saved_revision = graph.engine.revision();
        info!(
            "Saved {}: {} deleted, {} updated, {} inserted",
            graph.scope, summary.deleted, summary.updated, summary.inserted
        );
        Ok(summary)
    }

    /// The periods of `owner` that hold records, sorted.
    pub async fn periods(&self, owner: &str) -> GraphResult<Vec<String>> {
        self.store.periods(owner).await
    }

    /// The raw stored records of `scope`, sorted by id.
    pub async fn snapshot(&self, scope: &Scope) -> GraphResult<Vec<StoredRecord>> {
        let mut records = self.store.query_by_scope(scope).await?;
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    /// Replaces every record of `scope` with `records`, which are moved into `scope` and given
    /// fresh ids.
    ///
    /// # Errors
    /// - `CorruptSnapshot` when `records` cannot form a tree. Nothing is written.
    /// - `StorageFailure` when the store fails. Nothing is written.
    pub async fn restore(
        &self,
        scope: &Scope,
        records: Vec<StoredRecord>,
    ) -> GraphResult<ChangeSummary> {
        codec::decode(&records)?.into_engine().map_err(|e| match e {
            GraphError::CorruptSnapshot(msg) => {
                GraphError::corrupt(format!("unable to restore {scope}: {msg}"))
            }
            other => other,
        })?;

        let lock = self.save_lock(scope).await;
        let _guard = lock.lock().await;

        let existing = self.store.query_by_scope(scope).await?;
        let inserts = records
            .into_iter()
            .map(|record| StoredRecord {
                id: None,
                owner: scope.owner().to_string(),
                period: scope.period().to_string(),
                ..record
            })
            .collect();
        let changes = ChangeSet {
            deletes: existing.into_iter().filter_map(|r| r.id).collect(),
            updates: Vec::new(),
            inserts,
        };
        let summary = self.store.apply(changes).await?;
        info!(
            "Restored {scope}: replaced {} record(s) with {}",
            summary.deleted, summary.inserted
        );
        Ok(summary)
    }

    /// Deletes every stored record of `scope` and returns how many were removed. Waits for any
    /// save of the same scope to finish first.
    pub async fn clear(&self, scope: &Scope) -> GraphResult<usize> {
        let lock = self.save_lock(scope).await;
        let _guard = lock.lock().await;

        let removed = self.store.clear_scope(scope).await?;
        info!("Cleared {scope}: {removed} record(s) deleted");
        Ok(removed)
    }

    /// The lock serializing writes to `scope`.
    ///
    /// Locks that nobody holds or waits on are dropped first, so the map only holds scopes with
    /// a write in flight plus the one being asked for.
    async fn save_lock(&self, scope: &Scope) -> Arc<Mutex<()>> {
        let mut locks = self.save_locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(scope.clone()).or_default().clone()
    }
}
