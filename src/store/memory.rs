//! Implements the `RecordStore` trait by holding records in memory.

use crate::error::{GraphError, GraphResult};
use crate::model::{RecordId, Scope, StoredRecord};
use crate::store::{ChangeSet, ChangeSummary, RecordStore};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::trace;

/// A `RecordStore` that keeps records in a map. Each write either completes or, on failure,
/// leaves the map exactly as it was.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_writes: AtomicBool,
}

#[derive(Debug, Default)]
struct State {
    next_id: RecordId,
    records: BTreeMap<RecordId, StoredRecord>,
}

impl State {
    fn allocate(&mut self) -> RecordId {
        self.next_id += 1;
        self.next_id
    }

    fn insert(&mut self, mut record: StoredRecord) -> RecordId {
        let id = self.allocate();
        record.id = Some(id);
        trace!("Inserting record {id}");
        self.records.insert(id, record);
        id
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `records`. Their ids are replaced with fresh ones.
    pub async fn with_records(records: Vec<StoredRecord>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock().await;
            for record in records {
                state.insert(record);
            }
        }
        store
    }

    /// While set, every write fails with `StorageFailure` and changes nothing.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The number of records across every scope.
    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_writable(&self) -> GraphResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GraphError::StorageFailure(anyhow::anyhow!(
                "The in-memory store is refusing writes"
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn insert_batch(&self, records: Vec<StoredRecord>) -> GraphResult<Vec<RecordId>> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        Ok(records.into_iter().map(|r| state.insert(r)).collect())
    }

    async fn query_by_scope(&self, scope: &Scope) -> GraphResult<Vec<StoredRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .values()
            .filter(|r| r.in_scope(scope))
            .cloned()
            .collect())
    }

    async fn delete_by_id(&self, id: RecordId) -> GraphResult<()> {
        self.check_writable()?;
        self.state.lock().await.records.remove(&id);
        Ok(())
    }

    async fn upsert_by_identity(&self, record: StoredRecord) -> GraphResult<RecordId> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        match record.id {
            Some(id) => {
                state.next_id = state.next_id.max(id);
                state.records.insert(id, record);
                Ok(id)
            }
            None => Ok(state.insert(record)),
        }
    }

    async fn apply(&self, changes: ChangeSet) -> GraphResult<ChangeSummary> {
        self.check_writable()?;
        let mut state = self.state.lock().await;

        // Validate everything first so that a failure leaves the map untouched
        let deleted: BTreeSet<RecordId> = changes
            .deletes
            .iter()
            .copied()
            .filter(|id| state.records.contains_key(id))
            .collect();
        for record in &changes.updates {
            match record.id {
                Some(id) if state.records.contains_key(&id) && !deleted.contains(&id) => {}
                Some(id) => {
                    return Err(GraphError::StorageFailure(anyhow::anyhow!(
                        "Unable to update record {id} because it does not exist"
                    )))
                }
                None => {
                    return Err(GraphError::StorageFailure(anyhow::anyhow!(
                        "Unable to update a record that has no id"
                    )))
                }
            }
        }

        for id in &deleted {
            state.records.remove(id);
        }
        let updated = changes.updates.len();
        for record in changes.updates {
            if let Some(id) = record.id {
                state.records.insert(id, record);
            }
        }
        let inserted = changes.inserts.len();
        for record in changes.inserts {
            state.insert(record);
        }

        Ok(ChangeSummary {
            deleted: deleted.len(),
            updated,
            inserted,
        })
    }

    async fn periods(&self, owner: &str) -> GraphResult<Vec<String>> {
        let state = self.state.lock().await;
        let periods: BTreeSet<&str> = state
            .records
            .values()
            .filter(|r| r.owner == owner)
            .map(|r| r.period.as_str())
            .collect();
        Ok(periods.into_iter().map(String::from).collect())
    }

    async fn clear_scope(&self, scope: &Scope) -> GraphResult<usize> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        let before = state.records.len();
        state.records.retain(|_, r| !r.in_scope(scope));
        Ok(before - state.records.len())
    }
}
