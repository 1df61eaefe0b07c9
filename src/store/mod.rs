//! Durable keyed storage of flat records, partitioned by owner and period.
//!
//! Two backends implement [`RecordStore`]: [`crate::db::Db`] keeps records in SQLite and
//! [`MemoryStore`] keeps them in memory.

mod memory;

pub use memory::MemoryStore;

use crate::error::GraphResult;
use crate::model::{RecordId, Scope, StoredRecord};
use serde::Serialize;

/// A set of writes applied as one atomic unit by [`RecordStore::apply`].
///
/// Deletes run first, then updates, then inserts.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ChangeSet {
    /// Ids to delete. Ids that no longer exist are skipped.
    pub deletes: Vec<RecordId>,
    /// Records replacing the stored record with the same id. Each must carry an id.
    pub updates: Vec<StoredRecord>,
    /// Records to add. Any id they carry is ignored.
    pub inserts: Vec<StoredRecord>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.updates.is_empty() && self.inserts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deletes.len() + self.updates.len() + self.inserts.len()
    }
}

/// How many records an applied [`ChangeSet`] touched.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
pub struct ChangeSummary {
    pub deleted: usize,
    pub updated: usize,
    pub inserted: usize,
}

impl ChangeSummary {
    pub fn is_empty(&self) -> bool {
        self.deleted == 0 && self.updated == 0 && self.inserted == 0
    }
}

/// The operations the sync adapter needs from durable storage.
///
/// Every method that writes is all-or-nothing: on `Err` nothing it was asked to do has been
/// persisted. I/O problems are reported as [`crate::GraphError::StorageFailure`].
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Adds all `records` or none of them. Returns the assigned ids in input order.
    async fn insert_batch(&self, records: Vec<StoredRecord>) -> GraphResult<Vec<RecordId>>;

    /// Every record, of both kinds, stored under `scope`, in no particular order.
    async fn query_by_scope(&self, scope: &Scope) -> GraphResult<Vec<StoredRecord>>;

    /// Removes one record. Removing an id that does not exist is not an error.
    async fn delete_by_id(&self, id: RecordId) -> GraphResult<()>;

    /// Replaces the record with the same id when `record` carries one, otherwise inserts it.
    async fn upsert_by_identity(&self, record: StoredRecord) -> GraphResult<RecordId>;

    /// Applies deletes, updates and inserts together.
    async fn apply(&self, changes: ChangeSet) -> GraphResult<ChangeSummary>;

    /// The distinct periods holding records for `owner`, sorted.
    async fn periods(&self, owner: &str) -> GraphResult<Vec<String>>;

    /// Deletes every record of `scope` and returns how many were removed.
    async fn clear_scope(&self, scope: &Scope) -> GraphResult<usize>;
}
