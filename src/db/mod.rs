//! The SQLite record store: opens or creates the database file, keeps its schema current and
//! implements `RecordStore` on the `records` table.

mod migrations;

use crate::error::{GraphResult, IntoStorage};
use crate::model::{Amount, NodeIndex, RecordId, Scope, StoredRecord};
use crate::store::{ChangeSet, ChangeSummary, RecordStore};
use crate::Result;
use anyhow::{bail, Context};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, trace};

/// The schema version this build of the app expects.
const CURRENT_VERSION: i32 = 1;

const COLUMNS: &str = "id, owner, period, is_adjacency, visible, name, node_index, cost, \
    is_leaf, date, location, bank, raw_text, original_name, parent_key, child_indices";

#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// - Validates that no file currently exists at `path`
    /// - Creates a new SQLite file at `path`
    /// - Initializes the database schema
    /// - Returns a constructed `Db` object for further operations
    pub(crate) async fn init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            bail!("A database already exists at '{}'", path.display());
        }
        let pool = connect(path, true).await?;

        sqlx::query("CREATE TABLE schema_version (version INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .context("Failed to create schema_version table")?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (0)")
            .execute(&pool)
            .await
            .context("Failed to insert initial schema version")?;

        migrations::run(&pool, 0, CURRENT_VERSION).await?;
        debug!("Created database at {}", path.display());
        Ok(Self { pool })
    }

    /// - Validates that there is a SQLite file at `path`
    /// - Updates the database schema with migrations if it is out-of-date
    /// - Returns a constructed `Db` object for further operations
    pub(crate) async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("The database file is missing '{}'", path.display());
        }
        let pool = connect(path, false).await?;
        let db = Self { pool };

        let version = db.schema_version().await?;
        if version > CURRENT_VERSION {
            bail!(
                "The database schema is at version {version} but this app only understands up to \
                 version {CURRENT_VERSION}"
            );
        }
        migrations::run(&db.pool, version, CURRENT_VERSION).await?;
        Ok(db)
    }

    pub(crate) async fn schema_version(&self) -> Result<i32> {
        let row: (i32,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
            .fetch_one(&self.pool)
            .await
            .context("Failed to query schema version")?;
        Ok(row.0)
    }

    /// The number of records across every scope.
    pub(crate) async fn count_records(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count records")?;
        u64::try_from(row.0).context("Record count is negative")
    }

    async fn insert_all(&self, records: Vec<StoredRecord>) -> Result<Vec<RecordId>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            ids.push(insert_row(&mut tx, &record, false).await?);
        }
        tx.commit().await.context("Failed to commit inserted records")?;
        Ok(ids)
    }

    async fn select_scope(&self, scope: &Scope) -> Result<Vec<StoredRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM records WHERE owner = ? AND period = ? ORDER BY id"
        ))
        .bind(scope.owner())
        .bind(scope.period())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to query records for {scope}"))?;
        rows.into_iter().map(StoredRecord::try_from).collect()
    }

    async fn delete_one(&self, id: RecordId) -> Result<()> {
        sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete record {id}"))?;
        Ok(())
    }

    async fn upsert_one(&self, record: StoredRecord) -> Result<RecordId> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        let id = insert_row(&mut conn, &record, record.id.is_some()).await?;
        Ok(id)
    }

    async fn apply_changes(&self, changes: ChangeSet) -> Result<ChangeSummary> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let mut summary = ChangeSummary::default();

        for id in changes.deletes {
            let result = sqlx::query("DELETE FROM records WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to delete record {id}"))?;
            summary.deleted += result.rows_affected() as usize;
        }
        for record in changes.updates {
            update_row(&mut tx, &record).await?;
            summary.updated += 1;
        }
        for record in changes.inserts {
            insert_row(&mut tx, &record, false).await?;
            summary.inserted += 1;
        }

        tx.commit().await.context("Failed to commit changes")?;
        Ok(summary)
    }

    async fn select_periods(&self, owner: &str) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT DISTINCT period FROM records WHERE owner = ? ORDER BY period")
            .bind(owner)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to list periods for {owner}"))
    }

    async fn delete_scope(&self, scope: &Scope) -> Result<usize> {
        let result = sqlx::query("DELETE FROM records WHERE owner = ? AND period = ?")
            .bind(scope.owner())
            .bind(scope.period())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to clear records for {scope}"))?;
        Ok(result.rows_affected() as usize)
    }
}

#[async_trait::async_trait]
impl RecordStore for Db {
    async fn insert_batch(&self, records: Vec<StoredRecord>) -> GraphResult<Vec<RecordId>> {
        self.insert_all(records).await.storage()
    }

    async fn query_by_scope(&self, scope: &Scope) -> GraphResult<Vec<StoredRecord>> {
        self.select_scope(scope).await.storage()
    }

    async fn delete_by_id(&self, id: RecordId) -> GraphResult<()> {
        self.delete_one(id).await.storage()
    }

    async fn upsert_by_identity(&self, record: StoredRecord) -> GraphResult<RecordId> {
        self.upsert_one(record).await.storage()
    }

    async fn apply(&self, changes: ChangeSet) -> GraphResult<ChangeSummary> {
        self.apply_changes(changes).await.storage()
    }

    async fn periods(&self, owner: &str) -> GraphResult<Vec<String>> {
        self.select_periods(owner).await.storage()
    }

    async fn clear_scope(&self, scope: &Scope) -> GraphResult<usize> {
        self.delete_scope(scope).await.storage()
    }
}

async fn connect(path: &Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .context("Failed to parse SQLite connection string")?
        .create_if_missing(create);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open SQLite database at '{}'", path.display()))
}

/// Inserts `record`. With `keep_id` the record's own id is used and any row holding it is
/// replaced.
async fn insert_row(
    conn: &mut SqliteConnection,
    record: &StoredRecord,
    keep_id: bool,
) -> Result<RecordId> {
    let row = RecordRow::try_from(record)?;
    let verb = if keep_id {
        "INSERT OR REPLACE"
    } else {
        "INSERT"
    };
    let result = sqlx::query(&format!(
        "{verb} INTO records ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(if keep_id { row.id } else { None })
    .bind(row.owner)
    .bind(row.period)
    .bind(row.is_adjacency)
    .bind(row.visible)
    .bind(row.name)
    .bind(row.node_index)
    .bind(row.cost)
    .bind(row.is_leaf)
    .bind(row.date)
    .bind(row.location)
    .bind(row.bank)
    .bind(row.raw_text)
    .bind(row.original_name)
    .bind(row.parent_key)
    .bind(row.child_indices)
    .execute(&mut *conn)
    .await
    .context("Failed to insert record")?;
    let id = result.last_insert_rowid();
    trace!("Inserted record {id}");
    Ok(id)
}

async fn update_row(conn: &mut SqliteConnection, record: &StoredRecord) -> Result<()> {
    let row = RecordRow::try_from(record)?;
    let id = row.id.context("Unable to update a record that has no id")?;
    let result = sqlx::query(
        "UPDATE records SET owner = ?, period = ?, is_adjacency = ?, visible = ?, name = ?, \
         node_index = ?, cost = ?, is_leaf = ?, date = ?, location = ?, bank = ?, raw_text = ?, \
         original_name = ?, parent_key = ?, child_indices = ? WHERE id = ?",
    )
    .bind(row.owner)
    .bind(row.period)
    .bind(row.is_adjacency)
    .bind(row.visible)
    .bind(row.name)
    .bind(row.node_index)
    .bind(row.cost)
    .bind(row.is_leaf)
    .bind(row.date)
    .bind(row.location)
    .bind(row.bank)
    .bind(row.raw_text)
    .bind(row.original_name)
    .bind(row.parent_key)
    .bind(row.child_indices)
    .bind(id)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to update record {id}"))?;
    if result.rows_affected() == 0 {
        bail!("Unable to update record {id} because it does not exist");
    }
    Ok(())
}

/// A row of the `records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct RecordRow {
    id: Option<i64>,
    owner: String,
    period: String,
    is_adjacency: bool,
    visible: bool,
    name: Option<String>,
    node_index: Option<i64>,
    cost: Option<String>,
    is_leaf: Option<bool>,
    date: Option<String>,
    location: Option<String>,
    bank: Option<String>,
    raw_text: Option<String>,
    original_name: Option<String>,
    parent_key: Option<String>,
    child_indices: Option<String>,
}

impl TryFrom<&StoredRecord> for RecordRow {
    type Error = anyhow::Error;

    fn try_from(r: &StoredRecord) -> Result<Self> {
        let child_indices = r
            .values
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Unable to serialize child indices")?;
        Ok(Self {
            id: r.id,
            owner: r.owner.clone(),
            period: r.period.clone(),
            is_adjacency: r.is_adjacency,
            visible: r.visible,
            name: r.name.clone(),
            node_index: r.index.map(i64::from),
            cost: r.cost.map(|c| c.to_plain_string()),
            is_leaf: r.is_leaf,
            date: r.date.clone(),
            location: r.location.clone(),
            bank: r.bank.clone(),
            raw_text: r.raw_text.clone(),
            original_name: r.original_name.clone(),
            parent_key: r.key.clone(),
            child_indices,
        })
    }
}

impl TryFrom<RecordRow> for StoredRecord {
    type Error = anyhow::Error;

    fn try_from(row: RecordRow) -> Result<Self> {
        let id = row.id;
        let index = row
            .node_index
            .map(NodeIndex::try_from)
            .transpose()
            .with_context(|| format!("Record {id:?} has an index out of range"))?;
        let cost = row
            .cost
            .as_deref()
            .map(Amount::from_str)
            .transpose()
            .with_context(|| format!("Record {id:?} has an unreadable cost"))?;
        let values = row
            .child_indices
            .as_deref()
            .map(serde_json::from_str::<Vec<NodeIndex>>)
            .transpose()
            .with_context(|| format!("Record {id:?} has unreadable child indices"))?;
        Ok(Self {
            id,
            owner: row.owner,
            period: row.period,
            is_adjacency: row.is_adjacency,
            visible: row.visible,
            name: row.name,
            index,
            cost,
            is_leaf: row.is_leaf,
            date: row.date,
            location: row.location,
            bank: row.bank,
            raw_text: row.raw_text,
            original_name: row.original_name,
            key: row.parent_key,
            values,
        })
    }
}
