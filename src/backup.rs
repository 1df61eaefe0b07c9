//! Backup management: JSON snapshots of a scope's records and copies of the SQLite file.

use crate::model::{Scope, StoredRecord};
use crate::{utils, Config, Result};
use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix for the snapshot taken before a save changes stored records.
pub const PRE_SAVE: &str = "pre-save";

/// Prefix for the snapshot taken before the `clear` command deletes a period.
pub const PRE_CLEAR: &str = "pre-clear";

/// Prefix for snapshots written by the `export` command when no output path is given.
pub const EXPORT: &str = "export";

/// Prefix for copies of the database file.
pub const SQLITE: &str = "expenses.sqlite";

/// The stored records of one scope at a point in time, as written to and read from JSON files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSnapshot {
    pub owner: String,
    pub period: String,
    pub exported_at: DateTime<Utc>,
    pub records: Vec<StoredRecord>,
}

impl ScopeSnapshot {
    pub fn new(scope: &Scope, records: Vec<StoredRecord>) -> Self {
        Self {
            owner: scope.owner().to_string(),
            period: scope.period().to_string(),
            exported_at: Utc::now(),
            records,
        }
    }

    pub fn scope(&self) -> Scope {
        Scope::new(self.owner.clone(), self.period.clone())
    }

    /// Reads a snapshot from a JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        utils::deserialize(path)
            .await
            .with_context(|| format!("Unable to read snapshot '{}'", path.display()))
    }

    /// Writes the snapshot as pretty-printed JSON to `path`.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize snapshot to JSON")?;
        utils::write(path, json).await
    }
}

/// Writes numbered backup files into the backups directory and deletes the oldest ones beyond
/// the configured number of copies. Usually obtained through `Config::backup()`.
#[derive(Debug, Clone)]
pub struct Backup {
    backups_dir: PathBuf,
    backup_copies: u32,
    sqlite_path: PathBuf,
}

impl Backup {
    pub fn new(config: &Config) -> Self {
        Self {
            backups_dir: config.backups().to_path_buf(),
            backup_copies: config.backup_copies(),
            sqlite_path: config.sqlite_path().to_path_buf(),
        }
    }

    /// Saves a snapshot as a JSON backup file.
    ///
    /// The filename format is `{prefix}.YYYY-MM-DD-NNN.json` where NNN is a sequence number.
    /// Old backups with the same prefix are rotated, keeping only `backup_copies` files.
    ///
    /// Returns the path of the new file.
    pub async fn save_snapshot(&self, prefix: &str, snapshot: &ScopeSnapshot) -> Result<PathBuf> {
        let date = today();
        let seq = self.next_sequence_number(prefix, &date, "json").await?;
        let path = self.backups_dir.join(format!("{prefix}.{date}-{seq:03}.json"));

        snapshot.save(&path).await?;
        self.rotate(prefix, "json").await?;

        Ok(path)
    }

    /// Copies the database file into the backups directory.
    ///
    /// The filename format is `expenses.sqlite.YYYY-MM-DD-NNN`. Old copies are rotated, keeping
    /// only `backup_copies` files.
    ///
    /// Returns the path of the new file.
    pub async fn copy_sqlite(&self) -> Result<PathBuf> {
        let date = today();
        let seq = self.next_sequence_number(SQLITE, &date, "").await?;
        let path = self.backups_dir.join(format!("{SQLITE}.{date}-{seq:03}"));

        utils::copy(&self.sqlite_path, &path).await?;
        self.rotate(SQLITE, "").await?;

        Ok(path)
    }

    /// One more than the highest sequence number already used for `prefix` on `date`.
    async fn next_sequence_number(&self, prefix: &str, date: &str, extension: &str) -> Result<u32> {
        let mut max_seq: u32 = 0;
        for name in self.file_names().await? {
            if let Some(seq) = parse_sequence_number(&name, prefix, date, extension) {
                max_seq = max_seq.max(seq);
            }
        }
        Ok(max_seq + 1)
    }

    /// Deletes the oldest files with the given prefix until at most `backup_copies` remain.
    async fn rotate(&self, prefix: &str, extension: &str) -> Result<()> {
        let mut files: Vec<String> = self
            .file_names()
            .await?
            .into_iter()
            .filter(|name| is_backup_file(name, prefix, extension))
            .collect();

        // The naming format makes lexical order chronological
        files.sort();

        let to_delete = files.len().saturating_sub(self.backup_copies as usize);
        for name in files.into_iter().take(to_delete) {
            utils::remove(self.backups_dir.join(name)).await?;
        }
        Ok(())
    }

    async fn file_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = utils::read_dir(&self.backups_dir).await?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        Ok(names)
    }
}

/// Local date, `YYYY-MM-DD`.
fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// The `NNN` of `{prefix}.{date}-NNN[.{extension}]`, if `filename` has that shape.
fn parse_sequence_number(filename: &str, prefix: &str, date: &str, extension: &str) -> Option<u32> {
    let remainder = filename.strip_prefix(&format!("{prefix}.{date}-"))?;
    let seq_str = if extension.is_empty() {
        remainder
    } else {
        remainder.strip_suffix(&format!(".{extension}"))?
    };
    seq_str.parse().ok()
}

/// Whether `filename` belongs to the rotation of `prefix`.
fn is_backup_file(filename: &str, prefix: &str, extension: &str) -> bool {
    let starts_ok = filename.starts_with(&format!("{prefix}."));
    let ends_ok = if extension.is_empty() {
        // SQLite copies have no extension of their own
        !filename.ends_with(".json")
    } else {
        filename.ends_with(&format!(".{extension}"))
    };
    starts_ok && ends_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestEnv;

    #[test]
    fn test_parse_sequence_number() {
        assert_eq!(
            parse_sequence_number("pre-save.2025-12-14-001.json", "pre-save", "2025-12-14", "json"),
            Some(1)
        );
        assert_eq!(
            parse_sequence_number("export.2025-12-14-042.json", "export", "2025-12-14", "json"),
            Some(42)
        );
        assert_eq!(
            parse_sequence_number(
                "expenses.sqlite.2025-12-14-003",
                "expenses.sqlite",
                "2025-12-14",
                ""
            ),
            Some(3)
        );
        // Wrong prefix
        assert_eq!(
            parse_sequence_number("export.2025-12-14-001.json", "pre-save", "2025-12-14", "json"),
            None
        );
        // Wrong date
        assert_eq!(
            parse_sequence_number("pre-save.2025-12-13-001.json", "pre-save", "2025-12-14", "json"),
            None
        );
    }

    #[test]
    fn test_is_backup_file() {
        assert!(is_backup_file("pre-save.2025-12-14-001.json", "pre-save", "json"));
        assert!(is_backup_file(
            "expenses.sqlite.2025-12-14-001",
            "expenses.sqlite",
            ""
        ));
        assert!(!is_backup_file("export.2025-12-14-001.json", "pre-save", "json"));
        assert!(!is_backup_file(
            "expenses.sqlite.2025-12-14-001.json",
            "expenses.sqlite",
            ""
        ));
    }

    #[tokio::test]
    async fn test_save_snapshot_rotates() {
        let env = TestEnv::new().await;
        let backup = env.config().backup();
        let snapshot = ScopeSnapshot::new(env.scope(), Vec::new());

        let mut paths = Vec::new();
        for _ in 0..7 {
            paths.push(backup.save_snapshot(PRE_SAVE, &snapshot).await.unwrap());
        }

        let names = backup.file_names().await.unwrap();
        assert_eq!(names.len(), 5);
        assert!(!paths[0].exists());
        assert!(!paths[1].exists());
        assert!(paths[6].exists());

        let loaded = ScopeSnapshot::load(&paths[6]).await.unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(&loaded.scope(), env.scope());
    }

    #[tokio::test]
    async fn test_copy_sqlite() {
        let env = TestEnv::new().await;
        let backup = env.config().backup();
        let first = backup.copy_sqlite().await.unwrap();
        let second = backup.copy_sqlite().await.unwrap();
        assert!(first.is_file());
        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("-002"));
    }
}
