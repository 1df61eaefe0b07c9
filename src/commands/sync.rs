//! Export and restore of a period's stored records.

use crate::args::{ExportArgs, RestoreArgs};
use crate::backup::{ScopeSnapshot, EXPORT};
use crate::commands::{adapter, Out};
use crate::model::Scope;
use crate::store::ChangeSummary;
use crate::{Config, Result};
use anyhow::Context;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Writes the stored records of `scope` to a JSON file.
///
/// When `args` names no output file, the snapshot goes to the backups directory with the
/// `export` prefix and is rotated like the other backups.
///
/// # Returns
///
/// On success, returns an `Out` containing the path of the written file.
pub async fn export(config: Config, scope: Scope, args: ExportArgs) -> Result<Out<PathBuf>> {
    let records = adapter(&config).snapshot(&scope).await?;
    let count = records.len();
    let snapshot = ScopeSnapshot::new(&scope, records);
    let path = match args.output() {
        Some(path) => {
            snapshot.save(path).await?;
            path.to_path_buf()
        }
        None => config.backup().save_snapshot(EXPORT, &snapshot).await?,
    };
    Ok(Out::new(
        format!(
            "Exported {count} record(s) of {scope} to '{}'",
            path.display()
        ),
        path,
    ))
}

/// Replaces the stored records of `scope` with the records of an exported JSON file.
///
/// The file may come from another owner or period; its records are moved into `scope`. The
/// SQLite file is copied to the backups directory first.
///
/// # Errors
///
/// - Returns an error if the file cannot be read or its records do not form a valid tree. The
///   stored records are not touched in that case.
/// - Returns an error if a database operation fails.
pub async fn restore(config: Config, scope: Scope, args: RestoreArgs) -> Result<Out<ChangeSummary>> {
    let snapshot = ScopeSnapshot::load(args.file()).await?;
    if snapshot.scope() != scope {
        warn!(
            "Restoring records exported from {} into {scope}",
            snapshot.scope()
        );
    }

    let copy = config
        .backup()
        .copy_sqlite()
        .await
        .context("Unable to back up the database before restoring")?;
    debug!("Copied the database to '{}'", copy.display());

    let summary = adapter(&config)
        .restore(&scope, snapshot.records)
        .await
        .with_context(|| format!("Unable to restore '{}'", args.file().display()))?;
    Ok(Out::new(
        format!(
            "Restored {scope} from '{}': {} record(s) replaced by {}",
            args.file().display(),
            summary.deleted,
            summary.inserted
        ),
        summary,
    ))
}
