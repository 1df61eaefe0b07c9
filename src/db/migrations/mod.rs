//! Schema migrations for the records database.
//!
//! Each schema version `NN` has two SQL files next to this module: `migration_NN_up.sql` moves the
//! schema from `NN-1` to `NN` and `migration_NN_down.sql` moves it back.

use anyhow::{bail, Context};
use sqlx::{Executor, SqlitePool};
use tracing::debug;

use crate::Result;

struct Migration {
    version: i32,
    up: &'static str,
    down: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    up: include_str!("migration_01_up.sql"),
    down: include_str!("migration_01_down.sql"),
}];

/// One script to run and the version the schema is at afterwards.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct Step {
    sql: &'static str,
    label: &'static str,
    from: i32,
    to: i32,
}

/// Works out every step between `from` and `to`, failing before anything runs if a migration is
/// missing.
fn plan(from: i32, to: i32) -> Result<Vec<Step>> {
    let find = |version: i32| {
        MIGRATIONS.iter().find(|m| m.version == version).with_context(|| {
            format!("Migration {version} is missing but required to go from version {from} to {to}")
        })
    };

    let mut steps = Vec::new();
    if from < to {
        for version in from + 1..=to {
            let migration = find(version)?;
            steps.push(Step {
                sql: migration.up,
                label: "up",
                from: version - 1,
                to: version,
            });
        }
    } else {
        for version in (to + 1..=from).rev() {
            let migration = find(version)?;
            steps.push(Step {
                sql: migration.down,
                label: "down",
                from: version,
                to: version - 1,
            });
        }
    }
    Ok(steps)
}

/// Moves the schema from version `from` to version `to`, up or down.
///
/// Each step runs in its own transaction together with the `schema_version` update, so an
/// interrupted migration leaves the schema at the last completed version.
pub(crate) async fn run(pool: &SqlitePool, from: i32, to: i32) -> Result<()> {
    if from == to {
        debug!("Schema is at version {to}, nothing to migrate");
        return Ok(());
    }
    if from < 0 || to < 0 {
        bail!("Cannot migrate between versions {from} and {to}");
    }

    for step in plan(from, to)? {
        debug!(
            "Migrating schema from version {} to {} ({})",
            step.from, step.to, step.label
        );
        apply(pool, step).await?;
    }
    debug!("Schema is now at version {to}");
    Ok(())
}

async fn apply(pool: &SqlitePool, step: Step) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("Unable to start the migration transaction")?;

    tx.execute(step.sql).await.with_context(|| {
        format!(
            "Migration from version {} to {} failed",
            step.from, step.to
        )
    })?;
    sqlx::query("DELETE FROM schema_version")
        .execute(&mut *tx)
        .await
        .context("Unable to clear schema_version")?;
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(step.to)
        .execute(&mut *tx)
        .await
        .context("Unable to record the new schema version")?;

    tx.commit()
        .await
        .context("Unable to commit the migration transaction")
}
