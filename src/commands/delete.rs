//! Delete command handlers.

use crate::args::DeleteArgs;
use crate::backup::{ScopeSnapshot, PRE_CLEAR};
use crate::commands::{adapter, load_edit_save, Out};
use crate::model::{Node, Scope};
use crate::{Config, Result};
use anyhow::Context;
use tracing::debug;

/// Deletes a transaction and saves the tree. A category left empty by the deletion is removed,
/// and so on up the chain of parent categories.
///
/// # Returns
///
/// On success, returns an `Out` containing the deleted transaction.
///
/// # Errors
///
/// - Returns an error if no transaction has the given index.
/// - Returns an error if a database operation fails.
pub async fn delete(config: Config, scope: Scope, args: DeleteArgs) -> Result<Out<Node>> {
    let (node, _) = load_edit_save(&config, &scope, |engine| {
        engine.delete_leaf(args.index())
    })
    .await?;
    Ok(Out::new(
        format!(
            "Deleted transaction {} '{}' ({})",
            node.index, node.name, node.cost
        ),
        node,
    ))
}

/// Deletes a category together with every category and transaction inside it, then saves the
/// tree.
///
/// # Returns
///
/// On success, returns an `Out` containing every deleted node, deepest first.
///
/// # Errors
///
/// - Returns an error if no category has the given index, or if it is the root.
/// - Returns an error if a database operation fails.
pub async fn delete_category(
    config: Config,
    scope: Scope,
    args: DeleteArgs,
) -> Result<Out<Vec<Node>>> {
    let (removed, _) = load_edit_save(&config, &scope, |engine| {
        engine.delete_category(args.index())
    })
    .await?;
    let leaves = removed.iter().filter(|n| n.is_leaf).count();
    let name = removed.last().map(|n| n.name.clone()).unwrap_or_default();
    Ok(Out::new(
        format!(
            "Deleted category {} '{name}' with {leaves} transaction(s)",
            args.index()
        ),
        removed,
    ))
}

/// Deletes every stored record of `scope`, leaving an empty tree.
///
/// The records are written to a `pre-clear` backup first, which `restore` accepts.
///
/// # Returns
///
/// On success, returns an `Out` containing the number of records deleted.
///
/// # Errors
///
/// - Returns an error if the backup cannot be written. Nothing is deleted in that case.
/// - Returns an error if a database operation fails.
pub async fn clear(config: Config, scope: Scope) -> Result<Out<usize>> {
    let adapter = adapter(&config);
    let records = adapter.snapshot(&scope).await?;
    if records.is_empty() {
        return Ok(Out::new(format!("Nothing is stored for {scope}"), 0));
    }

    let path = config
        .backup()
        .save_snapshot(PRE_CLEAR, &ScopeSnapshot::new(&scope, records))
        .await
        .with_context(|| format!("Unable to back up {scope} before clearing it"))?;
    debug!("Backed up {scope} to {}", path.display());

    let removed = adapter.clear(&scope).await?;
    Ok(Out::new(
        format!(
            "Cleared {scope}: deleted {removed} record(s), backup at '{}'",
            path.display()
        ),
        removed,
    ))
}
