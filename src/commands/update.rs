//! Update command handlers: editing transactions, renaming and moving categories.

use crate::args::{EditArgs, MoveCategoryArgs, RenameCategoryArgs};
use crate::commands::{load_edit_save, Out};
use crate::graph::{GraphEngine, LeafEdit};
use crate::model::{Node, NodeIndex, Scope};
use crate::store::ChangeSummary;
use crate::{Config, GraphResult, Result};
use anyhow::bail;

/// Changes the name, cost or category of a transaction and saves the tree.
///
/// Fields that are not given keep their value. Moving the transaction to another category
/// removes its old category if that leaves it empty.
///
/// # Errors
///
/// - Returns an error if no transaction has the given index.
/// - Returns an error if the new cost is negative or the new name is empty.
/// - Returns an error if a database operation fails.
pub async fn edit(config: Config, scope: Scope, args: EditArgs) -> Result<Out<Node>> {
    if let Some(cost) = args.cost() {
        if cost.is_negative() {
            bail!("A cost cannot be negative, got {cost}");
        }
    }
    let edit = LeafEdit {
        name: args.name().map(str::to_string),
        cost: args.cost(),
        category: args.category().map(str::to_string),
    };
    let index = args.index();
    let (node, changes) = load_edit_save(&config, &scope, |engine| {
        engine.edit_leaf(index, edit)?;
        node_at(engine, index)
    })
    .await?;
    Ok(Out::new(outcome("Edited transaction", &node, changes), node))
}

/// Renames a category and saves the tree.
///
/// # Errors
///
/// - Returns an error if no category has the given index, or if it is the root.
/// - Returns an error if another category already has the name.
/// - Returns an error if a database operation fails.
pub async fn rename_category(
    config: Config,
    scope: Scope,
    args: RenameCategoryArgs,
) -> Result<Out<Node>> {
    let index = args.index();
    let (node, changes) = load_edit_save(&config, &scope, |engine| {
        engine.edit_category(index, args.name())?;
        node_at(engine, index)
    })
    .await?;
    Ok(Out::new(outcome("Renamed category", &node, changes), node))
}

/// Moves a category with everything in it under the category named in `args`, creating that
/// category under the root if needed, and saves the tree.
///
/// # Errors
///
/// - Returns an error if no category has the given index, or if it is the root.
/// - Returns an error if the new parent is the category itself or lies inside it.
/// - Returns an error if a database operation fails.
pub async fn move_category(
    config: Config,
    scope: Scope,
    args: MoveCategoryArgs,
) -> Result<Out<Node>> {
    let index = args.index();
    let (node, changes) = load_edit_save(&config, &scope, |engine| {
        engine.move_category(index, args.parent())?;
        node_at(engine, index)
    })
    .await?;
    Ok(Out::new(
        format!(
            "{} under '{}'",
            outcome("Moved category", &node, changes),
            args.parent().trim()
        ),
        node,
    ))
}

fn node_at(engine: &GraphEngine, index: NodeIndex) -> GraphResult<Node> {
    engine
        .node(index)
        .cloned()
        .ok_or_else(|| crate::GraphError::invalid(format!("node {index} vanished during edit")))
}

fn outcome(action: &str, node: &Node, changes: ChangeSummary) -> String {
    if changes.is_empty() {
        format!("Nothing to change for {} '{}'", node.index, node.name)
    } else {
        format!("{action} {} '{}'", node.index, node.name)
    }
}
