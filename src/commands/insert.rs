//! Insert command handlers: adding one transaction, or many from a CSV file.

use crate::args::{AddArgs, ImportArgs};
use crate::commands::{load_edit_save, Out};
use crate::model::{Amount, LeafMeta, Node, NodeIndex, Scope};
use crate::store::ChangeSummary;
use crate::{utils, Config, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Adds a transaction to the tree of `scope` and saves it.
///
/// The transaction is filed under the category named in `args`, which is created under the root
/// when no category by that name exists.
///
/// # Returns
///
/// On success, returns an `Out` containing the new transaction node, including its index.
///
/// # Errors
///
/// - Returns an error if the cost is negative or the name is empty.
/// - Returns an error if a database operation fails.
pub async fn add(config: Config, scope: Scope, args: AddArgs) -> Result<Out<Node>> {
    check_cost(args.cost())?;
    let meta = LeafMeta {
        date: args.date().map(str::to_string),
        location: args.location().map(str::to_string),
        bank: args.bank().map(str::to_string),
        raw_text: args.raw_text().map(str::to_string),
    };

    let (node, _) = load_edit_save(&config, &scope, |engine| {
        let index = engine.add_leaf(args.name(), args.cost(), args.category(), meta)?;
        Ok(engine.node(index).cloned())
    })
    .await?;
    let Some(node) = node else {
        bail!("The new transaction is missing from {scope}")
    };

    Ok(Out::new(
        format!(
            "Added transaction {} '{}' ({}) to {}",
            node.index,
            node.name,
            node.cost,
            args.category().trim()
        ),
        node,
    ))
}

/// One row of a categorized CSV file.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ImportRow {
    pub name: String,
    pub cost: String,
    pub category: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub bank: Option<String>,
    #[serde(default)]
    pub raw_text: Option<String>,
}

/// What an import added.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct Imported {
    pub indices: Vec<NodeIndex>,
    pub changes: ChangeSummary,
}

/// Adds every row of a categorized CSV file to the tree of `scope`, then saves once.
///
/// The file must have a header row. The columns `name`, `cost` and `category` are required, and
/// `date`, `location`, `bank` and `raw_text` may be left out or empty. Either every row is added
/// or, when any row is invalid, nothing is.
///
/// # Errors
///
/// - Returns an error naming the line of the first row that cannot be read or added.
/// - Returns an error if a database operation fails.
pub async fn import(config: Config, scope: Scope, args: ImportArgs) -> Result<Out<Imported>> {
    let content = utils::read(args.file()).await?;
    let rows = parse_rows(&content)
        .with_context(|| format!("Unable to import '{}'", args.file().display()))?;
    if rows.is_empty() {
        return Ok(Out::new(
            format!("'{}' has no transactions", args.file().display()),
            Imported::default(),
        ));
    }

    let (indices, changes) = load_edit_save(&config, &scope, |engine| {
        rows.into_iter()
            .map(|(cost, row)| {
                let meta = LeafMeta {
                    date: row.date,
                    location: row.location,
                    bank: row.bank,
                    raw_text: row.raw_text,
                };
                engine.add_leaf(&row.name, cost, &row.category, meta)
            })
            .collect::<crate::GraphResult<Vec<_>>>()
    })
    .await
    .with_context(|| format!("Unable to import '{}'", args.file().display()))?;

    Ok(Out::new(
        format!(
            "Imported {} transaction(s) from '{}' into {scope}",
            indices.len(),
            args.file().display()
        ),
        Imported { indices, changes },
    ))
}

/// Reads and checks every row up front so that a bad row is reported before anything changes.
fn parse_rows(content: &str) -> Result<Vec<(Amount, ImportRow)>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let mut rows = Vec::new();
    for (i, result) in reader.deserialize::<ImportRow>().enumerate() {
        // Line 1 is the header
        let line = i + 2;
        let row = result.with_context(|| format!("Invalid row on line {line}"))?;
        if row.cost.is_empty() {
            bail!("Line {line} has no cost");
        }
        let cost = Amount::from_str(&row.cost)
            .with_context(|| format!("Invalid cost '{}' on line {line}", row.cost))?;
        check_cost(cost).with_context(|| format!("Invalid cost on line {line}"))?;
        if row.name.is_empty() || row.category.is_empty() {
            bail!("Line {line} needs both a name and a category");
        }
        rows.push((cost, row));
    }
    Ok(rows)
}

fn check_cost(cost: Amount) -> Result<()> {
    if cost.is_negative() {
        bail!("A cost cannot be negative, got {cost}");
    }
    Ok(())
}
