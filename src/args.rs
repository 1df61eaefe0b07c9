//! These structs provide the CLI interface for the expenses CLI.

use crate::model::{Amount, NodeIndex};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// expenses: A command-line tool for categorizing your spending.
///
/// Each transaction you add is filed under a spending category, and categories can be nested
/// inside one another. Every category shows the total cost of everything below it. Your data is
/// kept in a local SQLite database, one tree per owner and month.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory, the configuration file and an empty database.
    ///
    /// This is the first command you should run. By default the data directory is
    /// $HOME/expenses. If you want it somewhere else then pass --home or set EXPENSES_HOME.
    Init(InitArgs),
    /// Add a transaction under a category. The category is created if it does not exist.
    Add(AddArgs),
    /// Change the name, cost or category of a transaction.
    Edit(EditArgs),
    /// Rename a category.
    RenameCategory(RenameCategoryArgs),
    /// Move a category, with everything in it, under another category.
    MoveCategory(MoveCategoryArgs),
    /// Delete a transaction. Categories left empty are removed too.
    Delete(DeleteArgs),
    /// Delete a category and everything in it.
    DeleteCategory(DeleteArgs),
    /// Delete every category and transaction of the period.
    ///
    /// The stored records are written to a pre-clear backup first.
    Clear,
    /// Print the category tree of the period.
    Show(ShowArgs),
    /// Add the transactions of a categorized CSV file.
    ///
    /// The file has a header row with the columns name, cost, category, date, location, bank
    /// and raw_text. Only name, cost and category are required.
    Import(ImportArgs),
    /// List the periods that have data for the owner.
    Periods,
    /// Write the stored records of the period to a JSON file.
    Export(ExportArgs),
    /// Replace the stored records of the period with the contents of an exported JSON file.
    Restore(RestoreArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where data and configuration are held. Defaults to ~/expenses
    #[arg(long, env = "EXPENSES_HOME", default_value_t = default_home())]
    home: DisplayPath,

    /// Whose expenses to work with. Defaults to the default_owner in config.json.
    #[arg(long, env = "EXPENSES_OWNER")]
    owner: Option<String>,

    /// The month to work with, as YYYY-MM. Defaults to the current month.
    #[arg(long, value_parser = parse_period, default_value_t = current_period())]
    period: String,
}

impl Common {
    pub fn new(
        log_level: LevelFilter,
        home: PathBuf,
        owner: Option<String>,
        period: impl Into<String>,
    ) -> Self {
        Self {
            log_level,
            home: home.into(),
            owner,
            period: period.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn home(&self) -> &DisplayPath {
        &self.home
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn period(&self) -> &str {
        &self.period
    }
}

/// (Not shown): Args for the `expenses init` command.
#[derive(Debug, Parser, Clone, Default)]
pub struct InitArgs {
    /// The owner used when --owner and EXPENSES_OWNER are not given, e.g. your email address.
    #[arg(long)]
    default_owner: Option<String>,
}

impl InitArgs {
    pub fn new(default_owner: Option<String>) -> Self {
        Self { default_owner }
    }

    pub fn default_owner(&self) -> Option<&str> {
        self.default_owner.as_deref()
    }
}

/// (Not shown): Args for the `expenses add` command.
#[derive(Debug, Parser, Clone)]
pub struct AddArgs {
    /// What the transaction was, e.g. "Coffee".
    #[arg(long)]
    name: String,

    /// The amount spent, e.g. 4.50 or $1,200.
    #[arg(long)]
    cost: Amount,

    /// The category to file the transaction under, matched without regard to case.
    #[arg(long)]
    category: String,

    /// The date of the transaction.
    #[arg(long)]
    date: Option<String>,

    /// Where the money was spent.
    #[arg(long)]
    location: Option<String>,

    /// The bank or card the transaction came from.
    #[arg(long)]
    bank: Option<String>,

    /// The statement line the transaction was taken from.
    #[arg(long)]
    raw_text: Option<String>,
}

impl AddArgs {
    pub fn new(name: impl Into<String>, cost: Amount, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cost,
            category: category.into(),
            date: None,
            location: None,
            bank: None,
            raw_text: None,
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cost(&self) -> Amount {
        self.cost
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn bank(&self) -> Option<&str> {
        self.bank.as_deref()
    }

    pub fn raw_text(&self) -> Option<&str> {
        self.raw_text.as_deref()
    }
}

/// (Not shown): Args for the `expenses edit` command.
#[derive(Debug, Parser, Clone)]
pub struct EditArgs {
    /// The index of the transaction, as printed by `expenses show`.
    index: NodeIndex,

    /// The new name.
    #[arg(long)]
    name: Option<String>,

    /// The new cost.
    #[arg(long)]
    cost: Option<Amount>,

    /// The category to move the transaction to. It is created if it does not exist.
    #[arg(long)]
    category: Option<String>,
}

impl EditArgs {
    pub fn new(index: NodeIndex) -> Self {
        Self {
            index,
            name: None,
            cost: None,
            category: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_cost(mut self, cost: Amount) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn index(&self) -> NodeIndex {
        self.index
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn cost(&self) -> Option<Amount> {
        self.cost
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }
}

/// (Not shown): Args for the `expenses rename-category` command.
#[derive(Debug, Parser, Clone)]
pub struct RenameCategoryArgs {
    /// The index of the category.
    index: NodeIndex,

    /// The new name.
    name: String,
}

impl RenameCategoryArgs {
    pub fn new(index: NodeIndex, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }

    pub fn index(&self) -> NodeIndex {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// (Not shown): Args for the `expenses move-category` command.
#[derive(Debug, Parser, Clone)]
pub struct MoveCategoryArgs {
    /// The index of the category to move.
    index: NodeIndex,

    /// The name of the new parent category. It is created if it does not exist.
    parent: String,
}

impl MoveCategoryArgs {
    pub fn new(index: NodeIndex, parent: impl Into<String>) -> Self {
        Self {
            index,
            parent: parent.into(),
        }
    }

    pub fn index(&self) -> NodeIndex {
        self.index
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }
}

/// (Not shown): Args for the `expenses delete` and `expenses delete-category` commands.
#[derive(Debug, Parser, Clone)]
pub struct DeleteArgs {
    /// The index of the node to delete.
    index: NodeIndex,
}

impl DeleteArgs {
    pub fn new(index: NodeIndex) -> Self {
        Self { index }
    }

    pub fn index(&self) -> NodeIndex {
        self.index
    }
}

/// How `expenses show` prints the tree.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShowFormat {
    /// An indented outline with the cost of every node.
    #[default]
    Tree,
    /// The nodes and edges as JSON.
    Json,
}

serde_plain::derive_display_from_serialize!(ShowFormat);
serde_plain::derive_fromstr_from_deserialize!(ShowFormat);

/// (Not shown): Args for the `expenses show` command.
#[derive(Debug, Parser, Clone, Default)]
pub struct ShowArgs {
    /// Either "tree" or "json".
    #[arg(long, default_value_t = ShowFormat::Tree)]
    format: ShowFormat,
}

impl ShowArgs {
    pub fn new(format: ShowFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> ShowFormat {
        self.format
    }
}

/// (Not shown): Args for the `expenses import` command.
#[derive(Debug, Parser, Clone)]
pub struct ImportArgs {
    /// The CSV file to read.
    file: PathBuf,
}

impl ImportArgs {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }
}

/// (Not shown): Args for the `expenses export` command.
#[derive(Debug, Parser, Clone, Default)]
pub struct ExportArgs {
    /// Where to write the JSON file. Defaults to a new file in $EXPENSES_HOME/.backups
    #[arg(long)]
    output: Option<PathBuf>,
}

impl ExportArgs {
    pub fn new(output: Option<PathBuf>) -> Self {
        Self { output }
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }
}

/// (Not shown): Args for the `expenses restore` command.
#[derive(Debug, Parser, Clone)]
pub struct RestoreArgs {
    /// A JSON file written by `expenses export`.
    file: PathBuf,
}

impl RestoreArgs {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }
}

/// Accepts a period written as `YYYY-MM`.
pub fn parse_period(s: &str) -> Result<String, String> {
    let s = s.trim();
    match NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d") {
        Ok(date) if s.len() == 7 => Ok(date.format("%Y-%m").to_string()),
        _ => Err(format!("'{s}' is not a month in the form YYYY-MM")),
    }
}

fn current_period() -> String {
    Local::now().format("%Y-%m").to_string()
}

fn default_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("expenses"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --home or EXPENSES_HOME instead of relying on the default \
                home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("expenses")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}
