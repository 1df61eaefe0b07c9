use crate::commands::Out;
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the home directory, its subdirectories, an initial `config.json` and an empty
/// database.
///
/// # Arguments
/// - `home` - The directory that will be the home directory, e.g. `$HOME/expenses`
/// - `default_owner` - The owner used by commands that are not given one explicitly.
///
/// # Errors
/// - Returns an error if any file operations fail or if `home` is already set up.
pub async fn init(home: &Path, default_owner: Option<&str>) -> Result<Out<()>> {
    let config = Config::create(home, default_owner)
        .await
        .context("Unable to create the data directory and configs")?;
    Ok(format!(
        "Successfully created the expenses directory at '{}'",
        config.root().display()
    )
    .into())
}
