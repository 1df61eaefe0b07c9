use clap::Parser;
use expense_graph::args::{Args, Command, Common};
use expense_graph::model::Scope;
use expense_graph::{commands, Config, Result};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let common = args.common();

    // Route to appropriate command handler
    let _: () = match args.command() {
        Command::Init(a) => commands::init(common.home().path(), a.default_owner())
            .await?
            .print(),

        Command::Add(a) => {
            let (config, scope) = open(common).await?;
            commands::add(config, scope, a.clone()).await?.print()
        }

        Command::Edit(a) => {
            let (config, scope) = open(common).await?;
            commands::edit(config, scope, a.clone()).await?.print()
        }

        Command::RenameCategory(a) => {
            let (config, scope) = open(common).await?;
            commands::rename_category(config, scope, a.clone())
                .await?
                .print()
        }

        Command::MoveCategory(a) => {
            let (config, scope) = open(common).await?;
            commands::move_category(config, scope, a.clone())
                .await?
                .print()
        }

        Command::Delete(a) => {
            let (config, scope) = open(common).await?;
            commands::delete(config, scope, a.clone()).await?.print()
        }

        Command::DeleteCategory(a) => {
            let (config, scope) = open(common).await?;
            commands::delete_category(config, scope, a.clone())
                .await?
                .print()
        }

        Command::Clear => {
            let (config, scope) = open(common).await?;
            commands::clear(config, scope).await?.print()
        }

        Command::Show(a) => {
            let (config, scope) = open(common).await?;
            let out = commands::show(config, scope, a.clone()).await?;
            // The tree goes to stdout so that it can be piped
            println!("{}", out.message());
        }

        Command::Import(a) => {
            let (config, scope) = open(common).await?;
            commands::import(config, scope, a.clone()).await?.print()
        }

        Command::Periods => {
            let (config, scope) = open(common).await?;
            commands::periods(config, scope).await?.print()
        }

        Command::Export(a) => {
            let (config, scope) = open(common).await?;
            commands::export(config, scope, a.clone()).await?.print()
        }

        Command::Restore(a) => {
            let (config, scope) = open(common).await?;
            commands::restore(config, scope, a.clone()).await?.print()
        }
    };
    Ok(())
}

/// Loads the config from the home directory and works out the scope the command applies to.
async fn open(common: &Common) -> Result<(Config, Scope)> {
    let config = Config::load(common.home().path()).await?;
    let scope = commands::resolve_scope(&config, common.owner(), common.period())?;
    debug!("Working on {scope}");
    Ok((config, scope))
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use the given level for this crate only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                level,
                env!("CARGO_BIN_NAME"),
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
