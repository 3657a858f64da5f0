use std::path::PathBuf;

use clap::{Parser, Subcommand};
use engine::{Dispatcher, DispatcherOptions};
use serde_json::Value;
use store::{LocalStore, StoreOptions};

use crate::{
    error::Result,
    settings::{Settings, TRANSACTIONS},
};

mod commands;
mod error;
mod settings;

#[derive(Parser, Debug)]
#[command(name = "budgetbox")]
#[command(about = "Offline budget tracker: local records and background budget reports")]
struct Cli {
    /// Settings file, without extension (also read from `BUDGETBOX_CONFIG`).
    #[arg(long, env = "BUDGETBOX_CONFIG", default_value = "settings")]
    config: String,
    /// Override the data directory from the settings.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Keep the database in memory; nothing survives the process.
    #[arg(long, conflicts_with = "data_dir")]
    in_memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load `{ "envelopes": [...], "transactions": [...] }` from a JSON file.
    Import {
        #[arg(long)]
        file: PathBuf,
    },
    /// Income, expenses and projections over an inclusive date window.
    Stats {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    /// Top spending envelopes and the largest expense.
    Insights,
    /// Transactions grouped by day and by envelope.
    Groups,
    /// Rows of the date-sorted transaction list visible at a scroll offset.
    List {
        #[arg(long, default_value_t = 0.0)]
        scroll_top: f64,
        #[arg(long)]
        viewport: Option<f64>,
    },
    Count {
        #[arg(long, default_value = TRANSACTIONS)]
        collection: String,
    },
    Clear {
        #[arg(long)]
        collection: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::new(&cli.config)?;
    if cli.in_memory {
        settings.store.data_dir = None;
    } else if let Some(data_dir) = cli.data_dir {
        settings.store.data_dir = Some(data_dir);
    }

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "budgetbox={level},engine={level},store={level}",
            level = settings.app.level
        ))
        .with_writer(std::io::stderr)
        .init();

    let options = match &settings.store.data_dir {
        Some(dir) => StoreOptions::on_disk(dir),
        None => StoreOptions::in_memory(),
    };
    let store = LocalStore::new(options);
    store.open(&settings.store.descriptor).await?;

    let dispatcher = Dispatcher::start(DispatcherOptions {
        same_kind_policy: settings.worker.same_kind_policy,
        ..DispatcherOptions::default()
    });

    let result = run(cli.command, &store, &dispatcher, &settings).await;

    dispatcher.shutdown().await;
    if let Err(err) = store.close().await {
        tracing::warn!("failed to close store: {err}");
    }

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

async fn run(
    command: Command,
    store: &LocalStore,
    dispatcher: &Dispatcher,
    settings: &Settings,
) -> Result<Value> {
    match command {
        Command::Import { file } => commands::import(store, &file).await,
        Command::Stats { start, end } => commands::stats(store, dispatcher, start, end).await,
        Command::Insights => commands::insights(store, dispatcher).await,
        Command::Groups => commands::groups(store, dispatcher).await,
        Command::List {
            scroll_top,
            viewport,
        } => commands::list(store, &settings.list, scroll_top, viewport).await,
        Command::Count { collection } => commands::count(store, &collection).await,
        Command::Clear { collection } => commands::clear(store, &collection).await,
    }
}
