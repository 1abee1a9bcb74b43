//! `formsync`: registers survey forms and keeps their SQLite tables in sync.

mod commands;
mod context;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use formsync_core::forms::FormSpec;
use formsync_core::sync::{run_interval_secs, NewSyncEntry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::context::ServiceContext;

#[derive(Parser, Debug)]
#[command(name = "formsync", version)]
#[command(about = "Incrementally sync form submissions into SQLite", long_about = None)]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "FORMSYNC_DB_PATH", default_value = "formsync.db", global = true)]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a form for periodic syncing
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, env = "FORMSYNC_API_TOKEN", hide_env_values = true)]
        token: String,
        #[arg(long)]
        asset_uid: String,
        /// Main table name (defaults to the sanitized asset uid)
        #[arg(long)]
        table: Option<String>,
        /// Cached asset detail JSON, used instead of fetching the definition
        #[arg(long)]
        definition: Option<PathBuf>,
    },
    /// Show registered forms and their last sync
    List,
    /// Unregister a form (its tables are kept)
    Remove { id: i32 },
    /// Sync registered forms once, or forever with --loop
    Sync {
        /// Only this entry
        #[arg(long)]
        entry: Option<i32>,
        #[arg(long = "loop")]
        run_loop: bool,
        /// Seconds between passes in loop mode
        #[arg(long, env = "FORMSYNC_RUN_EVERY_SECS")]
        every: Option<u64>,
    },
    /// Sync one form without registering it
    Run {
        #[arg(long, env = "FORMSYNC_API_TOKEN", hide_env_values = true)]
        token: String,
        #[arg(long)]
        asset_uid: String,
        #[arg(long)]
        table: Option<String>,
        #[arg(long)]
        definition: Option<PathBuf>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let ctx = ServiceContext::initialize(&cli.db)?;

    match cli.command {
        Commands::Add {
            name,
            token,
            asset_uid,
            table,
            definition,
        } => {
            let entry = NewSyncEntry {
                name,
                api_token: token,
                asset_uid,
                main_table: table,
                definition_path: definition.map(|p| p.to_string_lossy().to_string()),
            };
            commands::add(&ctx, entry).await
        }
        Commands::List => commands::list(&ctx),
        Commands::Remove { id } => commands::remove(&ctx, id).await,
        Commands::Sync {
            entry,
            run_loop,
            every,
        } => {
            if run_loop {
                commands::sync_loop(&ctx, entry, run_interval_secs(every)).await
            } else {
                let summary = commands::sync_pass(&ctx, entry).await?;
                if summary.failed > 0 {
                    anyhow::bail!(
                        "{} of {} entries failed",
                        summary.failed,
                        summary.failed + summary.succeeded
                    );
                }
                Ok(())
            }
        }
        Commands::Run {
            token,
            asset_uid,
            table,
            definition,
        } => {
            let mut spec = FormSpec::new(token, asset_uid);
            if let Some(table) = table.as_deref() {
                spec = spec.with_main_table(table);
            }
            if let Some(path) = definition.as_deref() {
                spec = spec.with_asset_detail(commands::load_definition(path)?);
            }
            commands::run_adhoc(&ctx, spec).await.map(|_| ())
        }
    }
}
