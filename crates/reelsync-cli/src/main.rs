use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use reelsync_sync::{SchemaOutcome, SyncConfig, TracingObserver};

#[derive(Debug, Parser)]
#[command(name = "reelsync")]
#[command(about = "Fill a Notion film database from IMDb metadata")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Args)]
struct Overrides {
    /// Notion database URL (overrides NOTION_DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,
    /// Notion database name to search for (overrides NOTION_DATABASE_NAME)
    #[arg(long, global = true)]
    database_name: Option<String>,
    /// Offline JSON catalog used instead of OMDb (overrides REELSYNC_CATALOG_PATH)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Reconcile the schema and update every incomplete record
    Sync,
    /// Reconcile the schema only
    Schema,
    /// Print the resolved data source id
    Locate,
}

impl Overrides {
    fn apply(self, config: &mut SyncConfig) {
        if self.database_url.is_some() {
            config.database_url = self.database_url;
        }
        if self.database_name.is_some() {
            config.database_name = self.database_name;
        }
        if self.catalog.is_some() {
            config.catalog_path = self.catalog;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = SyncConfig::from_env();
    cli.overrides.apply(&mut config);

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = reelsync_sync::run_sync_once(&config, &TracingObserver).await?;
            println!(
                "sync complete: run_id={} candidates={} updated={} not_found={} skipped={}",
                summary.run_id, summary.candidates, summary.updated, summary.not_found, summary.skipped
            );
        }
        Commands::Schema => {
            let (location, outcome) =
                reelsync_sync::reconcile_schema_once(&config, &TracingObserver).await?;
            match outcome {
                SchemaOutcome::Confirmed(available) => {
                    println!("schema confirmed for {location}:");
                    for name in available.iter() {
                        println!("  {name}");
                    }
                }
                SchemaOutcome::Degraded { reason } => {
                    println!("schema degraded for {location}: {reason}");
                }
            }
        }
        Commands::Locate => {
            let store = reelsync_sync::build_store(&config)?;
            let location = reelsync_sync::resolve_location(&store, &config).await?;
            println!("{location}");
        }
    }

    Ok(())
}
