use anyhow::Result;
use bankpulse_storage::ReviewStore;
use bankpulse_sync::{run_load_once_from_env, LoadConfig, LoadPipeline, RunStatus};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "bankpulse")]
#[command(about = "Mobile banking review ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create or verify the database schema.
    Migrate,
    /// Run one normalize-score-dedup-load pass over the raw review files.
    Load,
    /// Print a digest of the most recent load runs.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
    /// Run loads on the configured cron schedule until interrupted.
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Load) {
        Commands::Migrate => {
            let config = LoadConfig::from_env();
            let store = ReviewStore::connect(&config.database_url).await?;
            store.init_schema().await?;
            println!("schema created/verified");
        }
        Commands::Load => {
            let summary = run_load_once_from_env().await?;
            println!(
                "load {}: run_id={} banks={} attempted={} inserted={} dropped_empty={} reports={}",
                summary.status,
                summary.run_id,
                summary.banks_resolved,
                summary.rows_attempted,
                summary.rows_inserted,
                summary.rows_dropped_empty,
                summary.reports_dir
            );
            if let RunStatus::Aborted { reason } = &summary.status {
                anyhow::bail!("load aborted: {reason}");
            }
        }
        Commands::Report { runs } => {
            let markdown = bankpulse_sync::report_recent_markdown(runs, None)?;
            println!("{markdown}");
        }
        Commands::Schedule => {
            let pipeline = LoadPipeline::connect(LoadConfig::from_env()).await?;
            match pipeline.maybe_build_scheduler().await? {
                Some(mut sched) => {
                    sched.start().await?;
                    info!("scheduler running; ctrl-c to stop");
                    tokio::signal::ctrl_c().await?;
                }
                None => {
                    eprintln!("scheduler disabled; set BANKPULSE_SCHEDULER_ENABLED=1");
                }
            }
        }
    }

    Ok(())
}
