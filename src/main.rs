use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use phi::organizer;
use phi::Config;

/// Self-hosted media drop box.
#[derive(Parser, Debug)]
#[command(name = "phi", version, about)]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the upload server.
    Serve {
        #[arg(long)]
        host: Option<String>,
        /// Port to listen at.
        #[arg(long)]
        port: Option<u16>,
        /// Root of the date-partitioned upload tree.
        #[arg(long)]
        store_root: Option<PathBuf>,
        /// SQLite credential database.
        #[arg(long)]
        database: Option<PathBuf>,
    },
    /// Move media files from a directory into `<output>/<owner>/YYYY/MM`.
    Organize {
        /// Input directory.
        #[arg(long)]
        dir: PathBuf,
        /// Output directory.
        #[arg(long)]
        output: PathBuf,
        /// Owner segment of the output path (defaults to $USER).
        #[arg(long)]
        owner: Option<String>,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    init_logging(&config.log.level);

    match cli.command {
        Command::Serve {
            host,
            port,
            store_root,
            database,
        } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(root) = store_root {
                config.storage.store_root = root;
            }
            if let Some(db) = database {
                config.storage.database = db;
            }
            phi::gateway::run_gateway(config).await
        }
        Command::Organize { dir, output, owner } => {
            let owner = owner.unwrap_or_else(organizer::default_owner);
            let report =
                tokio::task::spawn_blocking(move || organizer::organize(&dir, &output, &owner))
                    .await??;
            tracing::info!(
                moved = report.moved,
                skipped = report.skipped_existing,
                ignored = report.ignored,
                failed = report.failed,
                "Organize finished"
            );
            Ok(())
        }
    }
}
