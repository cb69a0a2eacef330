mod config;
mod error;
mod models;
mod pipeline;
mod scraper;
mod server;
mod storage;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{AppConfig, RunnerKind};
use crate::pipeline::Pipeline;
use crate::server::controller::{
    ChildProcessRunner, InProcessRunner, PipelineRunner, RefreshController,
};
use crate::server::AppState;
use crate::storage::ResultStore;

#[derive(Parser)]
#[command(
    name = "channel-indexer",
    about = "Extract channel stream links from a listing site and serve them",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Run one extraction and overwrite the channel artifact
    Scrape,

    /// Serve the artifact and the refresh trigger over HTTP
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(short, long, env = "CHANNELS_BIND")]
        bind: Option<String>,
    },

    /// Print the persisted channel list
    Channels,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "channel_indexer=info,warn",
        1 => "channel_indexer=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_ansi(std::io::stdout().is_terminal()),
        )
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;
    let store = Arc::new(ResultStore::new(
        config.storage.output_path.clone(),
        config.storage.snapshot_dir.clone(),
    ));

    match cli.command {
        Command::Scrape => {
            let fetcher = scraper::build_fetcher(&config.scraper)?;
            let stats = Pipeline::new(config, fetcher, store).run().await?;
            info!(
                "Done: {} channels from {} candidates ({} without link, {} failed)",
                stats.results.len(),
                stats.candidates,
                stats.no_marker,
                stats.failed
            );
        }

        Command::Serve { bind } => {
            let runner: Arc<dyn PipelineRunner> = match config.server.runner {
                RunnerKind::InProcess => Arc::new(InProcessRunner::new(
                    config.clone(),
                    scraper::build_fetcher(&config.scraper)?,
                    Arc::clone(&store),
                )),
                RunnerKind::ChildProcess => {
                    Arc::new(ChildProcessRunner::current_exe(Arc::clone(&store))?)
                }
            };
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let state = AppState {
                store,
                controller: Arc::new(RefreshController::new(runner)),
            };
            server::serve(&bind, state).await?;
        }

        Command::Channels => match store.load()? {
            Some(results) if !results.is_empty() => {
                println!("{} channels:", results.len());
                for r in &results {
                    println!("  {:<32} {}", r.name, r.stream_url);
                }
            }
            Some(_) => println!("Channel list is empty."),
            None => println!("No channel data — run `channel-indexer scrape` first."),
        },
    }

    Ok(())
}
