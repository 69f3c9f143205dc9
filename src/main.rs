mod config;
mod loader;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;
use crate::models::EntityId;
use crate::pipeline::Pipeline;
use crate::scraper::Scraper;
use crate::scraper::browser::ChromeFactory;
use crate::storage::Category;

#[derive(Parser)]
#[command(name = "title-harvest", about = "IMDb and JustWatch title scraper", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape main pages, awards and details for the merged title table
    Run {
        /// Merged title table (tconst, title_yr, …)
        #[arg(short, long, default_value = "imdb_merged.csv")]
        input: PathBuf,

        /// Stop after this many non-empty batches
        #[arg(long)]
        max_batches: Option<usize>,

        /// Process every batch, ignoring `max_batches` from config
        #[arg(long, conflicts_with = "max_batches")]
        all: bool,
    },

    /// Scrape one title's main page and print the row
    Main { id: String },

    /// Scrape one title's awards
    Awards { id: String },

    /// Scrape one title's release info and company credits
    Details { id: String },

    /// Provider index, then each provider's new-content feed
    Justwatch {
        /// First provider (position in the index)
        #[arg(long, default_value_t = 0)]
        from: usize,

        /// Stop before this provider
        #[arg(long)]
        to: Option<usize>,
    },

    /// Show whether a recent output file exists for a key
    Fresh {
        key: String,

        /// award-general | award-detail | release | distribution | production | main | new-content | provider-index
        category: Category,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "title_harvest=info,warn",
        1 => "title_harvest=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let mut config = AppConfig::load()?;
    let today = utils::today();

    let build = |config: &AppConfig| -> Result<Arc<Scraper>> {
        let factory = Arc::new(ChromeFactory::new(&config.browser));
        Ok(Arc::new(Scraper::new(factory, config)?))
    };

    match cli.command {
        Command::Run { input, max_batches, all } => {
            let _t = utils::Timer::start("Title run");
            if all {
                config.pipeline.max_batches = None;
            } else if max_batches.is_some() {
                config.pipeline.max_batches = max_batches;
            }
            let scraper = build(&config)?;
            let stats = Pipeline::new(scraper, config.pipeline, config.sources)
                .run(&input, today)
                .await?;
            info!(
                "Done: {} batches, {} skipped, {} titles, {} errors",
                stats.batches_run, stats.batches_skipped, stats.titles, stats.errors
            );
        }

        Command::Main { id } => {
            let scraper = build(&config)?;
            let row = scraper.scrape_main(&EntityId::new(id)).await?;
            println!("{:#?}", row);
            println!("stream available: {}", row.is_stream_available());
        }

        Command::Awards { id } => {
            let _t = utils::Timer::start(format!("{id} awards"));
            let scraper = build(&config)?;
            let status = scraper.save_awards(&EntityId::new(id.as_str()), today).await?;
            println!("{}: awards {}", id, status);
        }

        Command::Details { id } => {
            let _t = utils::Timer::start(format!("{id} details"));
            let scraper = build(&config)?;
            let status = scraper.save_details(&EntityId::new(id.as_str()), today).await?;
            println!("{}: release {} | credits {}", id, status.release, status.credits);
        }

        Command::Justwatch { from, to } => {
            let _t = utils::Timer::start("JustWatch run");
            let scraper = build(&config)?;
            let stats = Pipeline::new(scraper, config.pipeline, config.sources)
                .run_platforms(from, to, today)
                .await?;
            info!(
                "Done: {} feeds, {} saved, {} errors",
                stats.platforms, stats.saved, stats.errors
            );
        }

        Command::Fresh { key, category } => {
            let freshness = storage::freshness::Freshness::from_config(
                &config.storage.output_dir,
                &config.pipeline,
            );
            match freshness.latest(&key, category, today)? {
                Some(path) => println!("{} {}: fresh ({})", category, key, path.display()),
                None => println!(
                    "{} {}: stale (horizon {} days)",
                    category,
                    key,
                    freshness.horizon(category)
                ),
            }
        }
    }

    Ok(())
}
