//! Batch coordinator: ties loader → scraper → storage together.
//!
//! ## Run modes
//!
//! `run()`: title mode (default, cron use)
//!   1. Read the merged title table in batches of `batch_size`
//!   2. Per batch: main pages → `Main/main_({i})_{date}.csv`
//!   3. Titles that can be streamed or rented: awards, release info, credits
//!   Idempotent within the freshness horizon: a re-run skips fresh outputs.
//!
//! `run_platforms()`: aggregator mode: provider index, then one "new"
//!   feed per provider.

use crate::config::{PipelineConfig, SourceConfig};
use crate::loader::load_batches;
use crate::models::{EntityId, MainRow};
use crate::scraper::{ScrapeStatus, Scraper};
use crate::storage::Category;
use crate::utils::Timer;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct Pipeline {
    scraper: Arc<Scraper>,
    config: PipelineConfig,
    sources: SourceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// A fresh main file exists for this batch.
    Skipped,
    Completed(BatchStats),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub main_rows: usize,
    /// Titles with neither a streaming nor a rent option.
    pub excluded: usize,
    pub secondary: usize,
    pub errors: usize,
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    pub batches_run: usize,
    pub batches_skipped: usize,
    pub titles: usize,
    pub errors: usize,
}

#[derive(Debug, Default)]
pub struct PlatformStats {
    pub platforms: usize,
    pub saved: usize,
    pub errors: usize,
}

impl Pipeline {
    pub fn new(scraper: Arc<Scraper>, config: PipelineConfig, sources: SourceConfig) -> Self {
        Self { scraper, config, sources }
    }

    pub async fn run(&self, input: &Path, today: NaiveDate) -> Result<PipelineStats> {
        let batches = load_batches(input, self.config.batch_size, self.config.min_year)
            .with_context(|| format!("Failed to read {:?}", input))?;

        let mut stats = PipelineStats::default();
        for batch in batches {
            if self.config.max_batches.is_some_and(|max| stats.batches_run >= max) {
                info!("Reached max_batches ({}), stopping", stats.batches_run);
                break;
            }
            if batch.ids.is_empty() {
                info!("There is no title in batch {} after filtering", batch.index);
                continue;
            }

            info!("=== Batch {}: {} titles ===", batch.index, batch.ids.len());
            let _timer = Timer::start(format!("batch {}", batch.index));
            stats.titles += batch.ids.len();

            match self.run_batch(batch.index, &batch.ids, today).await? {
                BatchOutcome::Skipped => stats.batches_skipped += 1,
                BatchOutcome::Completed(b) => {
                    stats.batches_run += 1;
                    stats.errors += b.errors;
                }
            }
        }

        info!(
            "=== Done: {} batches run | {} skipped | {} titles | {} errors ===",
            stats.batches_run, stats.batches_skipped, stats.titles, stats.errors
        );
        Ok(stats)
    }

    pub async fn run_batch(&self, index: usize, ids: &[EntityId], today: NaiveDate) -> Result<BatchOutcome> {
        let key = index.to_string();
        if self.scraper.freshness().is_fresh(&key, Category::MainBatch, today)? {
            info!("Main page file for batch {} exists!", index);
            return Ok(BatchOutcome::Skipped);
        }

        let mut stats = BatchStats::default();

        // ── 1. Main pages ─────────────────────────────────────────────────────
        let excluded: HashSet<EntityId> = match self.main_step(index, ids, today).await {
            Ok((rows, errors)) => {
                stats.main_rows = rows.len();
                stats.errors += errors;
                rows.iter()
                    .filter(|r| !r.is_stream_available())
                    .map(|r| EntityId::new(r.tconst.as_str()))
                    .collect()
            }
            Err(e) => {
                warn!("Batch {} main page step failed: {:#}. Scraping details for every title", index, e);
                stats.errors += 1;
                HashSet::new()
            }
        };
        stats.excluded = excluded.len();

        // ── 2. Awards and details for titles that can be watched ───────────────
        let remaining: Vec<EntityId> = ids.iter().filter(|id| !excluded.contains(*id)).cloned().collect();
        if remaining.is_empty() {
            info!("No title in batch {} has a streaming option", index);
        } else {
            info!("Batch {}: {} titles for awards and details", index, remaining.len());
        }
        stats.secondary = remaining.len();
        stats.errors += self.secondary_step(&remaining, today).await;

        info!(
            "Batch {} done: {} main rows | {} excluded | {} detailed | {} errors",
            index, stats.main_rows, stats.excluded, stats.secondary, stats.errors
        );
        Ok(BatchOutcome::Completed(stats))
    }

    /// One worker per id. Rows come back in input order; failed workers
    /// leave no row.
    async fn main_step(&self, index: usize, ids: &[EntityId], today: NaiveDate) -> Result<(Vec<MainRow>, usize)> {
        let sem = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::new();

        for id in ids {
            let task_id = id.clone();
            let scraper = Arc::clone(&self.scraper);
            let sem = Arc::clone(&sem);

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire().await?;
                scraper
                    .scrape_main(&task_id)
                    .await
                    .with_context(|| format!("scrape_main({})", task_id))
            });
            handles.push((id.clone(), handle));
        }

        let mut rows = Vec::with_capacity(ids.len());
        let mut errors = 0usize;
        for (id, handle) in handles {
            match handle.await {
                Ok(Ok(row)) => rows.push(row),
                Ok(Err(e)) => { warn!("{}: {:#}", id, e); errors += 1; }
                Err(e) => { error!("Task panic for {}: {}", id, e); errors += 1; }
            }
        }

        let path = self
            .scraper
            .sink()
            .write(Category::MainBatch, &index.to_string(), today, &rows)
            .with_context(|| format!("Failed to save main file for batch {}", index))?;
        info!("Main file for batch {} saved ({} rows) → {:?}", index, rows.len(), path);
        Ok((rows, errors))
    }

    /// One award worker and one detail worker per id, all sharing one
    /// permit pool. Returns the error count.
    async fn secondary_step(&self, ids: &[EntityId], today: NaiveDate) -> usize {
        let sem = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut awards = Vec::new();
        let mut details = Vec::new();

        for id in ids {
            let (task_id, scraper, permits) = (id.clone(), Arc::clone(&self.scraper), Arc::clone(&sem));
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire().await?;
                scraper
                    .save_awards(&task_id, today)
                    .await
                    .with_context(|| format!("save_awards({})", task_id))
            });
            awards.push((id.clone(), handle));

            let (task_id, scraper, permits) = (id.clone(), Arc::clone(&self.scraper), Arc::clone(&sem));
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire().await?;
                scraper
                    .save_details(&task_id, today)
                    .await
                    .with_context(|| format!("save_details({})", task_id))
            });
            details.push((id.clone(), handle));
        }

        join_all_logged("awards", awards).await + join_all_logged("details", details).await
    }

    /// Provider index, then the "new" feed of providers `from..to` (by
    /// position in the index). Pauses every `platform_pause_every` feeds.
    pub async fn run_platforms(&self, from: usize, to: Option<usize>, today: NaiveDate) -> Result<PlatformStats> {
        let index = self.scraper.provider_index(today).await?;
        let to = to.unwrap_or(index.len()).min(index.len());
        let feeds = index.get(from.min(to)..to).unwrap_or_default();

        let pause = Duration::from_secs(self.sources.platform_pause_secs);
        let mut stats = PlatformStats::default();

        for (i, row) in feeds.iter().enumerate() {
            if self.sources.platform_pause_every > 0 && (i + 1) % self.sources.platform_pause_every == 0 {
                info!("Pausing {:?} after {} feeds", pause, i);
                tokio::time::sleep(pause).await;
            }
            info!("Navigating to {}...", row.href_justwatch);
            stats.platforms += 1;
            match self.scraper.save_new_content(&row.href_justwatch, today).await {
                Ok(ScrapeStatus::Saved) => stats.saved += 1,
                Ok(status) => info!("{}: {}", row.href_justwatch, status),
                Err(e) => { warn!("{}: {:#}", row.href_justwatch, e); stats.errors += 1; }
            }
        }

        info!(
            "=== Done: {} feeds | {} saved | {} errors ===",
            stats.platforms, stats.saved, stats.errors
        );
        Ok(stats)
    }
}

/// Await every handle in order, logging outcomes. Returns the number of
/// workers that errored or panicked.
async fn join_all_logged<T: fmt::Display>(job: &str, handles: Vec<(EntityId, JoinHandle<Result<T>>)>) -> usize {
    let mut errors = 0usize;
    for (id, handle) in handles {
        match handle.await {
            Ok(Ok(status)) => info!("{}: {} {}", id, job, status),
            Ok(Err(e)) => { warn!("{}: {:#}", id, e); errors += 1; }
            Err(e) => { error!("Task panic for {} {}: {}", id, job, e); errors += 1; }
        }
    }
    errors
}
