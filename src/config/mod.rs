use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub browser: BrowserConfig,
    pub retry: RetryConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub sources: SourceConfig,
}

/// Browser session configuration. Nothing machine-specific is hard-coded:
/// the binary and the profile root come from here or fall back to defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chromium/Chrome executable. `None` lets the driver auto-detect it.
    pub browser_binary_path: Option<PathBuf>,

    /// Root directory under which every session gets its own profile dir.
    /// `None` uses the system temp directory.
    pub driver_path: Option<PathBuf>,

    pub user_agent_pool_size: usize,
    pub headless: bool,
    pub page_load_timeout_secs: u64,
    pub element_wait_secs: u64,
    pub language: String,
}

/// Backoff tracks of the retry controller.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub soft_initial_secs: u64,
    pub soft_max_retries: usize,
    pub connectivity_initial_secs: u64,
    pub connectivity_max_retries: usize,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub concurrency: usize,
    /// Titles released before this year are not scraped. `None` keeps all.
    pub min_year: Option<i32>,
    /// Stop after this many non-empty batches. `None` runs the whole input.
    pub max_batches: Option<usize>,
    pub detail_horizon_days: i64,
    pub platform_horizon_days: i64,
}

/// Where pages live and how the aggregator feed is paced.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    pub imdb_base_url: String,
    pub justwatch_base_url: String,
    pub default_platform: String,
    pub scroll_count: usize,
    pub scroll_pause_secs: u64,
    pub platform_pause_every: usize,
    pub platform_pause_secs: u64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            browser_binary_path: None,
            driver_path: None,
            user_agent_pool_size: 100,
            headless: true,
            page_load_timeout_secs: 50,
            element_wait_secs: 5,
            language: "en-US".to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            soft_initial_secs: 3,
            soft_max_retries: 10,
            connectivity_initial_secs: 30,
            connectivity_max_retries: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            concurrency: 4,
            min_year: Some(2024),
            max_batches: Some(1),
            detail_horizon_days: 14,
            platform_horizon_days: 2,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            imdb_base_url: "https://www.imdb.com".to_string(),
            justwatch_base_url: "https://www.justwatch.com".to_string(),
            default_platform: "netflix".to_string(),
            scroll_count: 15,
            scroll_pause_secs: 3,
            platform_pause_every: 50,
            platform_pause_secs: 300,
        }
    }
}

impl BrowserConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn element_wait(&self) -> Duration {
        Duration::from_secs(self.element_wait_secs)
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("HARVEST").separator("__"))
            .build()
            .context("Failed to read configuration sources")?;

        cfg.try_deserialize()
            .context("Invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_backoff_tracks() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.retry.soft_initial_secs, 3);
        assert_eq!(cfg.retry.soft_max_retries, 10);
        assert_eq!(cfg.retry.connectivity_initial_secs, 30);
        assert_eq!(cfg.retry.connectivity_max_retries, 5);
        assert_eq!(cfg.pipeline.batch_size, 20);
        assert_eq!(cfg.browser.user_agent_pool_size, 100);
    }

    #[test]
    fn partial_source_keeps_other_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[pipeline]\nbatch_size = 5\n\n[browser]\nheadless = false\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.pipeline.batch_size, 5);
        assert_eq!(cfg.pipeline.detail_horizon_days, 14);
        assert!(!cfg.browser.headless);
        assert_eq!(cfg.browser.page_load_timeout(), Duration::from_secs(50));
        assert_eq!(cfg.sources.default_platform, "netflix");
    }
}
