//! Freshness cache: decides from existing output file names whether a
//! (key, category) pair was scraped recently enough to skip.

use super::Category;
use crate::config::PipelineConfig;
use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Freshness {
    root: PathBuf,
    detail_days: u64,
    platform_days: u64,
}

impl Freshness {
    pub fn new(root: impl Into<PathBuf>, detail_days: u64, platform_days: u64) -> Self {
        Self {
            root: root.into(),
            detail_days,
            platform_days,
        }
    }

    pub fn from_config(root: impl Into<PathBuf>, cfg: &PipelineConfig) -> Self {
        Self::new(
            root,
            cfg.detail_horizon_days.max(0) as u64,
            cfg.platform_horizon_days.max(0) as u64,
        )
    }

    /// Horizon in days.
    pub fn horizon(&self, category: Category) -> u64 {
        if category.is_platform() { self.platform_days } else { self.detail_days }
    }

    /// True when a file for `key` is dated within `[today - horizon, today]`.
    pub fn is_fresh(&self, key: &str, category: Category, today: NaiveDate) -> Result<bool> {
        Ok(self.latest(key, category, today)?.is_some())
    }

    /// Most recent in-horizon file for `key`, if any.
    pub fn latest(&self, key: &str, category: Category, today: NaiveDate) -> Result<Option<PathBuf>> {
        let dir = self.root.join(category.subfolder());
        if !dir.is_dir() {
            return Ok(None);
        }

        let pattern = name_pattern(key, category)?;
        let oldest = today
            .checked_sub_days(Days::new(self.horizon(category)))
            .unwrap_or(NaiveDate::MIN);

        let mut best: Option<(NaiveDate, PathBuf)> = None;
        for entry in std::fs::read_dir(&dir).with_context(|| format!("Failed to list {:?}", dir))? {
            let path = entry?.path();
            let Some(date) = file_date(&pattern, &path) else { continue };
            if date < oldest || date > today {
                continue;
            }
            if best.as_ref().is_none_or(|(d, _)| date > *d) {
                best = Some((date, path));
            }
        }

        if let Some((date, path)) = &best {
            debug!("{} {}: fresh file dated {} ({:?})", category, key, date, path);
        }
        Ok(best.map(|(_, p)| p))
    }
}

fn name_pattern(key: &str, category: Category) -> Result<Regex> {
    let key = regex::escape(key);
    let tag = regex::escape(category.tag());
    let date = r"(\d{4}-\d{2}-\d{2})";

    let pattern = if category.is_batch() {
        format!(r"^{tag}_\({key}\)_{date}\.csv$")
    } else if tag.is_empty() {
        format!(r"^{key}_{date}\.csv$")
    } else {
        format!(r"^{key}_{tag}_{date}\.csv$")
    };
    Regex::new(&pattern).with_context(|| format!("Bad file pattern {:?}", pattern))
}

fn file_date(pattern: &Regex, path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let caps = pattern.captures(name)?;
    NaiveDate::parse_from_str(caps.get(1)?.as_str(), "%Y-%m-%d").ok()
}
