//! Flat-file persistence: one CSV per (category, key, date).
//!
//! Every write is all-or-nothing: rows go to a hidden temp file in the target
//! directory which is renamed into place once flushed.

pub mod freshness;

use crate::models::Row;
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

// ── Categories ────────────────────────────────────────────────────────────────

/// Output kinds. Each has a fixed subfolder and a tag embedded in file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    AwardGeneral,
    AwardDetail,
    Release,
    Distribution,
    Production,
    MainBatch,
    NewContent,
    ProviderIndex,
}

impl Category {
    pub fn subfolder(self) -> &'static str {
        match self {
            Category::AwardGeneral | Category::AwardDetail => "Award",
            Category::Release => "Release",
            Category::Distribution | Category::Production => "Company Credit",
            Category::MainBatch => "Main",
            Category::NewContent | Category::ProviderIndex => "New_Content",
        }
    }

    /// Tag between key and date. Empty for `{key}_{date}.csv` names.
    pub fn tag(self) -> &'static str {
        match self {
            Category::AwardGeneral => "gen",
            Category::AwardDetail => "",
            Category::Release => "release",
            Category::Distribution => "distribution",
            Category::Production => "pro",
            Category::MainBatch => "main",
            Category::NewContent => "new",
            Category::ProviderIndex => "",
        }
    }

    /// Batch files put the key (batch index) after the tag: `main_(3)_…`.
    pub fn is_batch(self) -> bool {
        matches!(self, Category::MainBatch)
    }

    /// Aggregator outputs change daily and go stale much faster.
    pub fn is_platform(self) -> bool {
        matches!(self, Category::NewContent | Category::ProviderIndex)
    }

    pub fn file_name(self, key: &str, date: NaiveDate) -> String {
        self.build_name(key, self.tag(), date)
    }

    /// Name of the failure marker. Its tag never matches the freshness
    /// pattern, so a failed title is retried on the next run.
    pub fn failure_file_name(self, key: &str, date: NaiveDate) -> String {
        let tag = match self.tag() {
            "" => "failed".to_string(),
            t => format!("{t}_failed"),
        };
        self.build_name(key, &tag, date)
    }

    fn build_name(self, key: &str, tag: &str, date: NaiveDate) -> String {
        let date = date.format("%Y-%m-%d");
        if self.is_batch() {
            format!("{tag}_({key})_{date}.csv")
        } else if tag.is_empty() {
            format!("{key}_{date}.csv")
        } else {
            format!("{key}_{tag}_{date}.csv")
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::AwardGeneral => "award-general",
            Category::AwardDetail => "award-detail",
            Category::Release => "release",
            Category::Distribution => "distribution",
            Category::Production => "production",
            Category::MainBatch => "main",
            Category::NewContent => "new-content",
            Category::ProviderIndex => "provider-index",
        };
        f.write_str(s)
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_lowercase().as_str() {
            "award-general" | "gen" => Category::AwardGeneral,
            "award-detail" | "award" => Category::AwardDetail,
            "release" => Category::Release,
            "distribution" => Category::Distribution,
            "production" | "pro" => Category::Production,
            "main" => Category::MainBatch,
            "new-content" | "new" => Category::NewContent,
            "provider-index" => Category::ProviderIndex,
            other => bail!("unknown category {:?}", other),
        })
    }
}

// ── Sink ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CsvSink {
    root: PathBuf,
}

impl CsvSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, category: Category) -> PathBuf {
        self.root.join(category.subfolder())
    }

    pub fn path(&self, category: Category, key: &str, date: NaiveDate) -> PathBuf {
        self.dir(category).join(category.file_name(key, date))
    }

    /// Write `rows` to `{subfolder}/{key…}_{date}.csv`. The header is written
    /// even when `rows` is empty.
    pub fn write<T: Row>(
        &self,
        category: Category,
        key: &str,
        date: NaiveDate,
        rows: &[T],
    ) -> Result<PathBuf> {
        let path = self.path(category, key, date);
        write_atomic(&path, rows)?;
        debug!("{} {}: {} rows → {:?}", category, key, rows.len(), path);
        Ok(path)
    }

    /// Write a failure marker for a scrape that exhausted its retries.
    pub fn write_failure<T: Row>(
        &self,
        category: Category,
        key: &str,
        date: NaiveDate,
        rows: &[T],
    ) -> Result<PathBuf> {
        let path = self.dir(category).join(category.failure_file_name(key, date));
        write_atomic(&path, rows)?;
        Ok(path)
    }

    pub fn read<T: Row>(&self, path: &Path) -> Result<Vec<T>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .with_context(|| format!("Failed to open {:?}", path))?;

        let mut rows = Vec::new();
        for (i, record) in reader.deserialize().enumerate() {
            let row: T = record.with_context(|| format!("Row {} in {:?}", i + 1, path))?;
            rows.push(row);
        }
        Ok(rows)
    }
}

fn write_atomic<T: Row>(path: &Path, rows: &[T]) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("No parent directory for {:?}", path))?;
    std::fs::create_dir_all(dir).with_context(|| format!("Could not create dir {:?}", dir))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Bad file name {:?}", path))?;
    let tmp = dir.join(format!(".{file_name}.tmp"));

    let result = (|| -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&tmp)
            .with_context(|| format!("Failed to create {:?}", tmp))?;
        writer.write_record(T::HEADERS)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to write {:?}", path));
    }

    std::fs::rename(&tmp, path).with_context(|| format!("Failed to move {:?} into place", path))?;
    Ok(())
}
