//! CSV loader for the merged title table (`tconst, title_yr, …`).
//!
//! The table is produced upstream with episodes already folded into their
//! parent series. Rows are read in fixed-size chunks; each chunk becomes one
//! numbered batch, even when filtering leaves it empty, so batch numbers stay
//! stable between runs over the same input.

use crate::models::EntityId;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Deserialize)]
struct InputRow {
    tconst: Option<String>,
    title_yr: Option<String>,
}

/// One chunk of the input after filtering. `index` is 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub index: usize,
    pub ids: Vec<EntityId>,
}

/// "2024" → 2024 | "\N" → None | "2024.0" → 2024
pub fn parse_year(s: &str) -> Option<i32> {
    let s = s.trim();
    if s.is_empty() || s == "\\N" {
        return None;
    }
    s.parse::<i32>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().filter(|y| y.fract() == 0.0).map(|y| y as i32))
}

/// Read `path` in chunks of `batch_size` rows. Ids released before
/// `min_year` (or of unknown year, when a minimum is set) are dropped and
/// duplicates within a chunk are removed, keeping first occurrence.
pub fn load_batches(path: &Path, batch_size: usize, min_year: Option<i32>) -> Result<Vec<Batch>> {
    if batch_size == 0 {
        bail!("batch_size must be at least 1");
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open input {:?}", path))?;

    let headers = reader.headers()?.clone();
    if !headers.iter().any(|h| h == "tconst") {
        bail!("Input {:?} has no tconst column", path);
    }

    let mut batches = Vec::new();
    let mut chunk: Vec<InputRow> = Vec::with_capacity(batch_size);
    let mut rows = 0usize;

    for (i, result) in reader.deserialize::<InputRow>().enumerate() {
        // A bad record still takes its slot, so later chunks keep their bounds.
        let row = result.unwrap_or_else(|e| {
            warn!("Row {} in {:?}: {}", i + 1, path, e);
            InputRow::default()
        });
        rows += 1;
        chunk.push(row);
        if chunk.len() == batch_size {
            batches.push(filter_chunk(batches.len() + 1, std::mem::take(&mut chunk), min_year));
        }
    }
    if !chunk.is_empty() {
        batches.push(filter_chunk(batches.len() + 1, chunk, min_year));
    }

    let kept: usize = batches.iter().map(|b| b.ids.len()).sum();
    info!("{:?}: {} rows, {} batches, {} ids kept", path, rows, batches.len(), kept);
    Ok(batches)
}

fn filter_chunk(index: usize, rows: Vec<InputRow>, min_year: Option<i32>) -> Batch {
    let mut seen = HashSet::new();
    let ids: Vec<EntityId> = rows
        .into_iter()
        .filter(|r| match min_year {
            Some(min) => r.title_yr.as_deref().and_then(parse_year).is_some_and(|y| y >= min),
            None => true,
        })
        .filter_map(|r| r.tconst)
        .map(EntityId::new)
        .filter(|id| !id.as_str().is_empty())
        .filter(|id| seen.insert(id.clone()))
        .collect();

    debug!("Batch {}: {} ids", index, ids.len());
    Batch { index, ids }
}
