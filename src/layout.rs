//! File naming and resume helpers shared by every stage.
//!
//! Each urban center maps to `{country}-{iso}/{name}-{uc_id}.{ext}` under a
//! per-format root. Stages resume by skipping items whose output exists.

use std::path::{Path, PathBuf};

use ahash::AHashSet;
use anyhow::{Context, Result, anyhow};

use crate::common::{file_size, files_at_depth};
use crate::io::{i64_values, read_csv};

/// Folder name grouping one country's files.
pub fn country_folder(country: &str, country_iso: &str) -> String {
    format!("{country}-{country_iso}")
}

/// File stem identifying one urban center.
pub fn city_stem(name: &str, uc_id: i64) -> String {
    format!("{name}-{uc_id}")
}

/// Recover the urban center id from a file stem such as `paris-1234`.
pub fn uc_id_from_stem(stem: &str) -> Result<i64> {
    stem.rsplit_once('-')
        .and_then(|(_, id)| id.parse().ok())
        .ok_or_else(|| anyhow!("[layout] Cannot parse urban center id from {stem:?}"))
}

/// File stem of a path as a string.
pub fn stem_of(path: &Path) -> Result<&str> {
    path.file_stem().and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("[layout] Invalid file name {}", path.display()))
}

/// Name of the directory containing a path, i.e. its country folder.
pub fn country_of(path: &Path) -> Result<&str> {
    path.parent().and_then(Path::file_name).and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("[layout] No country folder for {}", path.display()))
}

/// Every `*/*.graphml` file under `root`, sorted by path.
pub fn graph_files(root: &Path) -> Result<Vec<PathBuf>> {
    files_at_depth(root, 2, "graphml")
        .with_context(|| format!("[layout] Failed to list graph files in {}", root.display()))
}

/// Order paths from smallest to largest file.
pub fn sort_by_size(mut paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.sort_by_cached_key(|p| file_size(p));
    paths
}

/// Pair each input with its output path, keeping only pairs whose output is missing.
pub fn pending(inputs: Vec<PathBuf>, output_for: impl Fn(&Path) -> Result<PathBuf>) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut todo = Vec::new();
    for input in inputs {
        let output = output_for(&input)?;
        if !output.is_file() { todo.push((input, output)) }
    }
    Ok(todo)
}

/// Mirror a graph file into another format root: `root/{country}/{stem}{suffix}`.
pub fn mirror_path(graph_path: &Path, root: &Path, suffix: &str) -> Result<PathBuf> {
    Ok(root.join(country_of(graph_path)?).join(format!("{}{suffix}", stem_of(graph_path)?)))
}

/// Urban center ids already present in a results CSV, empty if it doesn't exist yet.
pub fn done_uc_ids(results_path: &Path) -> Result<AHashSet<i64>> {
    if !results_path.is_file() { return Ok(AHashSet::new()) }
    let df = read_csv(results_path)?;
    Ok(i64_values(&df, "uc_id")?.into_iter().collect())
}
