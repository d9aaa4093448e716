use std::path::Path;

use ahash::{AHashMap, AHashSet};
use anyhow::{Context, Result, ensure};
use log::info;
use netgraph::graphml::load_graphml;
use polars::prelude::*;

use crate::config::Config;
use crate::io::{save_graph, write_csv};
use crate::layout::graph_files;
use crate::pool::run_tasks;

use super::google::load_google_elevations;
use super::raster::RasterSource;
use super::reconcile::ElevationRecord;

/// Reconcile every node's elevation, recompute edge grades and save the graph.
/// Fails without saving if any node ends up without an elevation.
pub fn attach_to_graph(path: &Path, google: &AHashMap<i64, f64>) -> Result<Vec<ElevationRecord>> {
    let mut graph = load_graphml(path).with_context(|| format!("[attach] Failed to load {}", path.display()))?;
    let records: Vec<ElevationRecord> = graph.nodes().iter()
        .map(|n| ElevationRecord::new(n.osmid, n.elevation_aster, n.elevation_srtm, google.get(&n.osmid).copied()))
        .collect();

    let missing = records.iter().filter(|r| r.elevation.is_none()).count();
    ensure!(missing == 0, "[attach] {missing} nodes of {} have no elevation", path.display());

    for (node, record) in graph.nodes_mut().iter_mut().zip(&records) {
        node.elevation = record.elevation;
    }
    graph.add_edge_grades()?;
    save_graph(&graph, path).with_context(|| format!("[attach] Failed to save {}", path.display()))?;
    Ok(records)
}

fn records_frame(records: &[ElevationRecord]) -> Result<DataFrame> {
    Ok(DataFrame::new(vec![
        Column::new("osmid".into(), records.iter().map(|r| r.osmid).collect::<Vec<_>>()),
        Column::new("elevation".into(), records.iter().map(|r| r.elevation).collect::<Vec<_>>()),
        Column::new("elevation_aster".into(), records.iter().map(|r| r.aster).collect::<Vec<_>>()),
        Column::new("elevation_srtm".into(), records.iter().map(|r| r.srtm).collect::<Vec<_>>()),
        Column::new("elevation_google".into(), records.iter().map(|r| r.google).collect::<Vec<_>>()),
    ])?)
}

/// Set the reconciled elevation and edge grades on every graph and save
/// each node's elevation details. Returns the number of graphs updated.
pub fn attach_elevations(config: &Config) -> Result<usize> {
    let google = load_google_elevations(&config.elevation_google_elevations_path)?;
    info!("[attach] Loaded {} Google node elevations", google.len());

    let graphs = graph_files(&config.models_graphml_path)?;
    let per_graph = run_tasks("attach", config.workers(), graphs, |path| attach_to_graph(path, &google))?;
    let updated = per_graph.len();

    let mut seen = AHashSet::new();
    let mut records: Vec<ElevationRecord> = per_graph.into_iter().flatten()
        .filter(|r| seen.insert(r.osmid))
        .collect();
    records.sort_by_key(|r| r.osmid);

    let srtm = records.iter().filter(|r| r.source == Some(RasterSource::Srtm)).count();
    let share = if records.is_empty() { 0.0 } else { 100.0 * srtm as f64 / records.len() as f64 };
    info!("[attach] {share:.2}% of {} nodes use SRTM elevation", records.len());

    write_csv(&mut records_frame(&records)?, &config.elevation_final_path)?;
    info!("[attach] Updated {updated} graphs and saved node elevations to {}", config.elevation_final_path.display());
    Ok(updated)
}
