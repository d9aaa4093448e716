use std::{collections::BTreeSet, path::{Path, PathBuf}};

use ahash::AHashSet;
use anyhow::{Context, Result, bail};
use log::{info, warn};
use netgraph::graphml::load_graphml;

use crate::common::{files_at_depth, subdirs};
use crate::config::Config;
use crate::layout::{country_of, done_uc_ids, graph_files, stem_of, uc_id_from_stem};
use crate::pool::run_tasks;

use super::save::{EDGE_LIST, NODE_LIST};

/// Consistency of the published model files across formats.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileReport {
    /// Country folders per format: GraphML, GeoJSON, node/edge lists.
    pub countries: [usize; 3],
    /// Model files per format: GraphML, GeoJSON, node lists, edge lists.
    pub files: [usize; 4],
    pub names_match: bool,
    pub indicators_match: bool,
    /// Graphs with a node lacking elevation or an edge lacking a grade,
    /// when checked.
    pub incomplete_graphs: Option<Vec<PathBuf>>,
}

impl FileReport {
    pub fn passed(&self) -> bool {
        let [graphml, geojson, nelist] = self.countries;
        let [graphs, features, nodes, edges] = self.files;
        graphml == geojson && geojson == nelist
            && graphs == features && features == nodes && nodes == edges
            && self.names_match
            && self.indicators_match
            && self.incomplete_graphs.as_ref().is_none_or(Vec::is_empty)
    }
}

/// `country/city` names of model files.
fn names(paths: &[PathBuf]) -> Result<BTreeSet<String>> {
    paths.iter()
        .map(|p| Ok(format!("{}/{}", country_of(p)?, stem_of(p)?)))
        .collect()
}

/// `country/city` names of node or edge lists, named by their folder.
fn list_names(paths: &[PathBuf]) -> Result<BTreeSet<String>> {
    paths.iter()
        .map(|p| {
            let dir = p.parent().with_context(|| format!("[checks] No folder for {}", p.display()))?;
            Ok(format!("{}/{}", country_of(dir)?, stem_of(dir)?))
        })
        .collect()
}

fn named(paths: Vec<PathBuf>, file_name: &str) -> Vec<PathBuf> {
    paths.into_iter().filter(|p| p.file_name().is_some_and(|n| n == file_name)).collect()
}

fn graph_complete(path: &Path) -> Result<bool> {
    let graph = load_graphml(path).with_context(|| format!("[checks] Failed to load {}", path.display()))?;
    Ok(graph.nodes().iter().all(|n| n.elevation.is_some())
        && graph.edges().iter().all(|e| e.grade.is_some() && e.grade_abs.is_some()))
}

/// Compare the model files across formats and against the published
/// indicators. With `deep`, also load every graph and check that every node
/// has an elevation and every edge a grade. Fails if any check fails.
pub fn verify_files(config: &Config, deep: bool) -> Result<FileReport> {
    let graphml = graph_files(&config.models_graphml_path)?;
    let geojson = files_at_depth(&config.models_geojson_path, 2, "geojson")?;
    let lists = files_at_depth(&config.models_nelist_path, 3, "csv")?;
    let (node_lists, edge_lists) = (named(lists.clone(), NODE_LIST), named(lists, EDGE_LIST));

    let graph_names = names(&graphml)?;
    let names_match = graph_names == names(&geojson)?
        && graph_names == list_names(&node_lists)?
        && graph_names == list_names(&edge_lists)?;

    let indexed: AHashSet<i64> = done_uc_ids(&config.indicators_path)?;
    let graph_ids = graphml.iter()
        .map(|p| uc_id_from_stem(stem_of(p)?))
        .collect::<Result<AHashSet<i64>>>()?;

    let incomplete_graphs = if deep {
        let checked = run_tasks("checks", config.workers(), graphml.clone(), |p| Ok((p.clone(), graph_complete(p)?)))?;
        if checked.len() != graphml.len() { bail!("[checks] Failed to load {} graphs", graphml.len() - checked.len()) }
        Some(checked.into_iter().filter(|(_, ok)| !ok).map(|(p, _)| p).collect())
    } else {
        None
    };

    let report = FileReport {
        countries: [
            subdirs(&config.models_graphml_path)?.len(),
            subdirs(&config.models_geojson_path)?.len(),
            subdirs(&config.models_nelist_path)?.len(),
        ],
        files: [graphml.len(), geojson.len(), node_lists.len(), edge_lists.len()],
        names_match,
        indicators_match: indexed == graph_ids,
        incomplete_graphs,
    };

    info!("[checks] Country folders per format: {:?}", report.countries);
    info!("[checks] Files per format: {:?}", report.files);
    info!("[checks] Same names across formats: {}", report.names_match);
    info!("[checks] Indicator row for every graph: {}", report.indicators_match);
    if let Some(incomplete) = &report.incomplete_graphs {
        for path in incomplete { warn!("[checks] Missing elevations or grades in {}", path.display()) }
    }

    if !report.passed() { bail!("[checks] Some file checks failed: {report:?}") }
    info!("[checks] All file checks passed");
    Ok(report)
}
