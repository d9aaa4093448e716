use std::{collections::BTreeMap, io::{BufWriter, Write}, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use log::info;
use netgraph::{StreetGraph, centrality::{betweenness, normalize_betweenness}, graphml::load_graphml};

use crate::common::PendingWrite;
use crate::config::Config;
use crate::io::save_graph;
use crate::layout::{country_of, graph_files, pending, sort_by_size, stem_of};
use crate::pool::run_tasks;

/// Weight standing in for zero-length edges, which shortest paths can't use.
const MIN_WEIGHT: f64 = 0.001;

/// Length-weighted directed betweenness of every node, normalized by the
/// number of ordered node pairs not involving the node. In node order.
pub fn node_betweenness(graph: &StreetGraph) -> Vec<f64> {
    let csr = graph.out_csr(|e| if e.length == 0.0 { MIN_WEIGHT } else { e.length });
    let mut bc = betweenness(&csr);
    normalize_betweenness(&mut bc);
    bc
}

/// Betweenness JSON path for a graph file: `{country}-{stem}.json`.
pub fn bc_path(config: &Config, graph_path: &Path) -> Result<PathBuf> {
    Ok(config.node_bc_path.join(format!("{}-{}.json", country_of(graph_path)?, stem_of(graph_path)?)))
}

fn graph_bc(graph_path: &Path, out_path: &Path) -> Result<()> {
    let mut graph = load_graphml(graph_path).with_context(|| format!("[bc] Failed to load {}", graph_path.display()))?;
    let bc = node_betweenness(&graph);
    let mut by_osmid = BTreeMap::new();
    for (node, value) in graph.nodes_mut().iter_mut().zip(bc) {
        node.bc = Some(value);
        by_osmid.insert(node.osmid, value);
    }
    save_graph(&graph, graph_path).with_context(|| format!("[bc] Failed to save {}", graph_path.display()))?;

    let mut sink = PendingWrite::open(out_path, true)
        .with_context(|| format!("[bc] Failed to create {}", out_path.display()))?;
    let mut writer = BufWriter::new(&mut sink);
    serde_json::to_writer(&mut writer, &by_osmid)
        .with_context(|| format!("[bc] Failed to write {}", out_path.display()))?;
    writer.flush()?;
    drop(writer);
    sink.finalize()?;
    info!("[bc] Calculated betweenness for {}", graph_path.display());
    Ok(())
}

/// Calculate node betweenness for every graph without a saved result,
/// smallest graphs first. Returns the number of graphs processed.
pub fn calculate_node_bc(config: &Config) -> Result<usize> {
    let graphs = sort_by_size(graph_files(&config.models_graphml_path)?);
    let total = graphs.len();
    let todo = pending(graphs, |p| bc_path(config, p))?;
    info!("[bc] Calculating betweenness for {} of {total} graphs", todo.len());
    let done = run_tasks("bc", config.workers(), todo, |(graph_path, out_path)| graph_bc(graph_path, out_path))?;
    Ok(done.len())
}
