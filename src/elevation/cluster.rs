use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use log::info;
use netgraph::graphml::load_graphml;
use polars::prelude::*;
use rstar::{RTree, primitives::GeomWithData};

use crate::config::Config;
use crate::io::write_csv;
use crate::layout::{graph_files, pending, stem_of};
use crate::pool::run_tasks;

/// Google Elevation API limit on locations per request.
pub const MAX_CLUSTER_SIZE: usize = 512;

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Corners and edge midpoints of the points' bounding box, clockwise from
/// the top-left corner. Midpoints use the mean coordinate.
fn perimeter_points(points: &[[f64; 2]]) -> [[f64; 2]; 8] {
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
    let (mut sum_x, mut sum_y) = (0.0, 0.0);
    for &[x, y] in points {
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
        sum_x += x;
        sum_y += y;
    }
    let n = points.len() as f64;
    let (mean_x, mean_y) = (sum_x / n, sum_y / n);
    [
        [min_x, max_y], [mean_x, max_y], [max_x, max_y], [max_x, mean_y],
        [max_x, min_y], [mean_x, min_y], [min_x, min_y], [min_x, mean_y],
    ]
}

/// Group points into nearest-neighbour clusters of at most `max_size`.
///
/// Clusters are peeled off the outside in: while too many points remain, the
/// remaining point nearest the next perimeter point and its nearest remaining
/// neighbours form a cluster. Whatever is left forms the last cluster.
/// Returns point indices per cluster.
pub fn cluster_points(points: &[[f64; 2]], max_size: usize) -> Vec<Vec<usize>> {
    if points.is_empty() || max_size == 0 { return Vec::new() }

    let perimeter = perimeter_points(points);
    let mut tree = RTree::bulk_load(
        points.iter().enumerate().map(|(i, &p)| IndexedPoint::new(p, i)).collect(),
    );

    let mut clusters: Vec<Vec<usize>> = Vec::new();
    while tree.size() > max_size {
        let anchor = perimeter[clusters.len() % perimeter.len()];
        let Some(start) = tree.nearest_neighbor(&anchor).map(|p| *p.geom()) else { break };
        let members: Vec<IndexedPoint> = tree.nearest_neighbor_iter(&start).take(max_size).cloned().collect();
        for member in &members { tree.remove(member); }
        clusters.push(members.into_iter().map(|m| m.data).collect());
    }

    let mut rest: Vec<usize> = tree.iter().map(|p| p.data).collect();
    if !rest.is_empty() {
        rest.sort_unstable();
        clusters.push(rest);
    }
    clusters
}

/// Clusters CSV path for a graph file.
pub fn clusters_path(config: &Config, graph_path: &Path) -> Result<PathBuf> {
    Ok(config.elevation_nodeclusters_path.join(format!("{}.csv", stem_of(graph_path)?)))
}

fn cluster_graph(graph_path: &Path, out_path: &Path) -> Result<usize> {
    let graph = load_graphml(graph_path)
        .with_context(|| format!("[cluster] Failed to load {}", graph_path.display()))?;
    let stem = stem_of(graph_path)?;
    let points: Vec<[f64; 2]> = graph.nodes().iter().map(|n| [n.x, n.y]).collect();
    let clusters = cluster_points(&points, MAX_CLUSTER_SIZE);

    let mut labels = vec![String::new(); points.len()];
    for (count, members) in clusters.iter().enumerate() {
        ensure!(members.len() <= MAX_CLUSTER_SIZE, "[cluster] Cluster {count} of {stem} is too large");
        for &i in members { labels[i] = format!("{stem}_{count}") }
    }
    ensure!(labels.iter().all(|l| !l.is_empty()), "[cluster] Some nodes of {stem} have no cluster");

    let nodes = graph.nodes();
    let mut df = DataFrame::new(vec![
        Column::new("osmid".into(), nodes.iter().map(|n| n.osmid).collect::<Vec<_>>()),
        Column::new("x".into(), nodes.iter().map(|n| n.x).collect::<Vec<_>>()),
        Column::new("y".into(), nodes.iter().map(|n| n.y).collect::<Vec<_>>()),
        Column::new("cluster".into(), labels),
    ])?;
    write_csv(&mut df, out_path)?;
    info!("[cluster] Clustered {stem} {} nodes into {} clusters", nodes.len(), clusters.len());
    Ok(clusters.len())
}

/// Write a node clusters CSV for every graph that doesn't have one yet.
/// Returns the number of graphs clustered.
pub fn cluster_nodes(config: &Config) -> Result<usize> {
    let graphs = graph_files(&config.models_graphml_path)?;
    let todo = pending(graphs, |p| clusters_path(config, p))?;
    info!("[cluster] Clustering nodes from {} remaining graph files", todo.len());
    let done = run_tasks("cluster", config.workers(), todo, |(graph_path, out_path)| {
        cluster_graph(graph_path, out_path)
    })?;
    Ok(done.len())
}
