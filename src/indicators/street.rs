use std::path::Path;

use anyhow::{Context, Result, anyhow};
use log::info;
use netgraph::{
    SimpleDigraph, SimpleGraph, StreetGraph, UndirectedMultigraph,
    centrality::pagerank,
    clustering::{average_directed, average_undirected},
    consolidate::{merge_nearby, split_disconnected},
    geodesy::great_circle,
    graphml::load_graphml,
};
use polars::prelude::*;
use rand::seq::SliceRandom;

use crate::config::Config;
use crate::io::append_csv;
use crate::layout::{country_of, done_uc_ids, graph_files, stem_of, uc_id_from_stem};
use crate::pool::run_tasks;

use super::orientation::{MIN_BEARING_LENGTH_M, orientation_entropy, orientation_order, street_bearings};
use super::stats;

/// Graphs processed between checkpoints of the results CSV.
pub const CHECKPOINT_EVERY: usize = 100;
/// Intersections closer than this (meters) are merged when cleaning.
pub const CLEAN_INTERSECTION_TOL_M: f64 = 10.0;
const PAGERANK_ALPHA: f64 = 0.85;
const PAGERANK_MAX_ITER: usize = 100;
const PAGERANK_TOL: f64 = 1e-6;

/// Street network indicators of one urban center.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRow {
    pub country: String,
    pub country_iso: String,
    pub core_city: String,
    pub uc_id: i64,
    pub circuity: f64,
    pub k_avg: f64,
    pub length_mean: f64,
    pub length_median: f64,
    pub length_total: f64,
    pub street_segment_count: i64,
    pub node_count: i64,
    pub orientation_entropy: f64,
    pub orientation_order: f64,
    pub prop_4way: f64,
    pub prop_3way: f64,
    pub prop_deadend: f64,
    pub self_loop_proportion: f64,
    pub straightness: f64,
    pub bc_gini: f64,
    pub bc_max: f64,
    pub cc_avg_dir: f64,
    pub cc_wt_avg_dir: f64,
    pub pagerank_max: f64,
    pub cc_avg_undir: f64,
    pub cc_wt_avg_undir: f64,
    pub elev_iqr: f64,
    pub elev_mean: f64,
    pub elev_median: f64,
    pub elev_range: f64,
    pub elev_std: f64,
    pub grade_mean: f64,
    pub grade_median: f64,
    pub intersect_count: i64,
    pub intersect_count_clean: i64,
    pub intersect_count_clean_topo: i64,
}

/// Urban center identity from a graph path `{country}-{iso}/{city}-{uc_id}.graphml`.
pub fn graph_identity(path: &Path) -> Result<(String, String, String, i64)> {
    let folder = country_of(path)?;
    let (country, iso) = folder.rsplit_once('-')
        .ok_or_else(|| anyhow!("[indicators] Country folder {folder:?} has no ISO code"))?;
    let stem = stem_of(path)?;
    let uc_id = uc_id_from_stem(stem)?;
    let city = stem.rsplit_once('-').map_or(stem, |(city, _)| city);
    Ok((country.to_string(), iso.to_string(), city.to_string(), uc_id))
}

struct Clustering {
    cc_avg_dir: f64,
    cc_wt_avg_dir: f64,
    pagerank_max: f64,
    cc_avg_undir: f64,
    cc_wt_avg_undir: f64,
}

fn clustering(graph: &StreetGraph) -> Result<Clustering> {
    let digraph = SimpleDigraph::from_graph(graph);
    let pagerank = pagerank(&digraph, PAGERANK_ALPHA, PAGERANK_MAX_ITER, PAGERANK_TOL)?;
    let undirected = SimpleGraph::from_digraph(&digraph);
    Ok(Clustering {
        cc_avg_dir: average_directed(&digraph, false),
        cc_wt_avg_dir: average_directed(&digraph, true),
        pagerank_max: stats::max(&pagerank),
        cc_avg_undir: average_undirected(&undirected, false),
        cc_wt_avg_undir: average_undirected(&undirected, true),
    })
}

/// Compute every indicator of one graph.
pub fn graph_indicators(graph: &StreetGraph, identity: (String, String, String, i64)) -> Result<IndicatorRow> {
    let (country, country_iso, core_city, uc_id) = identity;
    let clustering = clustering(graph)?;

    let undirected = UndirectedMultigraph::from_graph(graph);
    let nodes = graph.nodes();
    let streets: Vec<&netgraph::Edge> = undirected.edges().iter().map(|e| &graph.edges()[e.edge]).collect();
    let n = nodes.len();
    let m = streets.len();

    let lengths: Vec<f64> = streets.iter().map(|e| e.length).collect();
    let length_total: f64 = lengths.iter().sum();
    let straight_total: f64 = undirected.edges().iter()
        .map(|e| great_circle(nodes[e.a].x, nodes[e.a].y, nodes[e.b].x, nodes[e.b].y))
        .filter(|d| d.is_finite())
        .sum();
    let circuity = length_total / straight_total;

    let share = |count: usize| if n == 0 { f64::NAN } else { count as f64 / n as f64 };
    let with_streets = |k: u32| nodes.iter().filter(|node| node.street_count == Some(k)).count();

    let bc: Vec<f64> = nodes.iter().filter_map(|node| node.bc).collect();
    let elevations: Vec<f64> = nodes.iter().filter_map(|node| node.elevation).collect();
    let grades: Vec<f64> = streets.iter().filter_map(|e| e.grade_abs).collect();

    let entropy = orientation_entropy(&street_bearings(graph, &undirected, MIN_BEARING_LENGTH_M));

    let clean_clusters = merge_nearby(graph, CLEAN_INTERSECTION_TOL_M);
    let topo_clusters = split_disconnected(&clean_clusters, &undirected);

    Ok(IndicatorRow {
        country,
        country_iso,
        core_city,
        uc_id,
        circuity,
        k_avg: if n == 0 { f64::NAN } else { 2.0 * m as f64 / n as f64 },
        length_mean: stats::mean(&lengths),
        length_median: stats::median(&lengths),
        length_total,
        street_segment_count: m as i64,
        node_count: n as i64,
        orientation_entropy: entropy,
        orientation_order: orientation_order(entropy),
        prop_4way: share(with_streets(4)),
        prop_3way: share(with_streets(3)),
        // dead ends meet exactly one street; simplified graphs carry no zero counts
        prop_deadend: share(with_streets(1)),
        self_loop_proportion: if m == 0 { f64::NAN } else { streets.iter().filter(|e| e.is_self_loop()).count() as f64 / m as f64 },
        straightness: 1.0 / circuity,
        bc_gini: stats::gini(&bc),
        bc_max: stats::max(&bc),
        cc_avg_dir: clustering.cc_avg_dir,
        cc_wt_avg_dir: clustering.cc_wt_avg_dir,
        pagerank_max: clustering.pagerank_max,
        cc_avg_undir: clustering.cc_avg_undir,
        cc_wt_avg_undir: clustering.cc_wt_avg_undir,
        elev_iqr: stats::iqr(&elevations),
        elev_mean: stats::mean(&elevations),
        elev_median: stats::median(&elevations),
        elev_range: stats::range(&elevations),
        elev_std: stats::std_dev(&elevations),
        grade_mean: stats::mean(&grades),
        grade_median: stats::median(&grades),
        intersect_count: nodes.iter().filter(|node| node.street_count.unwrap_or(0) > 1).count() as i64,
        intersect_count_clean: clean_clusters.len() as i64,
        intersect_count_clean_topo: topo_clusters.len() as i64,
    })
}

/// Non-finite values are written as nulls.
fn finite(values: impl Iterator<Item = f64>) -> Vec<Option<f64>> {
    values.map(|v| v.is_finite().then_some(v)).collect()
}

/// Indicator rows as a frame, one column per field in declaration order.
pub fn rows_frame(rows: &[IndicatorRow]) -> Result<DataFrame> {
    macro_rules! floats {
        ($($field:ident),+ $(,)?) => {
            vec![$(Column::new(stringify!($field).into(), finite(rows.iter().map(|r| r.$field)))),+]
        };
    }
    macro_rules! ints {
        ($($field:ident),+ $(,)?) => {
            vec![$(Column::new(stringify!($field).into(), rows.iter().map(|r| r.$field).collect::<Vec<i64>>())),+]
        };
    }

    let mut columns = vec![
        Column::new("country".into(), rows.iter().map(|r| r.country.as_str()).collect::<Vec<_>>()),
        Column::new("country_iso".into(), rows.iter().map(|r| r.country_iso.as_str()).collect::<Vec<_>>()),
        Column::new("core_city".into(), rows.iter().map(|r| r.core_city.as_str()).collect::<Vec<_>>()),
    ];
    columns.extend(ints!(uc_id));
    columns.extend(floats!(circuity, k_avg, length_mean, length_median, length_total));
    columns.extend(ints!(street_segment_count, node_count));
    columns.extend(floats!(
        orientation_entropy, orientation_order, prop_4way, prop_3way, prop_deadend, self_loop_proportion,
        straightness, bc_gini, bc_max, cc_avg_dir, cc_wt_avg_dir, pagerank_max, cc_avg_undir, cc_wt_avg_undir,
        elev_iqr, elev_mean, elev_median, elev_range, elev_std, grade_mean, grade_median,
    ));
    columns.extend(ints!(intersect_count, intersect_count_clean, intersect_count_clean_topo));
    Ok(DataFrame::new(columns)?)
}

fn indicators_for(path: &Path) -> Result<IndicatorRow> {
    let graph = load_graphml(path).with_context(|| format!("[indicators] Failed to load {}", path.display()))?;
    let row = graph_indicators(&graph, graph_identity(path)?)?;
    info!("[indicators] Calculated indicators for {}", path.display());
    Ok(row)
}

/// Calculate indicators for every graph not yet in the results CSV, in
/// random order, appending results every `CHECKPOINT_EVERY` graphs.
/// Returns the number of rows appended.
pub fn calculate_indicators(config: &Config) -> Result<usize> {
    let done = done_uc_ids(&config.indicators_street_path)?;
    let mut todo = Vec::new();
    for path in graph_files(&config.models_graphml_path)? {
        if !done.contains(&uc_id_from_stem(stem_of(&path)?)?) { todo.push(path) }
    }
    todo.shuffle(&mut rand::rng());
    info!("[indicators] Calculating indicators for {} graphs ({} already done)", todo.len(), done.len());

    let mut saved = 0;
    for chunk in todo.chunks(CHECKPOINT_EVERY) {
        let rows = run_tasks("indicators", config.stats_workers(), chunk.to_vec(), |p| indicators_for(p))?;
        if rows.is_empty() { continue }
        append_csv(&mut rows_frame(&rows)?, &config.indicators_street_path)?;
        saved += rows.len();
        info!("[indicators] Saved {} new results to {}", rows.len(), config.indicators_street_path.display());
    }
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{f64_values, i64_values, read_csv};
    use crate::testutil::{save_test_graph, street_grid};

    fn grid_with_elevations(n: i64) -> StreetGraph {
        let mut graph = street_grid(n);
        for node in graph.nodes_mut() {
            node.elevation = node.elevation_aster;
            node.bc = Some(if node.osmid == 5 { 0.5 } else { 0.0 });
        }
        graph.add_edge_grades().unwrap();
        graph
    }

    #[test]
    fn identity_from_layout() {
        let path = Path::new("/m/cote_d_ivoire-CIV/grand_bassam-1234.graphml");
        assert_eq!(
            graph_identity(path).unwrap(),
            ("cote_d_ivoire".into(), "CIV".into(), "grand_bassam".into(), 1234),
        );
    }

    #[test]
    fn grid_indicators() {
        let graph = grid_with_elevations(3);
        let row = graph_indicators(&graph, ("x".into(), "XXX".into(), "grid".into(), 1)).unwrap();

        assert_eq!(row.node_count, 9);
        assert_eq!(row.street_segment_count, 12);
        assert!((row.k_avg - 24.0 / 9.0).abs() < 1e-12);
        assert!((row.circuity - 1.0).abs() < 1e-9);
        assert!((row.straightness - 1.0).abs() < 1e-9);
        assert!((row.prop_4way - 1.0 / 9.0).abs() < 1e-12);
        assert!((row.prop_3way - 4.0 / 9.0).abs() < 1e-12);
        assert_eq!(row.prop_deadend, 0.0);
        assert_eq!(row.self_loop_proportion, 0.0);
        assert!((row.orientation_order - 1.0).abs() < 1e-9);
        assert_eq!(row.cc_avg_dir, 0.0);
        assert_eq!(row.cc_avg_undir, 0.0);
        assert!(row.pagerank_max > 1.0 / 9.0);
        assert_eq!(row.bc_max, 0.5);
        assert!((row.bc_gini - 8.0 / 9.0).abs() < 1e-12);
        assert_eq!(row.elev_mean, 110.0);
        assert_eq!(row.elev_range, 20.0);
        assert_eq!(row.elev_median, 110.0);
        // six flat streets and six climbing 10 m over ~111 m
        assert!((row.grade_median - row.grade_mean).abs() < 1e-12);
        assert!(row.grade_mean > 0.04 && row.grade_mean < 0.05);
        // corners are 2-way intersections here, blocks are ~111 m apart
        assert_eq!(row.intersect_count, 9);
        assert_eq!(row.intersect_count_clean, 9);
        assert_eq!(row.intersect_count_clean_topo, 9);
    }

    #[test]
    fn dead_ends_are_single_street_nodes() {
        let mut graph = grid_with_elevations(3);
        graph.node_mut(1).unwrap().street_count = Some(1);
        graph.node_mut(3).unwrap().street_count = Some(0);
        let row = graph_indicators(&graph, ("x".into(), "XXX".into(), "grid".into(), 1)).unwrap();
        assert!((row.prop_deadend - 1.0 / 9.0).abs() < 1e-12);
        assert!((row.prop_3way - 4.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn results_are_appended_and_skipped_when_done() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::under(dir.path());
        save_test_graph(&config, "france-FRA", "lyon-7", &grid_with_elevations(2));
        save_test_graph(&config, "france-FRA", "nice-8", &grid_with_elevations(3));

        assert_eq!(calculate_indicators(&config).unwrap(), 2);
        assert_eq!(calculate_indicators(&config).unwrap(), 0);

        let df = read_csv(&config.indicators_street_path).unwrap();
        assert_eq!(df.width(), 35);
        let mut ids = i64_values(&df, "uc_id").unwrap();
        ids.sort();
        assert_eq!(ids, [7, 8]);
        assert!(f64_values(&df, "circuity").unwrap().iter().all(Option::is_some));
    }
}
