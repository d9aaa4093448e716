//! Street graph acquisition for every urban center.

mod build;
mod overpass;

pub use build::{build_graph, is_oneway, is_reversed};
pub use overpass::{DRIVE_FILTER, MAX_QUERY_AREA_M2, Overpass, OverpassResponse, build_query, passes_drive_filter, subdivide};

use std::path::PathBuf;

use anyhow::{Context, Result};
use geo::MultiPolygon;
use log::info;
use netgraph::{StreetGraph, simplify::{count_streets, simplify}, truncate::truncate_by_polygon};
use rand::seq::SliceRandom;

use crate::config::Config;
use crate::io::save_graph;
use crate::layout::graph_files;
use crate::pool::run_tasks;
use crate::ucdb::{UrbanCenter, load_urban_centers};

/// Graphs with fewer nodes are not saved.
pub const MIN_NODES: usize = 3;

/// Workers for the cache warm-up pass, kept low to spare the Overpass server.
const CACHE_WORKERS: usize = 3;

/// Overpass queries covering a boundary.
pub fn queries_for(boundary: &MultiPolygon<f64>, timeout_secs: u64) -> Vec<String> {
    subdivide(boundary, MAX_QUERY_AREA_M2).iter()
        .map(|polygon| build_query(polygon, timeout_secs))
        .collect()
}

/// Build the simplified drivable street graph inside `boundary`.
///
/// Street counts are taken from the full downloaded graph so that nodes kept
/// just outside the boundary report their real number of streets.
pub fn graph_from_responses(responses: &[OverpassResponse], boundary: &MultiPolygon<f64>) -> Result<StreetGraph> {
    let mut graph = build_graph(responses)?;
    let street_counts = count_streets(&graph);
    simplify(&mut graph)?;
    truncate_by_polygon(&mut graph, boundary, true)?;
    for node in graph.nodes_mut() {
        node.street_count = Some(street_counts.get(&node.osmid).copied().unwrap_or(0));
    }
    graph.attrs.insert("created_with".into(), format!("streetnets {}", env!("CARGO_PKG_VERSION")));
    Ok(graph)
}

/// Download and build the street graph for one urban center.
pub fn graph_from_polygon(overpass: &Overpass, boundary: &MultiPolygon<f64>) -> Result<StreetGraph> {
    let responses = overpass.fetch_all(&queries_for(boundary, overpass.timeout_secs()))?;
    graph_from_responses(&responses, boundary)
}

/// Output path of an urban center's graph file.
pub fn graph_path(config: &Config, uc: &UrbanCenter) -> PathBuf {
    config.models_graphml_path.join(uc.country_folder()).join(format!("{}.graphml", uc.stem()))
}

/// Build and save the street graph of every urban center that doesn't have
/// one yet, in random order. Returns the number of graphs saved.
pub fn acquire_graphs(config: &Config) -> Result<usize> {
    let mut ucs = load_urban_centers(&config.uc_dataset_path)?;
    ucs.retain(|uc| !graph_path(config, uc).is_file());
    ucs.shuffle(&mut rand::rng());

    let overpass = Overpass::new(&config.overpass_url, config.overpass_timeout_secs, &config.http_cache_path)?;
    let saved = run_tasks("acquire", config.workers(), ucs, |uc| {
        let graph = graph_from_polygon(&overpass, &uc.boundary)?;
        if graph.node_count() < MIN_NODES {
            info!("[acquire] Skipping {}: only {} nodes", uc.stem(), graph.node_count());
            return Ok(false);
        }
        let path = graph_path(config, uc);
        save_graph(&graph, &path).with_context(|| format!("[acquire] Failed to save {}", path.display()))?;
        info!("[acquire] Saved {}", path.display());
        Ok(true)
    })?;

    let saved = saved.into_iter().filter(|&s| s).count();
    let total = graph_files(&config.models_graphml_path).map(|f| f.len()).unwrap_or(0);
    info!("[acquire] Saved {saved} graphs; there are {total} graph files in {}", config.models_graphml_path.display());
    Ok(saved)
}

/// Populate the Overpass response cache for every urban center, smallest first,
/// without building graphs. Returns the number of urban centers fully cached.
pub fn cache_overpass(config: &Config) -> Result<usize> {
    let mut ucs = load_urban_centers(&config.uc_dataset_path)?;
    ucs.sort_by(|a, b| a.built_up_area.total_cmp(&b.built_up_area));

    let overpass = Overpass::new(&config.overpass_url, config.overpass_timeout_secs, &config.http_cache_path)?;
    let cached = run_tasks("cache-overpass", CACHE_WORKERS, ucs, |uc| {
        overpass.fetch_all(&queries_for(&uc.boundary, overpass.timeout_secs()))?;
        info!("[cache-overpass] Finished {}-{}", uc.country_iso, uc.stem());
        Ok(())
    })?;
    Ok(cached.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{uc_feature, write_uc_inputs};
    use geo::polygon;

    #[test]
    fn boundary_truncation_keeps_street_counts() {
        // boundary covers nodes 1 and 2 only; 3, 4 and 5 are adjacent to 2
        let boundary = MultiPolygon::new(vec![polygon![
            (x: -0.0005, y: -0.0005), (x: 0.0015, y: -0.0005), (x: 0.0015, y: 0.0005), (x: -0.0005, y: 0.0005),
        ]]);
        let graph = graph_from_responses(&[build::tests::response()], &boundary).unwrap();
        assert_eq!(graph.node_count(), 5);
        assert_eq!(graph.node(2).unwrap().street_count, Some(4));
        assert_eq!(graph.node(1).unwrap().street_count, Some(1));
        assert_eq!(graph.attrs["simplified"], "True");
        assert!(graph.attrs["created_with"].starts_with("streetnets"));
    }

    #[test]
    fn boundary_without_streets_fails() {
        let far = MultiPolygon::new(vec![polygon![(x: 10.0, y: 10.0), (x: 11.0, y: 10.0), (x: 11.0, y: 11.0)]]);
        assert!(graph_from_responses(&[build::tests::response()], &far).is_err());
    }

    #[test]
    fn graph_paths_follow_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::under(dir.path());
        write_uc_inputs(&config, vec![uc_feature(7, "Lyon", "France", 5e6, "High")]);
        crate::ucdb::prep_urban_centers(&config).unwrap();
        let ucs = load_urban_centers(&config.uc_dataset_path).unwrap();
        assert!(graph_path(&config, &ucs[0]).ends_with("models/graphml/france-FRA/lyon-7.graphml"));
    }
}
