use std::{collections::BTreeMap, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use geo::LineString;
use log::info;
use netgraph::{StreetGraph, convert::edge_coords, graphml::{format_osmid, load_graphml}};
use polars::prelude::*;
use serde_json::{Map, Value, json};

use crate::common::round_to;
use crate::config::Config;
use crate::io::{feature, linestring_to_geojson, point_to_geojson, write_csv, write_features};
use crate::layout::{country_of, graph_files, mirror_path, stem_of};
use crate::pool::run_tasks;

pub const NODE_LIST: &str = "node_list.csv";
pub const EDGE_LIST: &str = "edge_list.csv";

/// Node list columns, in order. Names without a node field are OSM tags.
pub const NODE_COLUMNS: [&str; 9] = ["osmid", "x", "y", "elevation", "elevation_aster", "elevation_srtm", "bc", "ref", "highway"];
/// Edge list columns, in order. Names without an edge field are OSM tags.
pub const EDGE_COLUMNS: [&str; 22] = [
    "u", "v", "key", "oneway", "highway", "name", "length", "grade", "grade_abs", "reversed", "lanes",
    "width", "est_width", "maxspeed", "access", "service", "bridge", "tunnel", "area", "junction", "osmid", "ref",
];

/// Output paths of one graph.
#[derive(Debug, Clone)]
pub struct SavedPaths {
    pub graphml: PathBuf,
    pub geojson: PathBuf,
    pub nodes: PathBuf,
    pub edges: PathBuf,
}

impl SavedPaths {
    pub fn for_graph(config: &Config, graph_path: &Path) -> Result<Self> {
        let list_dir = config.models_nelist_path.join(country_of(graph_path)?).join(stem_of(graph_path)?);
        Ok(Self {
            graphml: graph_path.to_path_buf(),
            geojson: mirror_path(graph_path, &config.models_geojson_path, ".geojson")?,
            nodes: list_dir.join(NODE_LIST),
            edges: list_dir.join(EDGE_LIST),
        })
    }

    #[inline] pub fn complete(&self) -> bool { self.geojson.is_file() && self.nodes.is_file() && self.edges.is_file() }
}

// ---------------------------------------------------------------------------
// GeoJSON
// ---------------------------------------------------------------------------

fn properties(fields: impl IntoIterator<Item = (&'static str, Value)>, tags: &BTreeMap<String, String>) -> Map<String, Value> {
    let mut properties: Map<String, Value> = fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    for (k, v) in tags {
        properties.entry(k.clone()).or_insert_with(|| json!(v));
    }
    properties
}

/// Every node as a Point feature and every edge as a LineString feature,
/// told apart by their `layer` property.
pub fn graph_features(graph: &StreetGraph) -> Vec<Value> {
    let nodes = graph.nodes().iter().map(|n| {
        let fields = [
            ("layer", json!("nodes")),
            ("osmid", json!(n.osmid)),
            ("x", json!(n.x)),
            ("y", json!(n.y)),
            ("street_count", json!(n.street_count)),
            ("elevation", json!(n.elevation)),
            ("elevation_aster", json!(n.elevation_aster)),
            ("elevation_srtm", json!(n.elevation_srtm)),
            ("bc", json!(n.bc)),
        ];
        feature(point_to_geojson(n.x, n.y), properties(fields, &n.tags))
    });

    let edges = graph.edges().iter().map(|e| {
        let line = LineString::new(edge_coords(graph, e));
        let osmid = match e.osmid.as_slice() {
            [single] => json!(single),
            many => json!(many),
        };
        let fields = [
            ("layer", json!("edges")),
            ("u", json!(e.u)),
            ("v", json!(e.v)),
            ("key", json!(e.key)),
            ("osmid", osmid),
            ("length", json!(e.length)),
            ("grade", json!(e.grade)),
            ("grade_abs", json!(e.grade_abs)),
            ("oneway", json!(e.oneway)),
            ("reversed", json!(e.reversed)),
        ];
        feature(linestring_to_geojson(&line), properties(fields, &e.tags))
    });

    nodes.chain(edges).collect()
}

// ---------------------------------------------------------------------------
// Node and edge lists
// ---------------------------------------------------------------------------

fn tag_column<'a>(name: &str, tags: impl Iterator<Item = &'a BTreeMap<String, String>>) -> Column {
    let values: Vec<Option<&str>> = tags.map(|t| t.get(name).map(String::as_str)).collect();
    Column::new(name.into(), values)
}

fn rounded(name: &str, values: impl Iterator<Item = Option<f64>>) -> Column {
    Column::new(name.into(), values.map(|v| v.map(|v| round_to(v, 3))).collect::<Vec<_>>())
}

/// Node list in `NODE_COLUMNS` order. Raster elevations are whole meters.
pub fn nodes_frame(graph: &StreetGraph) -> Result<DataFrame> {
    let nodes = graph.nodes();
    let columns = NODE_COLUMNS.iter().map(|&name| match name {
        "osmid" => Column::new(name.into(), nodes.iter().map(|n| n.osmid).collect::<Vec<_>>()),
        "x" => Column::new(name.into(), nodes.iter().map(|n| n.x).collect::<Vec<_>>()),
        "y" => Column::new(name.into(), nodes.iter().map(|n| n.y).collect::<Vec<_>>()),
        "elevation" => Column::new(name.into(), nodes.iter().map(|n| n.elevation).collect::<Vec<_>>()),
        "elevation_aster" => Column::new(name.into(), nodes.iter().map(|n| n.elevation_aster.map(|v| v as i64)).collect::<Vec<_>>()),
        "elevation_srtm" => Column::new(name.into(), nodes.iter().map(|n| n.elevation_srtm.map(|v| v as i64)).collect::<Vec<_>>()),
        "bc" => Column::new(name.into(), nodes.iter().map(|n| n.bc).collect::<Vec<_>>()),
        tag => tag_column(tag, nodes.iter().map(|n| &n.tags)),
    });
    Ok(DataFrame::new(columns.collect())?)
}

/// Edge list in `EDGE_COLUMNS` order, grades and lengths rounded to 3
/// decimals. Way ids keep the GraphML list format.
pub fn edges_frame(graph: &StreetGraph) -> Result<DataFrame> {
    let edges = graph.edges();
    let columns = EDGE_COLUMNS.iter().map(|&name| match name {
        "u" => Column::new(name.into(), edges.iter().map(|e| e.u).collect::<Vec<_>>()),
        "v" => Column::new(name.into(), edges.iter().map(|e| e.v).collect::<Vec<_>>()),
        "key" => Column::new(name.into(), edges.iter().map(|e| e.key as i64).collect::<Vec<_>>()),
        "oneway" => Column::new(name.into(), edges.iter().map(|e| e.oneway).collect::<Vec<_>>()),
        "reversed" => Column::new(name.into(), edges.iter().map(|e| e.reversed).collect::<Vec<_>>()),
        "length" => rounded(name, edges.iter().map(|e| Some(e.length))),
        "grade" => rounded(name, edges.iter().map(|e| e.grade)),
        "grade_abs" => rounded(name, edges.iter().map(|e| e.grade_abs)),
        "osmid" => Column::new(name.into(), edges.iter().map(|e| format_osmid(&e.osmid)).collect::<Vec<_>>()),
        tag => tag_column(tag, edges.iter().map(|e| &e.tags)),
    });
    Ok(DataFrame::new(columns.collect())?)
}

fn save_graph(paths: &SavedPaths) -> Result<()> {
    let graph = load_graphml(&paths.graphml)
        .with_context(|| format!("[save] Failed to load {}", paths.graphml.display()))?;
    write_features(&paths.geojson, graph_features(&graph))?;
    write_csv(&mut nodes_frame(&graph)?, &paths.nodes)?;
    write_csv(&mut edges_frame(&graph)?, &paths.edges)?;
    info!("[save] Saved {}", paths.graphml.display());
    Ok(())
}

/// Write GeoJSON and node/edge lists for every graph missing any of them.
/// Returns the number of graphs saved.
pub fn save_files(config: &Config) -> Result<usize> {
    let graphs = graph_files(&config.models_graphml_path)?;
    let total = graphs.len();
    let todo = graphs.iter()
        .map(|p| SavedPaths::for_graph(config, p))
        .filter(|paths| paths.as_ref().map_or(true, |p| !p.complete()))
        .collect::<Result<Vec<_>>>()?;
    info!("[save] Saving GeoJSON and node/edge lists for {} of {total} graphs", todo.len());
    Ok(run_tasks("save", config.workers(), todo, save_graph)?.len())
}
