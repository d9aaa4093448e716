//! Fixtures shared by unit tests across modules.

use std::path::PathBuf;

use netgraph::{Edge, Node, StreetGraph, geodesy::great_circle, simplify::add_street_counts};
use serde_json::{Value, json};

use crate::config::Config;
use crate::io::{save_graph, write_features};

/// A raw urban-center feature with a small square boundary at the origin.
pub(crate) fn uc_feature(id: i64, name: &str, country: &str, built_up: f64, quality: &str) -> Value {
    json!({
        "type": "Feature",
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [0.01, 0.0], [0.01, 0.01], [0.0, 0.01], [0.0, 0.0]]],
        },
        "properties": {
            "ID_UC_G0": id,
            "GC_UCN_MAI_2025": name,
            "GC_UCN_LIS_2025": name,
            "GC_CNT_GAD_2025": country,
            "GC_PLS_SCR_2025": quality,
            "GH_BUS_TOT_2025": built_up,
            "GC_POP_TOT_2025": 123456.7,
            "GC_UCA_KM2_2025": 12.5,
            "EXTRA_COLUMN": "dropped",
        },
    })
}

/// Write raw urban centers and the ISO lookup table they need.
pub(crate) fn write_uc_inputs(config: &Config, features: Vec<Value>) {
    write_features(&config.uc_input_path, features).unwrap();
    std::fs::write(&config.iso_codes_path, "name,alpha3\nFrance,FRA\nCôte d'Ivoire,CIV\n").unwrap();
}

/// An `n`×`n` grid of two-way streets with ~111 m blocks near the origin.
/// Node ids run row by row from 1; raster elevations rise 10 m per row.
pub(crate) fn street_grid(n: i64) -> StreetGraph {
    let id = |row: i64, col: i64| row * n + col + 1;
    let mut graph = StreetGraph::new();
    for row in 0..n {
        for col in 0..n {
            let mut node = Node::new(id(row, col), col as f64 * 0.001, row as f64 * 0.001);
            node.elevation_aster = Some(100.0 + 10.0 * row as f64);
            node.elevation_srtm = Some(101.0 + 10.0 * row as f64);
            graph.add_node(node);
        }
    }
    for row in 0..n {
        for col in 0..n {
            let mut neighbors = Vec::new();
            if col + 1 < n { neighbors.push(id(row, col + 1)) }
            if row + 1 < n { neighbors.push(id(row + 1, col)) }
            for other in neighbors {
                let (a, b) = (graph.node(id(row, col)).unwrap().clone(), graph.node(other).unwrap().clone());
                let length = great_circle(a.x, a.y, b.x, b.y);
                let mut forward = Edge::new(a.osmid, b.osmid, length);
                forward.osmid = vec![1000 + a.osmid];
                forward.tags.insert("highway".into(), "residential".into());
                let backward = Edge { u: b.osmid, v: a.osmid, reversed: true, ..forward.clone() };
                graph.add_edge(forward).unwrap();
                graph.add_edge(backward).unwrap();
            }
        }
    }
    add_street_counts(&mut graph);
    graph
}

/// Save a graph under the config's GraphML root as `{folder}/{stem}.graphml`.
pub(crate) fn save_test_graph(config: &Config, folder: &str, stem: &str, graph: &StreetGraph) -> PathBuf {
    let path = config.models_graphml_path.join(folder).join(format!("{stem}.graphml"));
    save_graph(graph, &path).unwrap();
    path
}
