use std::collections::BTreeMap;

use ahash::AHashSet;
use anyhow::{Result, ensure};
use log::debug;
use netgraph::{Edge, Node, StreetGraph, geodesy::great_circle};

use super::overpass::{OverpassResponse, passes_drive_filter};

/// Way tags copied onto edges.
const WAY_TAGS: [&str; 14] = [
    "bridge", "tunnel", "lanes", "ref", "name", "highway", "maxspeed", "service", "access", "area",
    "landuse", "width", "est_width", "junction",
];
/// Node tags copied onto nodes.
const NODE_TAGS: [&str; 2] = ["highway", "ref"];

const ONEWAY_VALUES: [&str; 7] = ["yes", "true", "1", "-1", "reverse", "T", "F"];
const REVERSED_VALUES: [&str; 3] = ["-1", "reverse", "T"];

/// Whether traffic may only flow one way along a way.
pub fn is_oneway(tags: &BTreeMap<String, String>) -> bool {
    tags.get("oneway").is_some_and(|v| ONEWAY_VALUES.contains(&v.as_str()))
        || tags.get("junction").is_some_and(|v| v == "roundabout")
}

/// Whether a one-way way flows against its digitized node order.
pub fn is_reversed(tags: &BTreeMap<String, String>) -> bool {
    tags.get("oneway").is_some_and(|v| REVERSED_VALUES.contains(&v.as_str()))
}

fn pick(tags: &BTreeMap<String, String>, keys: &[&str]) -> BTreeMap<String, String> {
    keys.iter()
        .filter_map(|&k| tags.get(k).map(|v| (k.to_string(), v.clone())))
        .collect()
}

/// Build an unsimplified directed street graph from Overpass responses.
///
/// Each drivable way contributes one edge per consecutive node pair, plus the
/// reverse edges (flagged `reversed`) when it is two-way. Ways returned by
/// several responses are added once. Nodes not on any kept way are dropped.
pub fn build_graph(responses: &[OverpassResponse]) -> Result<StreetGraph> {
    let mut graph = StreetGraph::new();
    for element in responses.iter().flat_map(|r| &r.elements).filter(|e| e.kind == "node") {
        let (Some(lon), Some(lat)) = (element.lon, element.lat) else { continue };
        let mut node = Node::new(element.id, lon, lat);
        node.tags = pick(&element.tags, &NODE_TAGS);
        graph.add_node(node);
    }

    let mut seen_ways = AHashSet::new();
    for way in responses.iter().flat_map(|r| &r.elements).filter(|e| e.kind == "way") {
        if !seen_ways.insert(way.id) || !passes_drive_filter(&way.tags) { continue }

        let oneway = is_oneway(&way.tags);
        let mut nodes = way.nodes.clone();
        if oneway && is_reversed(&way.tags) { nodes.reverse() }
        let tags = pick(&way.tags, &WAY_TAGS);

        let mut forward = Vec::with_capacity(nodes.len());
        for pair in nodes.windows(2) {
            let (Some(a), Some(b)) = (graph.node(pair[0]), graph.node(pair[1])) else {
                debug!("[acquire] way {} references a node missing from the response", way.id);
                continue;
            };
            let mut edge = Edge::new(pair[0], pair[1], great_circle(a.x, a.y, b.x, b.y));
            edge.osmid = vec![way.id];
            edge.oneway = oneway;
            edge.tags = tags.clone();
            forward.push(edge);
        }

        let backward: Vec<Edge> = if oneway { Vec::new() } else {
            forward.iter()
                .map(|e| Edge { u: e.v, v: e.u, reversed: true, ..e.clone() })
                .collect()
        };
        for edge in forward.into_iter().chain(backward) { graph.add_edge(edge)?; }
    }

    graph.remove_isolated_nodes();
    ensure!(!graph.is_empty(), "[acquire] No drivable streets in the response");
    Ok(graph)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A plus-shaped junction: a two-way east-west street through node 2 and
    /// a one-way northbound street digitized southward (`oneway=-1`).
    pub(crate) const RESPONSE: &str = r#"{"elements": [
        {"type": "node", "id": 1, "lat": 0.0, "lon": 0.000},
        {"type": "node", "id": 2, "lat": 0.0, "lon": 0.001, "tags": {"highway": "traffic_signals", "name": "x"}},
        {"type": "node", "id": 3, "lat": 0.0, "lon": 0.002},
        {"type": "node", "id": 4, "lat": 0.001, "lon": 0.001},
        {"type": "node", "id": 5, "lat": -0.001, "lon": 0.001},
        {"type": "node", "id": 6, "lat": 0.002, "lon": 0.002},
        {"type": "way", "id": 100, "nodes": [1, 2, 3], "tags": {"highway": "residential", "name": "Main"}},
        {"type": "way", "id": 101, "nodes": [4, 2, 5], "tags": {"highway": "tertiary", "oneway": "-1"}},
        {"type": "way", "id": 102, "nodes": [3, 6], "tags": {"highway": "footway"}}
    ]}"#;

    pub(crate) fn response() -> OverpassResponse { OverpassResponse::parse(RESPONSE).unwrap() }

    #[test]
    fn oneway_rules() {
        let tags = |pairs: &[(&str, &str)]| pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        assert!(is_oneway(&tags(&[("oneway", "yes")])));
        assert!(is_oneway(&tags(&[("junction", "roundabout")])));
        assert!(!is_oneway(&tags(&[("oneway", "no")])));
        assert!(is_reversed(&tags(&[("oneway", "-1")])));
        assert!(!is_reversed(&tags(&[("oneway", "yes")])));
    }

    #[test]
    fn edges_follow_direction_rules() {
        let graph = build_graph(&[response()]).unwrap();
        // footway and its lone node 6 are dropped
        assert_eq!(graph.node_count(), 5);
        assert!(!graph.contains_node(6));
        // 2 two-way segments in both directions, 2 one-way segments
        assert_eq!(graph.edge_count(), 6);

        let edge = |u, v| graph.edges().iter().find(|e| e.u == u && e.v == v);
        assert!(edge(5, 2).is_some() && edge(2, 4).is_some());
        assert!(edge(4, 2).is_none());
        assert!(edge(2, 1).unwrap().reversed);
        assert!(!edge(1, 2).unwrap().reversed);
        assert!(edge(5, 2).unwrap().oneway);
        assert_eq!(edge(1, 2).unwrap().tags["name"], "Main");
        assert!((edge(1, 2).unwrap().length - 111.2).abs() < 0.1);
        assert_eq!(graph.node(2).unwrap().tags.len(), 1);
    }

    #[test]
    fn duplicate_ways_across_responses_are_added_once() {
        let graph = build_graph(&[response(), response()]).unwrap();
        assert_eq!(graph.edge_count(), 6);
    }
}
