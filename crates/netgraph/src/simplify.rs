use std::collections::{BTreeMap, BTreeSet};

use ahash::{AHashMap, AHashSet};
use geo::{Coord, LineString};

use crate::graph::{Edge, GraphError, StreetGraph};

/// Directed neighbor lists keyed by node id, in edge insertion order.
struct Adjacency {
    succ: AHashMap<i64, Vec<i64>>,
    pred: AHashMap<i64, Vec<i64>>,
}

impl Adjacency {
    fn new(graph: &StreetGraph) -> Self {
        let mut succ: AHashMap<i64, Vec<i64>> = AHashMap::new();
        let mut pred: AHashMap<i64, Vec<i64>> = AHashMap::new();
        for e in graph.edges() {
            succ.entry(e.u).or_default().push(e.v);
            pred.entry(e.v).or_default().push(e.u);
        }
        Self { succ, pred }
    }

    #[inline]
    fn out_arcs(&self, node: i64) -> &[i64] { self.succ.get(&node).map_or(&[], Vec::as_slice) }

    #[inline]
    fn in_arcs(&self, node: i64) -> &[i64] { self.pred.get(&node).map_or(&[], Vec::as_slice) }

    /// Distinct successors in first-seen order.
    fn successors(&self, node: i64) -> Vec<i64> {
        let mut seen = AHashSet::new();
        self.out_arcs(node).iter().copied().filter(|v| seen.insert(*v)).collect()
    }

    /// Whether a node must survive simplification.
    ///
    /// A node is an endpoint if it has a self-loop, is a source or a sink,
    /// or does not sit in the middle of exactly one street (two distinct
    /// neighbors and a total degree of 2 or 4).
    fn is_endpoint(&self, node: i64) -> bool {
        let (outs, ins) = (self.out_arcs(node), self.in_arcs(node));
        let neighbors: AHashSet<i64> = outs.iter().chain(ins).copied().collect();

        if neighbors.contains(&node) { return true }
        if outs.is_empty() || ins.is_empty() { return true }
        let degree = outs.len() + ins.len();
        !(neighbors.len() == 2 && (degree == 2 || degree == 4))
    }
}

/// Walk from an endpoint through interstitial nodes until the next endpoint.
fn build_path(adj: &Adjacency, endpoint: i64, first: i64, endpoints: &AHashSet<i64>) -> Result<Vec<i64>, GraphError> {
    let mut path = vec![endpoint, first];
    let mut visited: AHashSet<i64> = path.iter().copied().collect();

    let Some(mut current) = adj.successors(first).into_iter().find(|s| !visited.contains(s)) else {
        // nothing new beyond the first hop, usually an OSM digitization quirk
        return Ok(path);
    };
    path.push(current);
    visited.insert(current);
    while !endpoints.contains(&current) {
        let next: Vec<i64> = adj.successors(current).into_iter().filter(|n| !visited.contains(n)).collect();
        match next.as_slice() {
            [single] => {
                current = *single;
                path.push(current);
                visited.insert(current);
            }
            [] => {
                if adj.out_arcs(current).contains(&endpoint) {
                    // end of a self-looping street: close the ring
                    path.push(endpoint);
                } else {
                    log::warn!("[simplify] unexpected simplify pattern near node {current}");
                }
                return Ok(path);
            }
            _ => return Err(GraphError::Format(format!("impossible simplify pattern near node {current}"))),
        }
    }
    Ok(path)
}

/// Format several distinct string values the way list attributes are stored.
fn format_list(values: &BTreeSet<&str>) -> String {
    let items: Vec<String> = values.iter().map(|v| format!("'{v}'")).collect();
    format!("[{}]", items.join(", "))
}

/// Merge the segments of a path into one edge.
fn merge_path(graph: &StreetGraph, first_edge: &AHashMap<(i64, i64), usize>, path: &[i64]) -> Result<Edge, GraphError> {
    let (start, end) = (path[0], path[path.len() - 1]);
    let mut merged = Edge::new(start, end, 0.0);
    let mut tag_values: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut ways: BTreeSet<i64> = BTreeSet::new();

    for (i, pair) in path.windows(2).enumerate() {
        let idx = *first_edge.get(&(pair[0], pair[1]))
            .ok_or_else(|| GraphError::Format(format!("no edge {} -> {} along path", pair[0], pair[1])))?;
        let segment = &graph.edges()[idx];

        merged.length += segment.length;
        ways.extend(segment.osmid.iter().copied());
        if i == 0 {
            merged.oneway = segment.oneway;
            merged.reversed = segment.reversed;
        }
        for (k, v) in &segment.tags {
            tag_values.entry(k.as_str()).or_default().insert(v.as_str());
        }
    }

    merged.osmid = ways.into_iter().collect();
    merged.tags = tag_values.into_iter()
        .map(|(k, vals)| {
            let value = match vals.len() {
                1 => vals.iter().next().map(|v| v.to_string()).unwrap_or_default(),
                _ => format_list(&vals),
            };
            (k.to_string(), value)
        })
        .collect();

    let coords = path.iter()
        .map(|&id| graph.node(id).map(|n| Coord { x: n.x, y: n.y }).ok_or(GraphError::MissingNode(id)))
        .collect::<Result<Vec<_>, _>>()?;
    merged.geometry = Some(LineString::new(coords));
    Ok(merged)
}

/// Remove interstitial nodes, replacing each chain of segments between two
/// endpoints with a single edge carrying the chain's geometry and total
/// length. Components that form closed rings without any endpoint are
/// dropped. Marks the graph as simplified.
pub fn simplify(graph: &mut StreetGraph) -> Result<(), GraphError> {
    if graph.attrs.get("simplified").is_some_and(|v| v == "True") {
        return Err(GraphError::Format("graph has already been simplified".into()));
    }

    let adj = Adjacency::new(graph);
    let endpoints: AHashSet<i64> = graph.nodes().iter().map(|n| n.osmid).filter(|&id| adj.is_endpoint(id)).collect();

    let mut first_edge: AHashMap<(i64, i64), usize> = AHashMap::new();
    for (i, e) in graph.edges().iter().enumerate() {
        first_edge.entry((e.u, e.v)).or_insert(i);
    }

    let mut interstitial: AHashSet<i64> = AHashSet::new();
    let mut merged = Vec::new();
    for node in graph.nodes().iter().map(|n| n.osmid).filter(|id| endpoints.contains(id)) {
        for successor in adj.successors(node) {
            if endpoints.contains(&successor) { continue }
            let path = build_path(&adj, node, successor, &endpoints)?;
            interstitial.extend(path[1..path.len() - 1].iter().copied());
            merged.push(merge_path(graph, &first_edge, &path)?);
        }
    }

    let before = graph.node_count();
    graph.retain_nodes(|n| !interstitial.contains(&n.osmid));
    for edge in merged { graph.add_edge(edge)?; }
    remove_rings(graph);

    graph.attrs.insert("simplified".into(), "True".into());
    log::debug!("[simplify] simplified graph: {before} to {} nodes, {} edges", graph.node_count(), graph.edge_count());
    Ok(())
}

/// Drop weakly connected components in which no node is an endpoint.
fn remove_rings(graph: &mut StreetGraph) {
    let adj = Adjacency::new(graph);
    let n = graph.node_count();
    let mut parent: Vec<usize> = (0..n).collect();
    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x { parent[x] = parent[parent[x]]; x = parent[x]; }
        x
    }
    let arcs: Vec<(usize, usize)> = graph.edge_indices().collect();
    for (u, v) in arcs {
        let (ru, rv) = (find(&mut parent, u), find(&mut parent, v));
        if ru != rv { parent[ru.max(rv)] = ru.min(rv) }
    }

    let mut anchored = vec![false; n];
    for (i, node) in graph.nodes().iter().enumerate() {
        if adj.is_endpoint(node.osmid) {
            let root = find(&mut parent, i);
            anchored[root] = true;
        }
    }
    let keep: AHashSet<i64> = (0..n)
        .filter(|&i| anchored[find(&mut parent, i)])
        .map(|i| graph.nodes()[i].osmid)
        .collect();
    if keep.len() < n { graph.retain_nodes(|node| keep.contains(&node.osmid)) }
}

/// Count the physical streets meeting at each node.
///
/// Reciprocal directed edges with the same key are one street; parallel
/// edges are distinct streets; a self-loop adds two to its node.
pub fn count_streets(graph: &StreetGraph) -> AHashMap<i64, u32> {
    let mut streets: AHashSet<(i64, i64, u32)> = AHashSet::new();
    let mut loops: AHashSet<i64> = AHashSet::new();
    for e in graph.edges() {
        if e.is_self_loop() {
            loops.insert(e.u);
        } else {
            streets.insert((e.u.min(e.v), e.u.max(e.v), e.key));
        }
    }

    let mut counts: AHashMap<i64, u32> = graph.nodes().iter().map(|n| (n.osmid, 0)).collect();
    for (a, b, _) in streets {
        *counts.entry(a).or_default() += 1;
        *counts.entry(b).or_default() += 1;
    }
    for node in loops { *counts.entry(node).or_default() += 2; }
    counts
}

/// Set `street_count` on every node.
pub fn add_street_counts(graph: &mut StreetGraph) {
    let counts = count_streets(graph);
    for node in graph.nodes_mut() {
        node.street_count = Some(counts.get(&node.osmid).copied().unwrap_or(0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;

    fn seg(u: i64, v: i64, way: i64, highway: &str) -> Edge {
        let mut e = Edge::new(u, v, 10.0);
        e.osmid = vec![way];
        e.tags.insert("highway".into(), highway.into());
        e
    }

    fn two_way(g: &mut StreetGraph, u: i64, v: i64, way: i64, highway: &str) {
        g.add_edge(seg(u, v, way, highway)).unwrap();
        let mut back = seg(v, u, way, highway);
        back.reversed = true;
        g.add_edge(back).unwrap();
    }

    #[test]
    fn two_way_chain_collapses_to_one_street() {
        // 1 - 2 - 3 - 4 where 1 and 4 are dead-ends
        let mut g = StreetGraph::new();
        for id in 1..=4 { g.add_node(Node::new(id, id as f64, 0.0)); }
        two_way(&mut g, 1, 2, 100, "residential");
        two_way(&mut g, 2, 3, 100, "residential");
        two_way(&mut g, 3, 4, 101, "tertiary");

        simplify(&mut g).unwrap();
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 2);

        let e = &g.edges()[0];
        assert_eq!((e.u, e.v), (1, 4));
        assert_eq!(e.length, 30.0);
        assert_eq!(e.osmid, vec![100, 101]);
        assert_eq!(e.tags["highway"], "['residential', 'tertiary']");
        assert_eq!(e.geometry.as_ref().map(|l| l.0.len()), Some(4));
        assert_eq!(g.attrs["simplified"], "True");
        assert!(simplify(&mut g).is_err());
    }

    #[test]
    fn long_chains_collapse_quickly() {
        let n = 20_000;
        let mut g = StreetGraph::new();
        for id in 1..=n { g.add_node(Node::new(id, id as f64 * 1e-4, 0.0)); }
        for id in 1..n { two_way(&mut g, id, id + 1, 100, "residential"); }

        let start = std::time::Instant::now();
        simplify(&mut g).unwrap();
        assert!(start.elapsed().as_secs() < 5, "simplify took {:?}", start.elapsed());
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.edges()[0].length, 10.0 * (n - 1) as f64);
        assert_eq!(g.edges()[0].geometry.as_ref().map(|l| l.0.len()), Some(n as usize));
    }

    #[test]
    fn intersections_are_kept() {
        // star around node 1 plus an interstitial node 5 on the 1 - 2 arm
        let mut g = StreetGraph::new();
        for id in 1..=5 { g.add_node(Node::new(id, id as f64, 0.0)); }
        two_way(&mut g, 1, 5, 10, "primary");
        two_way(&mut g, 5, 2, 10, "primary");
        two_way(&mut g, 1, 3, 11, "primary");
        two_way(&mut g, 1, 4, 12, "primary");

        simplify(&mut g).unwrap();
        assert!(!g.contains_node(5));
        assert_eq!(g.node_count(), 4);
        assert_eq!(g.edge_count(), 6);
    }

    #[test]
    fn isolated_rings_are_removed() {
        let mut g = StreetGraph::new();
        for id in 1..=3 { g.add_node(Node::new(id, id as f64, 0.0)); }
        g.add_edge(seg(1, 2, 1, "residential")).unwrap();
        g.add_edge(seg(2, 3, 1, "residential")).unwrap();
        g.add_edge(seg(3, 1, 1, "residential")).unwrap();

        simplify(&mut g).unwrap();
        assert!(g.is_empty());
    }

    #[test]
    fn street_counts() {
        let mut g = StreetGraph::new();
        for id in 1..=3 { g.add_node(Node::new(id, 0.0, 0.0)); }
        two_way(&mut g, 1, 2, 1, "residential");
        g.add_edge(seg(2, 3, 2, "residential")).unwrap();
        g.add_edge(seg(3, 3, 3, "residential")).unwrap();

        add_street_counts(&mut g);
        let counts: Vec<u32> = g.nodes().iter().map(|n| n.street_count.unwrap()).collect();
        assert_eq!(counts, vec![1, 2, 3]);
    }
}
