//! Average clustering coefficients.
//!
//! Weighted variants use the geometric mean of edge weights normalized by the
//! graph's largest weight. Self-loops never contribute to degrees or triangles.
//! Nodes with no triangles count as zero in the average.

use std::collections::BTreeSet;

use crate::convert::{SimpleDigraph, SimpleGraph};

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len();
    if n == 0 { return 0.0 }
    values.sum::<f64>() / n as f64
}

// ---------------------------------------------------------------------------
// Undirected
// ---------------------------------------------------------------------------

fn neighbor_set(graph: &SimpleGraph, node: usize) -> BTreeSet<usize> {
    graph.neighbors(node).keys().copied().filter(|&k| k != node).collect()
}

/// Clustering coefficient of one node in an undirected simple graph.
/// Weighted when `max_weight` is given, with weights normalized by it.
pub fn undirected_clustering(graph: &SimpleGraph, node: usize, max_weight: Option<f64>) -> f64 {
    let nbrs = neighbor_set(graph, node);
    let degree = nbrs.len();
    if degree < 2 { return 0.0 }

    let weighted = max_weight.is_some();
    let max_weight = max_weight.unwrap_or(1.0);
    let wt = |u: usize, v: usize| if weighted { graph.weight(u, v).unwrap_or(0.0) / max_weight } else { 1.0 };

    // Each triangle is visited twice, once from each of the other two nodes.
    let mut triangles = 0.0;
    for &j in &nbrs {
        let w_ij = wt(node, j);
        for &k in graph.neighbors(j).keys() {
            if k == j || k == node || !nbrs.contains(&k) { continue }
            triangles += if weighted { (w_ij * wt(j, k) * wt(k, node)).cbrt() } else { 1.0 };
        }
    }

    triangles / (degree * (degree - 1)) as f64
}

/// Average clustering over all nodes of an undirected simple graph.
pub fn average_undirected(graph: &SimpleGraph, weighted: bool) -> f64 {
    let max_weight = weighted.then(|| graph.max_weight());
    mean((0..graph.node_count()).map(|v| undirected_clustering(graph, v, max_weight)))
}

// ---------------------------------------------------------------------------
// Directed
// ---------------------------------------------------------------------------

struct Neighborhood {
    preds: BTreeSet<usize>,
    succs: BTreeSet<usize>,
}

impl Neighborhood {
    fn of(graph: &SimpleDigraph, node: usize) -> Self {
        Self {
            preds: graph.predecessors(node).keys().copied().filter(|&k| k != node).collect(),
            succs: graph.successors(node).keys().copied().filter(|&k| k != node).collect(),
        }
    }
}

/// Directed clustering coefficient of one node (Fagiolo's generalization),
/// counting all triangle orientations through the node. Weighted when
/// `max_weight` is given.
pub fn directed_clustering(graph: &SimpleDigraph, node: usize, max_weight: Option<f64>) -> f64 {
    let i = node;
    let ni = Neighborhood::of(graph, i);

    let weighted = max_weight.is_some();
    let max_weight = max_weight.unwrap_or(1.0);
    let wt = |u: usize, v: usize| graph.weight(u, v).unwrap_or(0.0) / max_weight;
    let term = |a: f64, b: f64, c: f64| if weighted { (a * b * c).cbrt() } else { 1.0 };

    let mut triangles = 0.0;
    for (j, outgoing) in ni.preds.iter().map(|&j| (j, false)).chain(ni.succs.iter().map(|&j| (j, true))) {
        let nj = Neighborhood::of(graph, j);
        // weight of the i-j link in its direction
        let w_ij = if outgoing { wt(i, j) } else { wt(j, i) };

        for &k in ni.preds.intersection(&nj.preds) { triangles += term(w_ij, wt(k, i), wt(k, j)); }
        for &k in ni.preds.intersection(&nj.succs) { triangles += term(w_ij, wt(k, i), wt(j, k)); }
        for &k in ni.succs.intersection(&nj.preds) { triangles += term(w_ij, wt(i, k), wt(k, j)); }
        for &k in ni.succs.intersection(&nj.succs) { triangles += term(w_ij, wt(i, k), wt(j, k)); }
    }

    if triangles == 0.0 { return 0.0 }
    let total = (ni.preds.len() + ni.succs.len()) as f64;
    let reciprocal = ni.preds.intersection(&ni.succs).count() as f64;
    triangles / ((total * (total - 1.0) - 2.0 * reciprocal) * 2.0)
}

/// Average directed clustering over all nodes.
pub fn average_directed(graph: &SimpleDigraph, weighted: bool) -> f64 {
    let max_weight = weighted.then(|| graph.max_weight());
    mean((0..graph.node_count()).map(|v| directed_clustering(graph, v, max_weight)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node, StreetGraph};

    fn graph_from(n: i64, arcs: &[(i64, i64, f64)]) -> StreetGraph {
        let mut g = StreetGraph::new();
        for id in 0..n { g.add_node(Node::new(id, 0.0, 0.0)); }
        for &(u, v, w) in arcs { g.add_edge(Edge::new(u, v, w)).unwrap(); }
        g
    }

    #[test]
    fn undirected_triangle_plus_tail() {
        // triangle 0-1-2 with pendant 3 on node 2
        let g = graph_from(4, &[(0, 1, 1.0), (1, 2, 1.0), (2, 0, 1.0), (2, 3, 1.0)]);
        let u = SimpleGraph::from_digraph(&SimpleDigraph::from_graph(&g));
        assert_eq!(undirected_clustering(&u, 0, None), 1.0);
        assert!((undirected_clustering(&u, 2, None) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(undirected_clustering(&u, 3, None), 0.0);
        assert!((average_undirected(&u, false) - (1.0 + 1.0 + 1.0 / 3.0) / 4.0).abs() < 1e-12);
    }

    #[test]
    fn undirected_weighted_uses_geometric_mean() {
        let g = graph_from(3, &[(0, 1, 1.0), (1, 2, 8.0), (2, 0, 8.0)]);
        let u = SimpleGraph::from_digraph(&SimpleDigraph::from_graph(&g));
        // cbrt(1/8 * 1 * 1) = 0.5 for every node
        for v in 0..3 { assert!((undirected_clustering(&u, v, Some(u.max_weight())) - 0.5).abs() < 1e-12); }
    }

    #[test]
    fn self_loops_are_ignored() {
        let g = graph_from(3, &[(0, 1, 1.0), (1, 2, 1.0), (2, 0, 1.0), (0, 0, 1.0)]);
        let u = SimpleGraph::from_digraph(&SimpleDigraph::from_graph(&g));
        assert_eq!(undirected_clustering(&u, 0, None), 1.0);
        let d = SimpleDigraph::from_graph(&g);
        assert!((directed_clustering(&d, 0, None) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn directed_cycle_and_complete() {
        // a 3-cycle: each node has one triangle orientation out of two possible
        let cycle = SimpleDigraph::from_graph(&graph_from(3, &[(0, 1, 1.0), (1, 2, 1.0), (2, 0, 1.0)]));
        assert!((average_directed(&cycle, false) - 0.5).abs() < 1e-12);

        let all: Vec<(i64, i64, f64)> = (0..3).flat_map(|u| (0..3).filter(move |&v| v != u).map(move |v| (u, v, 1.0))).collect();
        let complete = SimpleDigraph::from_graph(&graph_from(3, &all));
        assert!((average_directed(&complete, false) - 1.0).abs() < 1e-12);
        assert!((average_directed(&complete, true) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn weighted_averages_scale_to_large_grids() {
        let side = 100;
        let id = |r: i64, c: i64| r * side + c;
        let mut arcs = Vec::new();
        for r in 0..side {
            for c in 0..side {
                if c + 1 < side { arcs.extend([(id(r, c), id(r, c + 1), 1.0 + c as f64), (id(r, c + 1), id(r, c), 1.0 + c as f64)]) }
                if r + 1 < side { arcs.extend([(id(r, c), id(r + 1, c), 2.0), (id(r + 1, c), id(r, c), 2.0)]) }
                if r + 1 < side && c + 1 < side { arcs.push((id(r, c), id(r + 1, c + 1), 3.0)) }
            }
        }
        let d = SimpleDigraph::from_graph(&graph_from(side * side, &arcs));
        let u = SimpleGraph::from_digraph(&d);

        let start = std::time::Instant::now();
        let directed = average_directed(&d, true);
        let undirected = average_undirected(&u, true);
        assert!(start.elapsed().as_secs() < 5, "clustering took {:?}", start.elapsed());
        assert!(directed > 0.0 && directed <= average_directed(&d, false));
        assert!(undirected > 0.0 && undirected <= average_undirected(&u, false));
    }

    #[test]
    fn empty_graph_averages_to_zero() {
        assert_eq!(average_directed(&SimpleDigraph::default(), false), 0.0);
        assert_eq!(average_undirected(&SimpleGraph::default(), true), 0.0);
    }
}
