use std::collections::BTreeMap;

use ahash::AHashMap;
use geo::Coord;

use crate::graph::{Edge, StreetGraph};

// ---------------------------------------------------------------------------
// Directed, no parallel edges
// ---------------------------------------------------------------------------

/// Directed simple graph over the node indices of a `StreetGraph`. Among
/// parallel edges only the shortest is kept; self-loops are kept.
#[derive(Debug, Clone, Default)]
pub struct SimpleDigraph {
    succ: Vec<BTreeMap<usize, f64>>,
    pred: Vec<BTreeMap<usize, f64>>,
}

impl SimpleDigraph {
    /// Collapse parallel edges, keeping the minimum `length` as the weight.
    pub fn from_graph(graph: &StreetGraph) -> Self {
        let n = graph.node_count();
        let mut succ = vec![BTreeMap::<usize, f64>::new(); n];
        for ((u, v), e) in graph.edge_indices().zip(graph.edges()) {
            succ[u].entry(v)
                .and_modify(|w| if e.length < *w { *w = e.length })
                .or_insert(e.length);
        }

        let mut pred = vec![BTreeMap::new(); n];
        for (u, targets) in succ.iter().enumerate() {
            for (&v, &w) in targets { pred[v].insert(u, w); }
        }

        Self { succ, pred }
    }

    #[inline] pub fn node_count(&self) -> usize { self.succ.len() }

    pub fn edge_count(&self) -> usize { self.succ.iter().map(BTreeMap::len).sum() }

    #[inline] pub fn successors(&self, node: usize) -> &BTreeMap<usize, f64> { &self.succ[node] }

    #[inline] pub fn predecessors(&self, node: usize) -> &BTreeMap<usize, f64> { &self.pred[node] }

    /// Weight of the arc `u -> v`, if present.
    #[inline] pub fn weight(&self, u: usize, v: usize) -> Option<f64> { self.succ[u].get(&v).copied() }

    /// Largest arc weight, or 1.0 for an edgeless graph.
    pub fn max_weight(&self) -> f64 {
        self.succ.iter()
            .flat_map(|m| m.values().copied())
            .fold(None, |acc: Option<f64>, w| Some(acc.map_or(w, |a| a.max(w))))
            .unwrap_or(1.0)
    }
}

// ---------------------------------------------------------------------------
// Undirected, no parallel edges
// ---------------------------------------------------------------------------

/// Undirected simple graph derived from a `SimpleDigraph`. When both `u -> v`
/// and `v -> u` exist, the arc from the later source node wins.
#[derive(Debug, Clone, Default)]
pub struct SimpleGraph {
    adj: Vec<BTreeMap<usize, f64>>,
}

impl SimpleGraph {
    pub fn from_digraph(digraph: &SimpleDigraph) -> Self {
        let mut adj = vec![BTreeMap::new(); digraph.node_count()];
        for u in 0..digraph.node_count() {
            for (&v, &w) in digraph.successors(u) {
                adj[u].insert(v, w);
                adj[v].insert(u, w);
            }
        }
        Self { adj }
    }

    #[inline] pub fn node_count(&self) -> usize { self.adj.len() }

    /// Number of edges, counting each self-loop once.
    pub fn edge_count(&self) -> usize {
        let (loops, links) = self.adj.iter().enumerate()
            .fold((0, 0), |(l, k), (u, m)| if m.contains_key(&u) { (l + 1, k + m.len() - 1) } else { (l, k + m.len()) });
        loops + links / 2
    }

    #[inline] pub fn neighbors(&self, node: usize) -> &BTreeMap<usize, f64> { &self.adj[node] }

    #[inline] pub fn weight(&self, u: usize, v: usize) -> Option<f64> { self.adj[u].get(&v).copied() }

    /// Largest edge weight, or 1.0 for an edgeless graph.
    pub fn max_weight(&self) -> f64 {
        self.adj.iter()
            .flat_map(|m| m.values().copied())
            .fold(None, |acc: Option<f64>, w| Some(acc.map_or(w, |a| a.max(w))))
            .unwrap_or(1.0)
    }
}

// ---------------------------------------------------------------------------
// Undirected multigraph
// ---------------------------------------------------------------------------

/// An undirected edge referencing the directed edge it was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndirectedEdge {
    /// Node index of the source of the underlying directed edge.
    pub a: usize,
    /// Node index of the target of the underlying directed edge.
    pub b: usize,
    /// Index into `StreetGraph::edges`.
    pub edge: usize,
}

/// Undirected multigraph in which each two-way street appears once.
///
/// Directed edges between the same pair of nodes are treated as one street
/// when they come from the same OSM ways and trace the same geometry (in
/// either direction). Other parallel edges are kept.
#[derive(Debug, Clone, Default)]
pub struct UndirectedMultigraph {
    node_count: usize,
    edges: Vec<UndirectedEdge>,
}

impl UndirectedMultigraph {
    pub fn from_graph(graph: &StreetGraph) -> Self {
        let mut groups: AHashMap<(usize, usize), Vec<usize>> = AHashMap::new();
        let mut order: Vec<(usize, usize)> = Vec::new();
        let endpoints: Vec<(usize, usize)> = graph.edge_indices().collect();

        for (i, &(u, v)) in endpoints.iter().enumerate() {
            let pair = (u.min(v), u.max(v));
            groups.entry(pair).or_insert_with(|| { order.push(pair); Vec::new() }).push(i);
        }

        let mut edges = Vec::with_capacity(graph.edge_count());
        for pair in order {
            let members = &groups[&pair];
            let mut duplicate = vec![false; members.len()];
            for i in 0..members.len() {
                if duplicate[i] { continue }
                for j in 0..members.len() {
                    if i == j || duplicate[j] { continue }
                    if is_duplicate(graph, &graph.edges()[members[i]], &graph.edges()[members[j]]) {
                        duplicate[j] = true;
                    }
                }
            }
            for (k, &idx) in members.iter().enumerate() {
                if duplicate[k] { continue }
                let (a, b) = endpoints[idx];
                edges.push(UndirectedEdge { a, b, edge: idx });
            }
        }

        // Restore directed edge order.
        edges.sort_by_key(|e| e.edge);
        Self { node_count: graph.node_count(), edges }
    }

    #[inline] pub fn node_count(&self) -> usize { self.node_count }

    #[inline] pub fn edge_count(&self) -> usize { self.edges.len() }

    #[inline] pub fn edges(&self) -> &[UndirectedEdge] { &self.edges }

    /// Neighbor lists per node index (self-loops excluded, duplicates removed).
    pub fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adj = vec![Vec::new(); self.node_count];
        for e in self.edges.iter().filter(|e| e.a != e.b) {
            adj[e.a].push(e.b);
            adj[e.b].push(e.a);
        }
        for list in adj.iter_mut() {
            list.sort_unstable();
            list.dedup();
        }
        adj
    }
}

/// Coordinates traced by an edge, falling back to its straight endpoints.
pub fn edge_coords(graph: &StreetGraph, edge: &Edge) -> Vec<Coord<f64>> {
    match &edge.geometry {
        Some(line) => line.0.clone(),
        None => {
            let point = |osmid| graph.node(osmid).map(|n| Coord { x: n.x, y: n.y });
            [point(edge.u), point(edge.v)].into_iter().flatten().collect()
        }
    }
}

fn is_duplicate(graph: &StreetGraph, first: &Edge, second: &Edge) -> bool {
    let mut a = first.osmid.clone();
    let mut b = second.osmid.clone();
    a.sort_unstable();
    a.dedup();
    b.sort_unstable();
    b.dedup();
    if a != b { return false }

    let ca = edge_coords(graph, first);
    let cb = edge_coords(graph, second);
    ca == cb || ca.iter().rev().eq(cb.iter())
}
