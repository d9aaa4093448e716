use std::collections::BTreeMap;
use std::fmt;

use ahash::AHashMap;
use geo::LineString;

use crate::csr::Csr;

/// Errors produced by graph construction, mutation and serialization.
#[derive(Debug)]
pub enum GraphError {
    /// An edge references a node id that is not in the graph.
    MissingNode(i64),
    /// A node is missing an attribute required by the operation.
    MissingAttribute { osmid: i64, attr: &'static str },
    /// The GraphML document is malformed or uses unsupported constructs.
    Format(String),
    /// An iterative algorithm did not converge within its iteration limit.
    NoConvergence { iterations: usize },
    /// Reading or writing the underlying file failed.
    Io(std::io::Error),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::MissingNode(osmid) => write!(f, "edge references unknown node {osmid}"),
            GraphError::MissingAttribute { osmid, attr } => write!(f, "node {osmid} has no {attr:?} attribute"),
            GraphError::Format(msg) => write!(f, "invalid graphml: {msg}"),
            GraphError::NoConvergence { iterations } => write!(f, "failed to converge in {iterations} iterations"),
            GraphError::Io(err) => write!(f, "graphml i/o: {err}"),
        }
    }
}

impl std::error::Error for GraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GraphError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GraphError {
    fn from(err: std::io::Error) -> Self { GraphError::Io(err) }
}

impl From<quick_xml::Error> for GraphError {
    fn from(err: quick_xml::Error) -> Self { GraphError::Format(err.to_string()) }
}

// ---------------------------------------------------------------------------
// Nodes and edges
// ---------------------------------------------------------------------------

/// A street intersection or dead-end.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub osmid: i64,
    /// Longitude (EPSG:4326).
    pub x: f64,
    /// Latitude (EPSG:4326).
    pub y: f64,
    /// Number of physical street segments meeting at this node.
    pub street_count: Option<u32>,
    /// Reconciled elevation in meters.
    pub elevation: Option<f64>,
    pub elevation_aster: Option<f64>,
    pub elevation_srtm: Option<f64>,
    /// Normalized length-weighted betweenness centrality.
    pub bc: Option<f64>,
    /// Remaining OSM attributes, e.g. `highway`, `ref`.
    pub tags: BTreeMap<String, String>,
}

impl Node {
    pub fn new(osmid: i64, x: f64, y: f64) -> Self {
        Self {
            osmid,
            x,
            y,
            street_count: None,
            elevation: None,
            elevation_aster: None,
            elevation_srtm: None,
            bc: None,
            tags: BTreeMap::new(),
        }
    }
}

/// A directed street segment between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub u: i64,
    pub v: i64,
    /// Disambiguates parallel edges between the same `(u, v)`.
    pub key: u32,
    /// OSM way ids this segment was built from.
    pub osmid: Vec<i64>,
    /// Length along the edge in meters.
    pub length: f64,
    pub oneway: bool,
    /// Whether the edge runs opposite to the digitized direction of its way.
    pub reversed: bool,
    pub grade: Option<f64>,
    pub grade_abs: Option<f64>,
    /// Centerline geometry, absent for straight segments.
    pub geometry: Option<LineString<f64>>,
    pub tags: BTreeMap<String, String>,
}

impl Edge {
    pub fn new(u: i64, v: i64, length: f64) -> Self {
        Self {
            u,
            v,
            key: 0,
            osmid: Vec::new(),
            length,
            oneway: false,
            reversed: false,
            grade: None,
            grade_abs: None,
            geometry: None,
            tags: BTreeMap::new(),
        }
    }

    #[inline] pub fn is_self_loop(&self) -> bool { self.u == self.v }
}

// ---------------------------------------------------------------------------
// StreetGraph
// ---------------------------------------------------------------------------

/// A directed multigraph of street intersections and segments, keyed by OSM
/// node id. Node order is insertion order and is preserved through I/O.
#[derive(Debug, Clone, Default)]
pub struct StreetGraph {
    /// Graph-level attributes, e.g. `crs`, `simplified`.
    pub attrs: BTreeMap<String, String>,
    nodes: Vec<Node>,
    index: AHashMap<i64, usize>,
    edges: Vec<Edge>,
    /// Next free key per `(u, v)` pair.
    next_key: AHashMap<(i64, i64), u32>,
}

impl StreetGraph {
    pub fn new() -> Self {
        let mut graph = Self::default();
        graph.attrs.insert("crs".into(), "epsg:4326".into());
        graph
    }

    #[inline] pub fn node_count(&self) -> usize { self.nodes.len() }

    #[inline] pub fn edge_count(&self) -> usize { self.edges.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    #[inline] pub fn nodes(&self) -> &[Node] { &self.nodes }

    #[inline] pub fn nodes_mut(&mut self) -> &mut [Node] { &mut self.nodes }

    #[inline] pub fn edges(&self) -> &[Edge] { &self.edges }

    /// Mutable edge attributes. Endpoints and keys must stay unchanged.
    #[inline] pub fn edges_mut(&mut self) -> &mut [Edge] { &mut self.edges }

    /// Get the contiguous index of a node id.
    #[inline] pub fn index_of(&self, osmid: i64) -> Option<usize> { self.index.get(&osmid).copied() }

    #[inline] pub fn contains_node(&self, osmid: i64) -> bool { self.index.contains_key(&osmid) }

    pub fn node(&self, osmid: i64) -> Option<&Node> {
        self.index_of(osmid).map(|i| &self.nodes[i])
    }

    pub fn node_mut(&mut self, osmid: i64) -> Option<&mut Node> {
        self.index_of(osmid).map(|i| &mut self.nodes[i])
    }

    /// Insert a node, replacing any existing node with the same id.
    pub fn add_node(&mut self, node: Node) {
        match self.index.get(&node.osmid) {
            Some(&i) => self.nodes[i] = node,
            None => {
                self.index.insert(node.osmid, self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    /// Insert an edge, assigning the next free key for its `(u, v)` pair.
    /// Returns the assigned key.
    pub fn add_edge(&mut self, mut edge: Edge) -> Result<u32, GraphError> {
        if !self.contains_node(edge.u) { return Err(GraphError::MissingNode(edge.u)) }
        if !self.contains_node(edge.v) { return Err(GraphError::MissingNode(edge.v)) }
        let next = self.next_key.entry((edge.u, edge.v)).or_insert(0);
        edge.key = *next;
        *next += 1;
        let key = edge.key;
        self.edges.push(edge);
        Ok(key)
    }

    /// Insert an edge keeping the key it already carries (used by readers).
    pub fn add_edge_with_key(&mut self, edge: Edge) -> Result<(), GraphError> {
        if !self.contains_node(edge.u) { return Err(GraphError::MissingNode(edge.u)) }
        if !self.contains_node(edge.v) { return Err(GraphError::MissingNode(edge.v)) }
        let next = self.next_key.entry((edge.u, edge.v)).or_insert(0);
        *next = (*next).max(edge.key + 1);
        self.edges.push(edge);
        Ok(())
    }

    /// Keep only nodes matching `keep`, dropping their incident edges.
    pub fn retain_nodes(&mut self, mut keep: impl FnMut(&Node) -> bool) {
        self.nodes.retain(|node| keep(node));
        self.reindex();
        let index = &self.index;
        self.edges.retain(|e| index.contains_key(&e.u) && index.contains_key(&e.v));
        self.rekey();
    }

    /// Remove nodes that have no incident edges.
    pub fn remove_isolated_nodes(&mut self) {
        let mut touched = vec![false; self.nodes.len()];
        for e in &self.edges {
            touched[self.index[&e.u]] = true;
            touched[self.index[&e.v]] = true;
        }
        let mut i = 0;
        self.nodes.retain(|_| { i += 1; touched[i - 1] });
        self.reindex();
    }

    fn rekey(&mut self) {
        self.next_key.clear();
        for e in &self.edges {
            let next = self.next_key.entry((e.u, e.v)).or_insert(0);
            *next = (*next).max(e.key + 1);
        }
    }

    fn reindex(&mut self) {
        self.index = self.nodes.iter().enumerate().map(|(i, n)| (n.osmid, i)).collect();
    }

    /// Endpoint indices of every edge, in edge order.
    pub fn edge_indices(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.edges.iter().map(|e| (self.index[&e.u], self.index[&e.v]))
    }

    /// Outgoing adjacency with `weight` applied to each edge.
    pub fn out_csr(&self, weight: impl Fn(&Edge) -> f64) -> Csr {
        Csr::from_arcs(
            self.nodes.len(),
            self.edges.iter().map(|e| (self.index[&e.u], self.index[&e.v], weight(e))),
        )
    }

    /// Recompute `grade` (rise over run) and `grade_abs` for every edge from
    /// node elevations. Zero-length edges get a grade of zero.
    pub fn add_edge_grades(&mut self) -> Result<(), GraphError> {
        let elevations = self.nodes.iter()
            .map(|n| n.elevation.ok_or(GraphError::MissingAttribute { osmid: n.osmid, attr: "elevation" }))
            .collect::<Result<Vec<f64>, _>>()?;

        for e in self.edges.iter_mut() {
            let rise = elevations[self.index[&e.v]] - elevations[self.index[&e.u]];
            let grade = if e.length > 0.0 { rise / e.length } else { 0.0 };
            e.grade = Some(grade);
            e.grade_abs = Some(grade.abs());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_graph() -> StreetGraph {
        let mut g = StreetGraph::new();
        for (id, x, y) in [(1, 0.0, 0.0), (2, 0.001, 0.0), (3, 0.001, 0.001)] {
            g.add_node(Node::new(id, x, y));
        }
        g.add_edge(Edge::new(1, 2, 100.0)).unwrap();
        g.add_edge(Edge::new(2, 1, 100.0)).unwrap();
        g.add_edge(Edge::new(2, 3, 50.0)).unwrap();
        g
    }

    #[test]
    fn parallel_edges_get_increasing_keys() {
        let mut g = make_test_graph();
        assert_eq!(g.add_edge(Edge::new(1, 2, 120.0)).unwrap(), 1);
        assert_eq!(g.add_edge(Edge::new(1, 2, 130.0)).unwrap(), 2);
        assert_eq!(g.add_edge(Edge::new(2, 3, 10.0)).unwrap(), 1);
    }

    #[test]
    fn keys_follow_kept_edges() {
        let mut g = make_test_graph();
        let mut edge = Edge::new(2, 3, 60.0);
        edge.key = 4;
        g.add_edge_with_key(edge).unwrap();
        assert_eq!(g.add_edge(Edge::new(2, 3, 70.0)).unwrap(), 5);

        g.retain_nodes(|n| n.osmid != 3);
        g.add_node(Node::new(3, 0.001, 0.001));
        assert_eq!(g.add_edge(Edge::new(2, 3, 50.0)).unwrap(), 0);
        assert_eq!(g.add_edge(Edge::new(1, 2, 100.0)).unwrap(), 1);
    }

    #[test]
    fn long_paths_build_quickly() {
        let n = 50_000;
        let mut g = StreetGraph::new();
        for id in 0..n { g.add_node(Node::new(id, id as f64 * 1e-4, 0.0)) }
        let start = std::time::Instant::now();
        for id in 0..n - 1 {
            g.add_edge(Edge::new(id, id + 1, 10.0)).unwrap();
            g.add_edge(Edge::new(id + 1, id, 10.0)).unwrap();
        }
        assert_eq!(g.edge_count(), 2 * (n as usize - 1));
        assert!(g.edges().iter().all(|e| e.key == 0));
        assert!(start.elapsed().as_secs() < 5, "building took {:?}", start.elapsed());
    }

    #[test]
    fn add_edge_rejects_unknown_nodes() {
        let mut g = make_test_graph();
        assert!(matches!(g.add_edge(Edge::new(1, 99, 1.0)), Err(GraphError::MissingNode(99))));
    }

    #[test]
    fn retain_nodes_drops_incident_edges() {
        let mut g = make_test_graph();
        g.retain_nodes(|n| n.osmid != 3);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.index_of(2), Some(1));
    }

    #[test]
    fn isolated_nodes_are_removed() {
        let mut g = make_test_graph();
        g.add_node(Node::new(4, 1.0, 1.0));
        g.remove_isolated_nodes();
        assert_eq!(g.node_count(), 3);
        assert!(!g.contains_node(4));
    }

    #[test]
    fn grades_require_elevations() {
        let mut g = make_test_graph();
        assert!(g.add_edge_grades().is_err());

        for (n, elev) in g.nodes_mut().iter_mut().zip([10.0, 20.0, 15.0]) {
            n.elevation = Some(elev);
        }
        g.add_edge_grades().unwrap();
        let grades: Vec<f64> = g.edges().iter().map(|e| e.grade.unwrap()).collect();
        assert_eq!(grades, vec![0.1, -0.1, -0.1]);
        assert!(g.edges().iter().all(|e| e.grade_abs.unwrap() >= 0.0));
    }
}
