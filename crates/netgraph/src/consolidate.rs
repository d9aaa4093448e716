use rstar::{RTree, RTreeObject, AABB};

use crate::convert::UndirectedMultigraph;
use crate::geodesy::project_local;
use crate::graph::StreetGraph;

#[derive(Debug, Clone)]
struct PlanarNode {
    idx: usize, // Index of the node in the graph
    pos: [f64; 2],
}

impl RTreeObject for PlanarNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope { AABB::from_point(self.pos) }
}

/// Disjoint-set forest over node indices.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self { Self { parent: (0..n).collect() } }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb { self.parent[ra.max(rb)] = ra.min(rb) }
    }
}

/// Group non-dead-end nodes whose `tolerance` buffers overlap, transitively.
///
/// Nodes with `street_count <= 1` are excluded. Coordinates are projected to
/// local meters around the mean latitude. Returns clusters of node indices,
/// ordered by their smallest member.
pub fn merge_nearby(graph: &StreetGraph, tolerance: f64) -> Vec<Vec<usize>> {
    let nodes = graph.nodes();
    let kept: Vec<usize> = (0..nodes.len())
        .filter(|&i| nodes[i].street_count.unwrap_or(0) > 1)
        .collect();
    if kept.is_empty() { return Vec::new() }

    let ref_lat = kept.iter().map(|&i| nodes[i].y).sum::<f64>() / kept.len() as f64;
    let points: Vec<PlanarNode> = kept.iter()
        .map(|&i| PlanarNode { idx: i, pos: project_local(nodes[i].x, nodes[i].y, ref_lat) })
        .collect();

    let reach = 2.0 * tolerance;
    let tree = RTree::bulk_load(points.clone());
    let mut forest = UnionFind::new(nodes.len());
    for p in &points {
        let [x, y] = p.pos;
        let window = AABB::from_corners([x - reach, y - reach], [x + reach, y + reach]);
        for q in tree.locate_in_envelope(&window) {
            let d2 = (q.pos[0] - x).powi(2) + (q.pos[1] - y).powi(2);
            if q.idx != p.idx && d2 < reach * reach { forest.union(p.idx, q.idx) }
        }
    }

    let mut clusters: Vec<Vec<usize>> = Vec::new();
    let mut slot = vec![usize::MAX; nodes.len()];
    for &i in &kept {
        let root = forest.find(i);
        if slot[root] == usize::MAX {
            slot[root] = clusters.len();
            clusters.push(Vec::new());
        }
        clusters[slot[root]].push(i);
    }
    clusters
}

/// Split each cluster into the connected components of the subgraph it
/// induces, so nearby but unconnected nodes stay separate.
pub fn split_disconnected(clusters: &[Vec<usize>], multigraph: &UndirectedMultigraph) -> Vec<Vec<usize>> {
    let adjacency = multigraph.adjacency();
    let mut member = vec![usize::MAX; multigraph.node_count()];
    let mut result = Vec::new();

    for (c, cluster) in clusters.iter().enumerate() {
        if cluster.len() == 1 {
            result.push(cluster.clone());
            continue;
        }
        for &v in cluster { member[v] = c }

        let mut seen = vec![false; cluster.len()];
        let position = |v: usize| cluster.iter().position(|&x| x == v);
        for start in 0..cluster.len() {
            if seen[start] { continue }
            seen[start] = true;
            let mut component = vec![cluster[start]];
            let mut frontier = vec![cluster[start]];
            while let Some(v) = frontier.pop() {
                for &w in &adjacency[v] {
                    if member[w] != c { continue }
                    if let Some(p) = position(w) && !seen[p] {
                        seen[p] = true;
                        component.push(w);
                        frontier.push(w);
                    }
                }
            }
            component.sort_unstable();
            result.push(component);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node};

    /// Offset in degrees of longitude at the equator for a distance in meters.
    fn meters(m: f64) -> f64 { m / 111_195.08 }

    fn node(id: i64, x_m: f64, streets: u32) -> Node {
        let mut n = Node::new(id, meters(x_m), 0.0);
        n.street_count = Some(streets);
        n
    }

    fn make_test_graph() -> StreetGraph {
        let mut g = StreetGraph::new();
        // 1 - 2 are 15 m apart and connected; 3 is 15 m from 2 but unconnected;
        // 4 is far away; 5 is a dead-end next to 1.
        g.add_node(node(1, 0.0, 3));
        g.add_node(node(2, 15.0, 3));
        g.add_node(node(3, 30.0, 3));
        g.add_node(node(4, 500.0, 3));
        g.add_node(node(5, 1.0, 1));
        g.add_edge(Edge::new(1, 2, 15.0)).unwrap();
        g.add_edge(Edge::new(2, 4, 470.0)).unwrap();
        g.add_edge(Edge::new(3, 4, 470.0)).unwrap();
        g.add_edge(Edge::new(1, 5, 1.0)).unwrap();
        g
    }

    #[test]
    fn chains_merge_transitively() {
        let clusters = merge_nearby(&make_test_graph(), 10.0);
        assert_eq!(clusters, vec![vec![0, 1, 2], vec![3]]);
    }

    #[test]
    fn buffers_that_do_not_overlap_stay_apart() {
        let clusters = merge_nearby(&make_test_graph(), 7.0);
        assert_eq!(clusters.len(), 4);
    }

    #[test]
    fn topology_splits_unconnected_members() {
        let g = make_test_graph();
        let clusters = merge_nearby(&g, 10.0);
        let split = split_disconnected(&clusters, &UndirectedMultigraph::from_graph(&g));
        assert_eq!(split, vec![vec![0, 1], vec![2], vec![3]]);
    }
}
