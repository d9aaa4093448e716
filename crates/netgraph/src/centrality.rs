use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::convert::SimpleDigraph;
use crate::csr::Csr;
use crate::graph::GraphError;

/// Relative tolerance under which two path lengths count as equal.
const TIE_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Visit {
    dist: f64,
    node: usize,
}

impl Eq for Visit {}

impl Ord for Visit {
    // Reversed so the max-heap pops the closest node first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.dist.total_cmp(&self.dist).then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Visit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

#[inline]
fn same_length(a: f64, b: f64) -> bool {
    (a - b).abs() <= TIE_EPSILON * a.abs().max(b.abs()).max(1.0)
}

/// Raw (unnormalized) weighted betweenness centrality on a directed multigraph.
///
/// Each parallel arc is a distinct path, so a pair connected by two equally
/// short arcs has two shortest paths. Weights must be strictly positive.
pub fn betweenness(csr: &Csr) -> Vec<f64> {
    let n = csr.node_count();
    let mut centrality = vec![0.0; n];

    let mut dist = vec![f64::INFINITY; n];
    let mut sigma = vec![0.0f64; n];
    let mut delta = vec![0.0f64; n];
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut settled = vec![false; n];
    let mut touched: Vec<usize> = Vec::new();
    let mut stack: Vec<usize> = Vec::with_capacity(n);
    let mut heap = BinaryHeap::new();

    for source in 0..n {
        dist[source] = 0.0;
        sigma[source] = 1.0;
        touched.push(source);
        heap.push(Visit { dist: 0.0, node: source });

        while let Some(Visit { node: v, .. }) = heap.pop() {
            if settled[v] { continue }
            settled[v] = true;
            stack.push(v);

            let d = dist[v];
            for (w, weight) in csr.neighbors_with_weights(v) {
                if settled[w] { continue }
                let candidate = d + weight;
                if dist[w].is_infinite() {
                    touched.push(w);
                    dist[w] = candidate;
                    sigma[w] = sigma[v];
                    preds[w].push(v);
                    heap.push(Visit { dist: candidate, node: w });
                } else if same_length(candidate, dist[w]) {
                    sigma[w] += sigma[v];
                    preds[w].push(v);
                } else if candidate < dist[w] {
                    dist[w] = candidate;
                    sigma[w] = sigma[v];
                    preds[w].clear();
                    preds[w].push(v);
                    heap.push(Visit { dist: candidate, node: w });
                }
            }
        }

        // Accumulate dependencies in order of non-increasing distance.
        while let Some(w) = stack.pop() {
            let coeff = (1.0 + delta[w]) / sigma[w];
            for &v in &preds[w] { delta[v] += sigma[v] * coeff; }
            if w != source { centrality[w] += delta[w]; }
        }

        for &v in &touched {
            dist[v] = f64::INFINITY;
            sigma[v] = 0.0;
            delta[v] = 0.0;
            preds[v].clear();
            settled[v] = false;
        }
        touched.clear();
    }

    centrality
}

/// Normalize raw directed betweenness by the number of ordered node pairs
/// excluding the node itself.
pub fn normalize_betweenness(raw: &mut [f64]) {
    let n = raw.len() as f64;
    let scale = if raw.len() > 2 { 1.0 / ((n - 1.0) * (n - 2.0)) } else { 0.0 };
    raw.iter_mut().for_each(|x| *x *= scale);
}

/// Weighted PageRank by power iteration.
///
/// Out-weights are normalized per node; dangling nodes redistribute their mass
/// uniformly. Converges when the L1 change falls below `n * tol`.
pub fn pagerank(graph: &SimpleDigraph, alpha: f64, max_iter: usize, tol: f64) -> Result<Vec<f64>, GraphError> {
    let n = graph.node_count();
    if n == 0 { return Ok(Vec::new()) }

    let out_weight: Vec<f64> = (0..n).map(|u| graph.successors(u).values().sum()).collect();
    let uniform = 1.0 / n as f64;
    let mut x = vec![uniform; n];

    for _ in 0..max_iter {
        let dangling: f64 = (0..n).filter(|&u| out_weight[u] == 0.0).map(|u| x[u]).sum();
        let mut next = vec![alpha * dangling * uniform + (1.0 - alpha) * uniform; n];
        for u in 0..n {
            if out_weight[u] == 0.0 { continue }
            let share = alpha * x[u] / out_weight[u];
            for (&v, &w) in graph.successors(u) { next[v] += share * w; }
        }

        let err: f64 = next.iter().zip(&x).map(|(a, b)| (a - b).abs()).sum();
        x = next;
        if err < n as f64 * tol { return Ok(x) }
    }

    Err(GraphError::NoConvergence { iterations: max_iter })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node, StreetGraph};

    fn path_csr(n: usize) -> Csr {
        // undirected path 0 - 1 - ... - n-1 as arcs both ways
        let arcs = (0..n - 1).flat_map(|i| [(i, i + 1, 1.0), (i + 1, i, 1.0)]);
        Csr::from_arcs(n, arcs)
    }

    #[test]
    fn path_betweenness() {
        let bc = betweenness(&path_csr(3));
        assert_eq!(bc, vec![0.0, 2.0, 0.0]);

        let bc = betweenness(&path_csr(4));
        assert_eq!(bc, vec![0.0, 4.0, 4.0, 0.0]);
    }

    #[test]
    fn equal_paths_split_credit() {
        // 0 -> 1 -> 3 and 0 -> 2 -> 3, both length 2
        let csr = Csr::from_arcs(4, [(0, 1, 1.0), (1, 3, 1.0), (0, 2, 1.0), (2, 3, 1.0)]);
        let bc = betweenness(&csr);
        assert!((bc[1] - 0.5).abs() < 1e-12);
        assert!((bc[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn parallel_arcs_count_as_distinct_paths() {
        // 0 => 1 (two arcs), 0 -> 2 -> 1 all equal length
        let csr = Csr::from_arcs(3, [(0, 1, 2.0), (0, 1, 2.0), (0, 2, 1.0), (2, 1, 1.0)]);
        let bc = betweenness(&csr);
        assert!((bc[2] - 1.0 / 3.0).abs() < 1e-12, "{bc:?}");
    }

    #[test]
    fn shorter_weighted_detour_wins() {
        let csr = Csr::from_arcs(3, [(0, 1, 10.0), (0, 2, 1.0), (2, 1, 1.0)]);
        assert_eq!(betweenness(&csr), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn normalization() {
        let mut bc = vec![0.0, 4.0, 4.0, 0.0];
        normalize_betweenness(&mut bc);
        assert!((bc[1] - 4.0 / 6.0).abs() < 1e-12);

        let mut tiny = vec![1.0, 1.0];
        normalize_betweenness(&mut tiny);
        assert_eq!(tiny, vec![0.0, 0.0]);
    }

    #[test]
    fn pagerank_sums_to_one_and_favors_sinks() {
        let mut g = StreetGraph::new();
        for id in 1..=3 { g.add_node(Node::new(id, 0.0, 0.0)); }
        g.add_edge(Edge::new(1, 2, 1.0)).unwrap();
        g.add_edge(Edge::new(3, 2, 1.0)).unwrap();
        g.add_edge(Edge::new(2, 1, 1.0)).unwrap();

        let pr = pagerank(&SimpleDigraph::from_graph(&g), 0.85, 100, 1e-6).unwrap();
        assert!((pr.iter().sum::<f64>() - 1.0).abs() < 1e-6);
        assert!(pr[1] > pr[0] && pr[0] > pr[2]);
    }

    #[test]
    fn pagerank_empty_graph() {
        assert!(pagerank(&SimpleDigraph::default(), 0.85, 100, 1e-6).unwrap().is_empty());
    }
}
