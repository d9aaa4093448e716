use netgraph::{StreetGraph, UndirectedMultigraph, geodesy::bearing};

use super::stats::entropy;

/// Number of orientation bins.
pub const ENTROPY_BINS: usize = 36;
/// Streets this short or shorter are left out of the bearings.
pub const MIN_BEARING_LENGTH_M: f64 = 10.0;
/// Bins filled by a perfect grid.
const GRID_BINS: usize = 4;

/// Bearings of every undirected street longer than `min_length`, from its
/// first node to its last, together with the reverse bearings. Self-loops
/// have no bearing.
pub fn street_bearings(graph: &StreetGraph, undirected: &UndirectedMultigraph, min_length: f64) -> Vec<f64> {
    let nodes = graph.nodes();
    let forward: Vec<f64> = undirected.edges().iter()
        .filter(|e| e.a != e.b && graph.edges()[e.edge].length > min_length)
        .map(|e| {
            let (a, b) = (&nodes[e.a], &nodes[e.b]);
            bearing(a.x, a.y, b.x, b.y)
        })
        .collect();
    let reverse = forward.iter().map(|&b| if b < 180.0 { b + 180.0 } else { b - 180.0 });
    forward.iter().copied().chain(reverse).collect()
}

/// Histogram of bearings into `bins` bins centered on multiples of
/// `360 / bins`, so bearings just either side of north share a bin.
///
/// Counts are taken in twice as many half-width bins, the last half-bin is
/// moved to the front, and neighbouring half-bins are summed.
pub fn bearing_histogram(bearings: &[f64], bins: usize) -> Vec<u64> {
    let halves = bins * 2;
    let width = 360.0 / halves as f64;
    let mut counts = vec![0u64; halves];
    for &b in bearings.iter().filter(|b| (0.0..=360.0).contains(*b)) {
        let i = ((b / width) as usize).min(halves - 1);
        counts[i] += 1;
    }
    counts.rotate_right(1);
    counts.chunks_exact(2).map(|pair| pair[0] + pair[1]).collect()
}

/// Shannon entropy (nats) of the street bearings' distribution.
pub fn orientation_entropy(bearings: &[f64]) -> f64 {
    entropy(&bearing_histogram(bearings, ENTROPY_BINS))
}

/// How grid-like a network is: 1 for a perfect four-direction grid, 0 for
/// uniformly spread bearings.
pub fn orientation_order(entropy: f64) -> f64 {
    let max_entropy = (ENTROPY_BINS as f64).ln();
    let grid_entropy = (GRID_BINS as f64).ln();
    1.0 - ((entropy - grid_entropy) / (max_entropy - grid_entropy)).powi(2)
}
