/// A weighted adjacency list in compressed sparse row format.
///
/// `offsets[u]..offsets[u+1]` indexes into `targets` and `weights` to give the
/// arcs leaving node `u`, in insertion order. Parallel arcs are kept.
#[derive(Debug, Default, Clone)]
pub struct Csr {
    offsets: Vec<u32>,
    targets: Vec<u32>,
    weights: Vec<f64>,
}

impl Csr {
    /// Construct from `(source, target, weight)` arcs over `num_nodes` nodes.
    pub fn from_arcs(num_nodes: usize, arcs: impl IntoIterator<Item = (usize, usize, f64)>) -> Self {
        let arcs: Vec<(usize, usize, f64)> = arcs.into_iter().collect();

        let mut counts = vec![0u32; num_nodes];
        for &(u, _, _) in &arcs { counts[u] += 1 }

        let offsets: Vec<u32> = std::iter::once(0u32)
            .chain(counts.iter().scan(0u32, |acc, &len| { *acc += len; Some(*acc) }))
            .collect();

        let mut cursor: Vec<u32> = offsets[..num_nodes].to_vec();
        let mut targets = vec![0u32; arcs.len()];
        let mut weights = vec![0.0; arcs.len()];
        for (u, v, w) in arcs {
            let slot = cursor[u] as usize;
            targets[slot] = v as u32;
            weights[slot] = w;
            cursor[u] += 1;
        }

        Self { offsets, targets, weights }
    }

    /// Get the number of nodes.
    #[inline] pub fn node_count(&self) -> usize { self.offsets.len().saturating_sub(1) }

    /// Get the number of arcs.
    #[inline] pub fn arc_count(&self) -> usize { self.targets.len() }

    #[inline]
    fn range(&self, node: usize) -> std::ops::Range<usize> {
        self.offsets[node] as usize .. self.offsets[node + 1] as usize
    }

    /// Get the number of arcs leaving a node.
    #[inline] pub fn degree(&self, node: usize) -> usize { self.range(node).len() }

    /// Get an iterator over the targets of arcs leaving a node.
    #[inline]
    pub fn neighbors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.range(node).map(move |i| self.targets[i] as usize)
    }

    /// Get an iterator over targets and weights of arcs leaving a node.
    #[inline]
    pub fn neighbors_with_weights(&self, node: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.range(node).map(move |i| (self.targets[i] as usize, self.weights[i]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_csr() -> Csr {
        Csr::from_arcs(4, [
            (2, 3, 0.5),
            (0, 1, 1.5),
            (1, 0, 1.5),
            (0, 2, 2.0),
            (2, 0, 2.0),
            (2, 1, 3.5),
        ])
    }

    #[test]
    fn csr_construction() {
        let csr = make_test_csr();
        assert_eq!(csr.node_count(), 4);
        assert_eq!(csr.arc_count(), 6);
        assert_eq!(csr.offsets, vec![0, 2, 3, 6, 6]);

        // Offsets must be non-decreasing
        for window in csr.offsets.windows(2) { assert!(window[0] <= window[1]) }
    }

    #[test]
    fn arcs_keep_insertion_order_per_node() {
        let csr = make_test_csr();
        assert_eq!(csr.neighbors(0).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(csr.neighbors(2).collect::<Vec<_>>(), vec![3, 0, 1]);
        assert_eq!(csr.neighbors_with_weights(2).map(|(_, w)| w).collect::<Vec<_>>(), vec![0.5, 2.0, 3.5]);
    }

    #[test]
    fn degree_matches_offsets() {
        let csr = make_test_csr();
        assert_eq!(csr.degree(0), 2);
        assert_eq!(csr.degree(1), 1);
        assert_eq!(csr.degree(2), 3);
        assert_eq!(csr.degree(3), 0);
    }
}
