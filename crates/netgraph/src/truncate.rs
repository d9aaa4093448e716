use ahash::AHashSet;
use geo::{Intersects, MultiPolygon, Point};

use crate::graph::{GraphError, StreetGraph};

/// Remove nodes outside `boundary`.
///
/// With `by_edge`, an outside node survives when it is adjacent (in either
/// direction) to a node inside, so streets crossing the boundary keep their
/// outer endpoint. Errors if no node lies inside.
pub fn truncate_by_polygon(graph: &mut StreetGraph, boundary: &MultiPolygon<f64>, by_edge: bool) -> Result<(), GraphError> {
    let inside: AHashSet<i64> = graph.nodes().iter()
        .filter(|n| boundary.intersects(&Point::new(n.x, n.y)))
        .map(|n| n.osmid)
        .collect();
    if inside.is_empty() {
        return Err(GraphError::Format("no graph nodes inside the boundary".into()));
    }

    let mut keep = inside.clone();
    if by_edge {
        for e in graph.edges() {
            if inside.contains(&e.u) { keep.insert(e.v); }
            if inside.contains(&e.v) { keep.insert(e.u); }
        }
    }

    graph.retain_nodes(|n| keep.contains(&n.osmid));
    Ok(())
}
