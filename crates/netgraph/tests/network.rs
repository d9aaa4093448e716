use geo::{polygon, MultiPolygon};
use netgraph::centrality::{betweenness, normalize_betweenness, pagerank};
use netgraph::clustering::{average_directed, average_undirected};
use netgraph::consolidate::{merge_nearby, split_disconnected};
use netgraph::geodesy::great_circle;
use netgraph::simplify::{add_street_counts, simplify};
use netgraph::truncate::truncate_by_polygon;
use netgraph::{Edge, Node, SimpleDigraph, SimpleGraph, StreetGraph, UndirectedMultigraph};

const STEP: f64 = 0.001;

/// A 3x3 grid of two-way streets, each block split by a midpoint node, with
/// node ids `row * 10 + col` for corners and `100 + n` for midpoints.
fn grid() -> StreetGraph {
    let mut g = StreetGraph::new();
    for row in 0..3 {
        for col in 0..3 {
            g.add_node(Node::new(row * 10 + col, col as f64 * STEP, row as f64 * STEP));
        }
    }

    let mut mid = 100;
    let mut street = |g: &mut StreetGraph, a: i64, b: i64| {
        let (na, nb) = (g.node(a).unwrap().clone(), g.node(b).unwrap().clone());
        let m = Node::new(mid, (na.x + nb.x) / 2.0, (na.y + nb.y) / 2.0);
        let way = mid;
        mid += 1;
        g.add_node(m.clone());
        for (u, v) in [(&na, &m), (&m, &nb)] {
            let length = great_circle(u.x, u.y, v.x, v.y);
            for (s, t, reversed) in [(u, v, false), (v, u, true)] {
                let mut e = Edge::new(s.osmid, t.osmid, length);
                e.osmid = vec![way];
                e.reversed = reversed;
                g.add_edge(e).unwrap();
            }
        }
    };
    for row in 0..3 {
        for col in 0..3 {
            let id = row * 10 + col;
            if col < 2 { street(&mut g, id, id + 1); }
            if row < 2 { street(&mut g, id, id + 10); }
        }
    }
    g
}

#[test]
fn simplify_keeps_only_real_intersections() {
    let mut g = grid();
    assert_eq!(g.node_count(), 9 + 12);
    simplify(&mut g).unwrap();
    add_street_counts(&mut g);

    // corners join just two streets, so they are interstitial like midpoints
    assert_eq!(g.node_count(), 5);
    assert!(!g.contains_node(0));
    assert_eq!(g.edge_count(), 16);
    assert_eq!(g.node(11).unwrap().street_count, Some(4));
    assert_eq!(g.node(1).unwrap().street_count, Some(3));

    let around_corner = g.edges().iter().find(|e| e.u == 1 && e.v == 10).unwrap();
    assert_eq!(around_corner.geometry.as_ref().map(|l| l.0.len()), Some(5));
    assert_eq!(around_corner.osmid.len(), 2);
}

#[test]
fn undirected_view_counts_each_street_once() {
    let mut g = grid();
    simplify(&mut g).unwrap();
    assert_eq!(UndirectedMultigraph::from_graph(&g).edge_count(), 8);
}

#[test]
fn center_of_grid_is_most_central() {
    let mut g = grid();
    simplify(&mut g).unwrap();
    let mut bc = betweenness(&g.out_csr(|e| e.length));
    normalize_betweenness(&mut bc);

    let center = g.index_of(11).unwrap();
    let side = g.index_of(1).unwrap();
    assert_eq!(bc[side], 0.0);
    assert!(bc[center] > 0.0);
    assert!(bc.iter().all(|&x| x <= bc[center]));
    assert!(bc.iter().all(|&x| (0.0..=1.0).contains(&x)));

    let pr = pagerank(&SimpleDigraph::from_graph(&g), 0.85, 100, 1e-6).unwrap();
    assert!((pr.iter().sum::<f64>() - 1.0).abs() < 1e-6);
}

#[test]
fn grid_has_no_triangles() {
    let mut g = grid();
    simplify(&mut g).unwrap();
    let d = SimpleDigraph::from_graph(&g);
    assert_eq!(average_directed(&d, false), 0.0);
    assert_eq!(average_undirected(&SimpleGraph::from_digraph(&d), true), 0.0);
}

#[test]
fn truncation_keeps_streets_leaving_the_boundary() {
    let mut g = grid();
    // bottom row only; the vertical streets leave through the top edge
    let boundary = MultiPolygon::new(vec![polygon![
        (x: -0.0001, y: -0.0001), (x: 0.0021, y: -0.0001), (x: 0.0021, y: 0.0004), (x: -0.0001, y: 0.0004),
    ]]);
    truncate_by_polygon(&mut g, &boundary, true).unwrap();
    simplify(&mut g).unwrap();
    add_street_counts(&mut g);

    assert_eq!(g.node_count(), 4);
    assert_eq!(g.node(1).unwrap().street_count, Some(3));
    let dead_ends = g.nodes().iter().filter(|n| n.street_count == Some(1)).count();
    assert_eq!(dead_ends, 3);
}

#[test]
fn consolidation_tolerance() {
    let mut g = grid();
    add_street_counts(&mut g);

    // midpoints sit ~56 m from corners
    assert_eq!(merge_nearby(&g, 10.0).len(), 21);

    let merged = merge_nearby(&g, 30.0);
    assert_eq!(merged.len(), 1);
    assert_eq!(split_disconnected(&merged, &UndirectedMultigraph::from_graph(&g)).len(), 1);
}
