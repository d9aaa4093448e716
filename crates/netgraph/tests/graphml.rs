use geo::LineString;
use netgraph::graphml::{load_graphml, parse_graphml, save_graphml, write_graphml};
use netgraph::{Edge, Node, StreetGraph};

/// Two intersections joined by a two-way street with a bend, plus a one-way
/// spur whose edge carries two merged ways.
fn small_city() -> StreetGraph {
    let mut g = StreetGraph::new();
    g.attrs.insert("simplified".into(), "True".into());

    let mut a = Node::new(101, 8.5, 47.25);
    a.street_count = Some(2);
    a.tags.insert("highway".into(), "traffic_signals".into());
    let mut b = Node::new(102, 8.5005, 47.25);
    b.street_count = Some(1);
    b.elevation = Some(412.0);
    b.elevation_aster = Some(411.0);
    b.elevation_srtm = Some(415.0);
    let mut c = Node::new(103, 8.5, 47.2505);
    c.street_count = Some(1);
    c.bc = Some(0.125);
    for n in [a, b, c] { g.add_node(n); }

    let mut ab = Edge::new(101, 102, 38.25);
    ab.osmid = vec![9001];
    ab.geometry = Some(LineString::from(vec![(8.5, 47.25), (8.50025, 47.25001), (8.5005, 47.25)]));
    ab.tags.insert("name".into(), "Bahnhofstrasse & Co".into());
    let mut ba = ab.clone();
    ba.u = 102;
    ba.v = 101;
    ba.reversed = true;
    ba.geometry = ab.geometry.as_ref().map(|l| LineString::new(l.0.iter().rev().copied().collect()));

    let mut ac = Edge::new(101, 103, 55.5);
    ac.osmid = vec![9002, 9003];
    ac.oneway = true;
    ac.grade = Some(-0.015);
    ac.grade_abs = Some(0.015);
    ac.tags.insert("highway".into(), "['residential', 'tertiary']".into());

    for e in [ab, ba, ac] { g.add_edge(e).unwrap(); }
    g
}

#[test]
fn graph_survives_a_save_and_load() {
    let g = small_city();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("city-1.graphml");
    save_graphml(&g, &path).unwrap();
    let loaded = load_graphml(&path).unwrap();

    assert_eq!(loaded.node_count(), 3);
    assert_eq!(loaded.edge_count(), 3);
    assert_eq!(loaded.nodes(), g.nodes());
    assert_eq!(loaded.edges(), g.edges());
    assert_eq!(loaded.attrs["simplified"], "True");
    assert_eq!(loaded.attrs["crs"], "epsg:4326");
}

#[test]
fn special_characters_are_escaped() {
    let mut buf = Vec::new();
    write_graphml(&small_city(), &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.contains("Bahnhofstrasse &amp; Co"));
    assert!(text.contains("<edge source=\"102\" target=\"101\" id=\"0\">"));
}

#[test]
fn reads_osmnx_style_documents() {
    let doc = r#"<?xml version='1.0' encoding='utf-8'?>
<graphml xmlns="http://graphml.graphdrawing.org/xmlns">
  <key id="d4" for="node" attr.name="y" attr.type="string" />
  <key id="d5" for="node" attr.name="x" attr.type="string" />
  <key id="d6" for="node" attr.name="street_count" attr.type="string" />
  <key id="d9" for="edge" attr.name="osmid" attr.type="string" />
  <key id="d10" for="edge" attr.name="length" attr.type="string" />
  <key id="d11" for="edge" attr.name="oneway" attr.type="string" />
  <key id="d0" for="graph" attr.name="created_with" attr.type="string" />
  <graph edgedefault="directed">
    <data key="d0">OSMnx 2.0.0</data>
    <node id="1"><data key="d4">47.1</data><data key="d5">8.1</data><data key="d6">3</data></node>
    <node id="2"><data key="d4">47.2</data><data key="d5">8.2</data><data key="d6">1</data></node>
    <edge source="1" target="2" id="0">
      <data key="d9">[5, 6]</data>
      <data key="d10">120.5</data>
      <data key="d11">False</data>
    </edge>
    <edge source="1" target="2" id="1">
      <data key="d9">7</data>
      <data key="d10">130.0</data>
      <data key="d11">True</data>
    </edge>
  </graph>
</graphml>"#;

    let g = parse_graphml(doc.as_bytes()).unwrap();
    assert_eq!(g.attrs["created_with"], "OSMnx 2.0.0");
    assert_eq!(g.node(1).unwrap().street_count, Some(3));
    assert_eq!(g.edges()[0].osmid, vec![5, 6]);
    assert_eq!(g.edges()[1].key, 1);
    assert!(g.edges()[1].oneway);
    assert!(g.node(2).unwrap().elevation.is_none());
}

#[test]
fn edges_to_unknown_nodes_are_rejected() {
    let doc = r#"<graphml><graph edgedefault="directed">
        <edge source="1" target="2" id="0"/></graph></graphml>"#;
    assert!(parse_graphml(doc.as_bytes()).is_err());
}

#[test]
fn saving_over_a_graph_leaves_no_partial_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("city-1.graphml");
    std::fs::write(&path, "<graphml>").unwrap();
    save_graphml(&small_city(), &path).unwrap();

    assert_eq!(load_graphml(&path).unwrap().node_count(), 3);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}
