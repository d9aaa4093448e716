//! GraphML serialization compatible with graphs saved by OSMnx: every
//! attribute is stored as a string, lists as `[a, b]`, booleans as
//! `True`/`False` and edge geometry as WKT.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use geo::{Coord, LineString};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tempfile::NamedTempFile;

use crate::graph::{Edge, GraphError, Node, StreetGraph};

const NODE_FIELDS: [&str; 7] = ["y", "x", "street_count", "elevation", "elevation_aster", "elevation_srtm", "bc"];
const EDGE_FIELDS: [&str; 7] = ["osmid", "oneway", "reversed", "length", "grade", "grade_abs", "geometry"];

// ---------------------------------------------------------------------------
// Value formats
// ---------------------------------------------------------------------------

/// Format edge way ids: a bare id when there is one, otherwise `[a, b]`.
pub fn format_osmid(ids: &[i64]) -> String {
    match ids {
        [single] => single.to_string(),
        _ => format!("[{}]", ids.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")),
    }
}

/// Parse edge way ids written either as a bare id or a bracketed list.
pub fn parse_osmid(value: &str) -> Result<Vec<i64>, GraphError> {
    let inner = value.trim().trim_start_matches('[').trim_end_matches(']');
    inner.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().map_err(|_| GraphError::Format(format!("bad osmid {value:?}"))))
        .collect()
}

fn format_bool(value: bool) -> &'static str { if value { "True" } else { "False" } }

fn parse_bool(value: &str) -> bool {
    let v = value.trim().trim_start_matches('[');
    v.starts_with("True") || v.starts_with("true") || v == "1"
}

fn parse_f64(name: &str, value: &str) -> Result<f64, GraphError> {
    value.trim().parse::<f64>().map_err(|_| GraphError::Format(format!("bad {name} value {value:?}")))
}

/// Parse an optional numeric attribute; empty and `nan` read as missing.
fn parse_opt_f64(name: &str, value: &str) -> Result<Option<f64>, GraphError> {
    let v = value.trim();
    if v.is_empty() || v.eq_ignore_ascii_case("nan") || v == "None" { return Ok(None) }
    parse_f64(name, v).map(Some)
}

/// Format a linestring as WKT.
pub fn linestring_to_wkt(line: &LineString<f64>) -> String {
    let coords: Vec<String> = line.coords().map(|c| format!("{} {}", c.x, c.y)).collect();
    format!("LINESTRING ({})", coords.join(", "))
}

/// Parse a WKT `LINESTRING (x y, ...)`.
pub fn parse_wkt_linestring(wkt: &str) -> Result<LineString<f64>, GraphError> {
    let bad = || GraphError::Format(format!("bad linestring {wkt:?}"));
    let body = wkt.trim()
        .strip_prefix("LINESTRING")
        .map(str::trim)
        .and_then(|s| s.strip_prefix('('))
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(bad)?;

    let coords = body.split(',')
        .map(|pair| {
            let mut it = pair.split_whitespace().map(str::parse::<f64>);
            match (it.next(), it.next()) {
                (Some(Ok(x)), Some(Ok(y))) => Ok(Coord { x, y }),
                _ => Err(bad()),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LineString::new(coords))
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

fn get_attr_value(event: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, GraphError> {
    for attr in event.attributes().with_checks(false) {
        let attr = attr.map_err(|e| GraphError::Format(e.to_string()))?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.to_string()));
        }
    }
    Ok(None)
}

fn require_attr(event: &BytesStart<'_>, key: &[u8]) -> Result<String, GraphError> {
    get_attr_value(event, key)?.ok_or_else(|| {
        let element = String::from_utf8_lossy(event.name().as_ref()).to_string();
        GraphError::Format(format!("<{element}> lacks {:?}", String::from_utf8_lossy(key)))
    })
}

fn parse_id(value: &str) -> Result<i64, GraphError> {
    value.trim().parse::<i64>().map_err(|_| GraphError::Format(format!("bad node id {value:?}")))
}

enum Element {
    Graph,
    Node(Node),
    Edge(Edge, Option<u32>),
}

fn set_node_attr(node: &mut Node, name: &str, value: &str) -> Result<(), GraphError> {
    match name {
        "x" => node.x = parse_f64(name, value)?,
        "y" => node.y = parse_f64(name, value)?,
        "street_count" => node.street_count = value.trim().parse::<u32>().ok(),
        "elevation" => node.elevation = parse_opt_f64(name, value)?,
        "elevation_aster" => node.elevation_aster = parse_opt_f64(name, value)?,
        "elevation_srtm" => node.elevation_srtm = parse_opt_f64(name, value)?,
        "bc" => node.bc = parse_opt_f64(name, value)?,
        "osmid" => {}
        _ => { node.tags.insert(name.to_string(), value.to_string()); }
    }
    Ok(())
}

fn set_edge_attr(edge: &mut Edge, name: &str, value: &str) -> Result<(), GraphError> {
    match name {
        "osmid" => edge.osmid = parse_osmid(value)?,
        "length" => edge.length = parse_f64(name, value)?,
        "oneway" => edge.oneway = parse_bool(value),
        "reversed" => edge.reversed = parse_bool(value),
        "grade" => edge.grade = parse_opt_f64(name, value)?,
        "grade_abs" => edge.grade_abs = parse_opt_f64(name, value)?,
        "geometry" => edge.geometry = Some(parse_wkt_linestring(value)?),
        "key" => {}
        _ => { edge.tags.insert(name.to_string(), value.to_string()); }
    }
    Ok(())
}

/// Incremental state while walking the document.
struct Parser {
    graph: StreetGraph,
    keys: BTreeMap<String, String>,
    element: Option<Element>,
    data_key: Option<String>,
    text: String,
}

impl Parser {
    fn start(&mut self, e: &BytesStart<'_>) -> Result<(), GraphError> {
        match e.name().as_ref() {
            b"key" => {
                let id = require_attr(e, b"id")?;
                let name = require_attr(e, b"attr.name")?;
                self.keys.insert(id, name);
            }
            b"graph" => self.element = Some(Element::Graph),
            b"node" => {
                let id = parse_id(&require_attr(e, b"id")?)?;
                self.element = Some(Element::Node(Node::new(id, f64::NAN, f64::NAN)));
            }
            b"edge" => {
                let u = parse_id(&require_attr(e, b"source")?)?;
                let v = parse_id(&require_attr(e, b"target")?)?;
                let key = get_attr_value(e, b"id")?.and_then(|k| k.trim().parse::<u32>().ok());
                self.element = Some(Element::Edge(Edge::new(u, v, 0.0), key));
            }
            b"data" => {
                self.data_key = Some(require_attr(e, b"key")?);
                self.text.clear();
            }
            _ => {}
        }
        Ok(())
    }

    fn end(&mut self, name: &[u8]) -> Result<(), GraphError> {
        match name {
            b"data" => {
                let id = self.data_key.take().ok_or_else(|| GraphError::Format("unbalanced <data>".into()))?;
                let attr = self.keys.get(&id).cloned().unwrap_or(id);
                let value = std::mem::take(&mut self.text);
                match self.element.as_mut() {
                    Some(Element::Graph) => { self.graph.attrs.insert(attr, value); }
                    Some(Element::Node(node)) => set_node_attr(node, &attr, &value)?,
                    Some(Element::Edge(edge, _)) => set_edge_attr(edge, &attr, &value)?,
                    None => {}
                }
            }
            b"node" => {
                if let Some(Element::Node(node)) = self.element.take() {
                    if node.x.is_nan() || node.y.is_nan() {
                        return Err(GraphError::MissingAttribute { osmid: node.osmid, attr: "x/y" });
                    }
                    self.graph.add_node(node);
                }
                self.element = Some(Element::Graph);
            }
            b"edge" => {
                if let Some(Element::Edge(mut edge, key)) = self.element.take() {
                    match key {
                        Some(k) => {
                            edge.key = k;
                            self.graph.add_edge_with_key(edge)?;
                        }
                        None => { self.graph.add_edge(edge)?; }
                    }
                }
                self.element = Some(Element::Graph);
            }
            b"graph" => self.element = None,
            _ => {}
        }
        Ok(())
    }
}

/// Parse a GraphML document.
pub fn parse_graphml<R: BufRead>(input: R) -> Result<StreetGraph, GraphError> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);

    let mut parser = Parser {
        graph: StreetGraph::default(),
        keys: BTreeMap::new(),
        element: None,
        data_key: None,
        text: String::new(),
    };
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => parser.start(&e)?,
            Event::Empty(e) => {
                parser.start(&e)?;
                parser.end(e.name().as_ref())?;
            }
            Event::End(e) => parser.end(e.name().as_ref())?,
            Event::Text(t) => parser.text.push_str(&t.unescape()?),
            Event::CData(t) => parser.text.push_str(&String::from_utf8_lossy(&t.into_inner())),
            _ => {}
        }
        buf.clear();
    }

    let mut graph = parser.graph;
    graph.attrs.entry("crs".into()).or_insert_with(|| "epsg:4326".into());
    Ok(graph)
}

/// Load a GraphML file from disk.
pub fn load_graphml(path: &Path) -> Result<StreetGraph, GraphError> {
    parse_graphml(BufReader::new(File::open(path)?))
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn node_values(node: &Node) -> Vec<(&str, String)> {
    let mut values: Vec<(&str, String)> = vec![("y", node.y.to_string()), ("x", node.x.to_string())];
    if let Some(c) = node.street_count { values.push(("street_count", c.to_string())); }
    for (name, value) in [
        ("elevation", node.elevation),
        ("elevation_aster", node.elevation_aster),
        ("elevation_srtm", node.elevation_srtm),
        ("bc", node.bc),
    ] {
        if let Some(v) = value { values.push((name, v.to_string())); }
    }
    values.extend(node.tags.iter().map(|(k, v)| (k.as_str(), v.clone())));
    values
}

fn edge_values(edge: &Edge) -> Vec<(&str, String)> {
    let mut values: Vec<(&str, String)> = Vec::new();
    if !edge.osmid.is_empty() { values.push(("osmid", format_osmid(&edge.osmid))); }
    values.push(("oneway", format_bool(edge.oneway).to_string()));
    values.push(("reversed", format_bool(edge.reversed).to_string()));
    values.push(("length", edge.length.to_string()));
    if let Some(g) = edge.grade { values.push(("grade", g.to_string())); }
    if let Some(g) = edge.grade_abs { values.push(("grade_abs", g.to_string())); }
    if let Some(line) = &edge.geometry { values.push(("geometry", linestring_to_wkt(line))); }
    values.extend(edge.tags.iter().map(|(k, v)| (k.as_str(), v.clone())));
    values
}

/// Serialize a graph as GraphML.
pub fn write_graphml<W: Write>(graph: &StreetGraph, mut out: W) -> Result<(), GraphError> {
    // Declare keys: fixed fields first, then tags in sorted order.
    let node_tags: BTreeSet<&str> = graph.nodes().iter().flat_map(|n| n.tags.keys().map(String::as_str)).collect();
    let edge_tags: BTreeSet<&str> = graph.edges().iter().flat_map(|e| e.tags.keys().map(String::as_str)).collect();

    let mut declared: Vec<(&str, &str)> = graph.attrs.keys().map(|k| ("graph", k.as_str())).collect();
    declared.extend(NODE_FIELDS.iter().map(|&k| ("node", k)));
    declared.extend(node_tags.iter().filter(|t| !NODE_FIELDS.contains(t)).map(|&k| ("node", k)));
    declared.extend(EDGE_FIELDS.iter().map(|&k| ("edge", k)));
    declared.extend(edge_tags.iter().filter(|t| !EDGE_FIELDS.contains(t)).map(|&k| ("edge", k)));

    let mut key_ids: BTreeMap<(&str, &str), String> = BTreeMap::new();
    writeln!(out, "<?xml version='1.0' encoding='utf-8'?>")?;
    writeln!(out, "<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\" xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xsi:schemaLocation=\"http://graphml.graphdrawing.org/xmlns http://graphml.graphdrawing.org/xmlns/1.0/graphml.xsd\">")?;
    for (i, (domain, name)) in declared.into_iter().enumerate() {
        let id = format!("d{i}");
        writeln!(out, "  <key id=\"{id}\" for=\"{domain}\" attr.name=\"{}\" attr.type=\"string\" />", escape(name))?;
        key_ids.insert((domain, name), id);
    }

    let data = |out: &mut W, indent: &str, domain: &str, name: &str, value: &str| -> Result<(), GraphError> {
        let id = key_ids.get(&(domain, name)).ok_or_else(|| GraphError::Format(format!("undeclared key {name}")))?;
        writeln!(out, "{indent}<data key=\"{id}\">{}</data>", escape(value))?;
        Ok(())
    };

    writeln!(out, "  <graph edgedefault=\"directed\">")?;
    for (name, value) in &graph.attrs {
        data(&mut out, "    ", "graph", name, value)?;
    }
    for node in graph.nodes() {
        writeln!(out, "    <node id=\"{}\">", node.osmid)?;
        for (name, value) in node_values(node) { data(&mut out, "      ", "node", name, &value)?; }
        writeln!(out, "    </node>")?;
    }
    for edge in graph.edges() {
        writeln!(out, "    <edge source=\"{}\" target=\"{}\" id=\"{}\">", edge.u, edge.v, edge.key)?;
        for (name, value) in edge_values(edge) { data(&mut out, "      ", "edge", name, &value)?; }
        writeln!(out, "    </edge>")?;
    }
    writeln!(out, "  </graph>")?;
    writeln!(out, "</graphml>")?;
    out.flush()?;
    Ok(())
}

/// Write a GraphML file to disk. The document goes to a temporary file in
/// the same directory, renamed over `path` once complete.
pub fn save_graphml(graph: &StreetGraph, path: &Path) -> Result<(), GraphError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    write_graphml(graph, BufWriter::new(tmp.as_file_mut()))?;
    tmp.persist(path).map_err(|e| GraphError::Io(e.error))?;
    Ok(())
}
