//! Overpass API queries for drivable street networks, with an on-disk
//! response cache.

use std::{collections::BTreeMap, fs, path::{Path, PathBuf}, thread, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use geo::{Area, BooleanOps, BoundingRect, Coord, MultiPolygon, Polygon, Rect};
use log::{debug, info, warn};
use reqwest::{StatusCode, blocking::Client};
use serde::Deserialize;

use crate::common::{ensure_dir_exists, http_client, sha256_hex, write_atomic};
use netgraph::geodesy::project_local;

/// Largest polygon area sent in one query, in m² (50 km × 50 km).
pub const MAX_QUERY_AREA_M2: f64 = 50_000.0 * 50_000.0;

const MAX_ATTEMPTS: usize = 3;
const RETRY_PAUSE: Duration = Duration::from_secs(10);

/// Way filter for the drivable public street network.
pub const DRIVE_FILTER: &str = concat!(
    r#"["highway"]["area"!~"yes"]["access"!~"private"]"#,
    r#"["highway"!~"abandoned|bridleway|bus_guideway|construction|corridor|cycleway|elevator|"#,
    r#"escalator|footway|no|path|pedestrian|planned|platform|proposed|raceway|razed|service|"#,
    r#"steps|track"]"#,
    r#"["motor_vehicle"!~"no"]["motorcar"!~"no"]"#,
    r#"["service"!~"alley|driveway|emergency_access|parking|parking_aisle|private"]"#,
);

const EXCLUDED_HIGHWAYS: [&str; 20] = [
    "abandoned", "bridleway", "bus_guideway", "construction", "corridor", "cycleway", "elevator",
    "escalator", "footway", "no", "path", "pedestrian", "planned", "platform", "proposed", "raceway",
    "razed", "service", "steps", "track",
];
const EXCLUDED_SERVICES: [&str; 6] = ["alley", "driveway", "emergency_access", "parking", "parking_aisle", "private"];

/// Whether a way's tags pass [`DRIVE_FILTER`]. Like Overpass `!~`, patterns
/// match anywhere in the value.
pub fn passes_drive_filter(tags: &BTreeMap<String, String>) -> bool {
    fn matches(value: Option<&str>, patterns: &[&str]) -> bool {
        value.is_some_and(|v| patterns.iter().any(|p| v.contains(p)))
    }
    let tag = |k: &str| tags.get(k).map(String::as_str);
    tag("highway").is_some()
        && !matches(tag("highway"), &EXCLUDED_HIGHWAYS)
        && !matches(tag("area"), &["yes"])
        && !matches(tag("access"), &["private"])
        && !matches(tag("motor_vehicle"), &["no"])
        && !matches(tag("motorcar"), &["no"])
        && !matches(tag("service"), &EXCLUDED_SERVICES)
}

// ---------------------------------------------------------------------------
// Query building
// ---------------------------------------------------------------------------

/// Split a boundary into pieces no larger than [`MAX_QUERY_AREA_M2`] by
/// intersecting it with a square grid in local meters.
pub fn subdivide(boundary: &MultiPolygon<f64>, max_area: f64) -> Vec<Polygon<f64>> {
    let Some(bbox) = boundary.bounding_rect() else { return Vec::new() };
    let ref_lat = bbox.center().y;
    let [w0, s0] = project_local(bbox.min().x, bbox.min().y, ref_lat);
    let [e0, n0] = project_local(bbox.max().x, bbox.max().y, ref_lat);
    let projected_area = boundary.unsigned_area() * ((e0 - w0) * (n0 - s0)) / (bbox.width() * bbox.height()).max(f64::MIN_POSITIVE);
    if projected_area <= max_area {
        return boundary.0.clone();
    }

    let side = max_area.sqrt();
    let cols = ((e0 - w0) / side).ceil().max(1.0) as usize;
    let rows = ((n0 - s0) / side).ceil().max(1.0) as usize;
    let (dx, dy) = (bbox.width() / cols as f64, bbox.height() / rows as f64);

    let mut pieces = Vec::new();
    for r in 0..rows {
        for c in 0..cols {
            let min = Coord { x: bbox.min().x + c as f64 * dx, y: bbox.min().y + r as f64 * dy };
            let cell = Rect::new(min, Coord { x: min.x + dx, y: min.y + dy }).to_polygon();
            let part = boundary.intersection(&MultiPolygon::new(vec![cell]));
            pieces.extend(part.0.into_iter().filter(|p| p.unsigned_area() > 0.0));
        }
    }
    pieces
}

/// Overpass `poly:` coordinate string of a polygon's exterior ring.
pub fn poly_coord_str(polygon: &Polygon<f64>) -> String {
    polygon.exterior().coords()
        .map(|c| format!("{:.6} {:.6}", c.y, c.x))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Full Overpass QL query for the drivable ways inside a polygon and their nodes.
pub fn build_query(polygon: &Polygon<f64>, timeout_secs: u64) -> String {
    format!(
        "[out:json][timeout:{timeout_secs}];(way{DRIVE_FILTER}(poly:\"{}\");>;);out;",
        poly_coord_str(polygon),
    )
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Element {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: i64,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub nodes: Vec<i64>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub remark: Option<String>,
}

impl OverpassResponse {
    pub fn parse(text: &str) -> Result<Self> {
        let response: Self = serde_json::from_str(text).context("[overpass] Invalid response JSON")?;
        if let Some(remark) = &response.remark {
            if remark.contains("runtime error") { bail!("[overpass] Server error: {remark}") }
            warn!("[overpass] Server remark: {remark}");
        }
        Ok(response)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Overpass client that answers repeated queries from a response cache.
pub struct Overpass {
    url: String,
    timeout_secs: u64,
    cache_dir: PathBuf,
    client: Client,
}

impl Overpass {
    pub fn new(url: &str, timeout_secs: u64, cache_dir: &Path) -> Result<Self> {
        ensure_dir_exists(cache_dir)?;
        let client = http_client(Duration::from_secs(timeout_secs + 60))?;
        Ok(Self { url: url.to_string(), timeout_secs, cache_dir: cache_dir.to_path_buf(), client })
    }

    #[inline] pub fn timeout_secs(&self) -> u64 { self.timeout_secs }

    /// Cache file for a query against this endpoint.
    pub fn cache_path(&self, query: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", sha256_hex(format!("{}?data={query}", self.url).as_bytes())))
    }

    /// Fetch the elements for every query, from cache where possible.
    pub fn fetch_all(&self, queries: &[String]) -> Result<Vec<OverpassResponse>> {
        queries.iter().map(|q| self.fetch(q)).collect()
    }

    /// Fetch one query, from cache where possible; successful responses are cached.
    pub fn fetch(&self, query: &str) -> Result<OverpassResponse> {
        let cache_path = self.cache_path(query);
        if let Ok(text) = fs::read_to_string(&cache_path) {
            debug!("[overpass] Got response from cache {}", cache_path.display());
            return OverpassResponse::parse(&text);
        }

        let text = self.request(query)?;
        let response = OverpassResponse::parse(&text)?;
        write_atomic(&cache_path, text.as_bytes())
            .with_context(|| format!("[overpass] Failed to write cache file {}", cache_path.display()))?;
        Ok(response)
    }

    fn request(&self, query: &str) -> Result<String> {
        let mut last_error = anyhow!("[overpass] No attempts made");
        for attempt in 1..=MAX_ATTEMPTS {
            info!("[overpass] Requesting {} bytes of query from {}", query.len(), self.url);
            match self.client.post(&self.url).form(&[("data", query)]).send() {
                Ok(resp) if resp.status().is_success() => {
                    return resp.text().context("[overpass] Failed to read response body");
                }
                Ok(resp) => {
                    let status = resp.status();
                    last_error = anyhow!("[overpass] Server responded {status}");
                    if !retryable(status) { break }
                }
                Err(e) => last_error = anyhow!(e).context("[overpass] Request failed"),
            }
            if attempt < MAX_ATTEMPTS {
                warn!("[overpass] {last_error:#}, retrying (attempt {} of {MAX_ATTEMPTS})", attempt + 1);
                thread::sleep(RETRY_PAUSE);
            }
        }
        Err(last_error)
    }
}

fn retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}
