use std::{collections::BTreeMap, fmt, path::{Path, PathBuf}, time::Duration};

use ahash::AHashMap;
use anyhow::{Context, Result, bail, ensure};
use log::{info, warn};
use polars::prelude::*;
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::common::{ensure_dir_exists, files_at_depth, http_client, round_to, sha256_hex, write_atomic};
use crate::config::{Config, Keys};
use crate::io::{f64_values, i64_values, read_csv, read_csv_strings, str_values, write_csv};
use crate::pool::run_tasks;

use super::cluster::MAX_CLUSTER_SIZE;

pub const GOOGLE_ELEVATION_URL: &str = "https://maps.googleapis.com/maps/api/elevation/json";
/// Requests allowed per API key.
pub const REQUESTS_PER_KEY: usize = 39_000;
/// Longest URL the API accepts.
pub const MAX_URL_CHARS: usize = 16_384;
const COORD_PRECISION: usize = 5;

/// One Elevation API request: the nodes it covers, in location order.
#[derive(Clone, PartialEq)]
pub struct GoogleRequest {
    pub nodes: Vec<i64>,
    pub url: String,
}

// URLs carry the API key, keep them out of logs
impl fmt::Debug for GoogleRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleRequest")
            .field("first_node", &self.nodes.first())
            .field("nodes", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

/// One clustered node as read from a clusters CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteredNode {
    pub osmid: i64,
    pub x: f64,
    pub y: f64,
    pub cluster: String,
}

/// A node elevation returned by the API, rounded to centimeters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoogleElevation {
    pub osmid: i64,
    pub elevation: f64,
    pub resolution: Option<f64>,
}

// ---------------------------------------------------------------------------
// URLs
// ---------------------------------------------------------------------------

/// Build one keyed request per cluster.
///
/// Nodes shared by several graphs are requested once, in the first cluster
/// listing them. Clusters are ordered by label and their nodes by osmid.
/// Keys are used `REQUESTS_PER_KEY` requests at a time, in order.
pub fn google_requests(mut nodes: Vec<ClusteredNode>, keys: &[String]) -> Result<Vec<GoogleRequest>> {
    nodes.sort_by_key(|n| n.osmid);
    nodes.dedup_by_key(|n| n.osmid);

    let mut clusters: BTreeMap<String, Vec<ClusteredNode>> = BTreeMap::new();
    for node in nodes { clusters.entry(node.cluster.clone()).or_default().push(node) }

    let batches = clusters.len().div_ceil(REQUESTS_PER_KEY);
    ensure!(
        batches <= keys.len(),
        "[google] {} requests need {batches} API keys but only {} were given", clusters.len(), keys.len()
    );

    let mut requests = Vec::with_capacity(clusters.len());
    for (i, (label, members)) in clusters.into_iter().enumerate() {
        ensure!(members.len() <= MAX_CLUSTER_SIZE, "[google] Cluster {label} has {} nodes", members.len());
        let locations = members.iter()
            .map(|n| format!("{:.p$},{:.p$}", n.y, n.x, p = COORD_PRECISION))
            .collect::<Vec<_>>()
            .join("|");
        let url = format!("{GOOGLE_ELEVATION_URL}?locations={locations}&key={}", keys[i / REQUESTS_PER_KEY]);
        ensure!(url.len() <= MAX_URL_CHARS, "[google] URL for cluster {label} has {} characters", url.len());
        requests.push(GoogleRequest { nodes: members.iter().map(|n| n.osmid).collect(), url });
    }
    Ok(requests)
}

fn read_clusters(path: &Path) -> Result<Vec<ClusteredNode>> {
    let df = read_csv(path)?;
    let osmids = i64_values(&df, "osmid")?;
    let xs = f64_values(&df, "x")?;
    let ys = f64_values(&df, "y")?;
    let labels = str_values(&df, "cluster")?;
    ensure!(osmids.len() == labels.len(), "[google] Null osmids in {}", path.display());
    Ok(osmids.into_iter().zip(xs).zip(ys).zip(labels)
        .map(|(((osmid, x), y), cluster)| ClusteredNode { osmid, x: x.unwrap_or(f64::NAN), y: y.unwrap_or(f64::NAN), cluster })
        .collect())
}

/// Turn every node clusters CSV into keyed API URLs and save them.
/// Returns the number of URLs.
pub fn make_google_urls(config: &Config, keys: &Keys) -> Result<usize> {
    let files = files_at_depth(&config.elevation_nodeclusters_path, 1, "csv")?;
    info!("[google] Loading node clusters from {} files", files.len());
    let mut nodes = Vec::new();
    for file in &files { nodes.extend(read_clusters(file)?) }

    let requests = google_requests(nodes, &keys.google_api_keys)?;
    let mut df = DataFrame::new(vec![
        Column::new("nodes".into(), requests.iter().map(|r| join_ids(&r.nodes)).collect::<Vec<_>>()),
        Column::new("url".into(), requests.iter().map(|r| r.url.clone()).collect::<Vec<_>>()),
    ])?;
    write_csv(&mut df, &config.elevation_google_urls_path)?;
    for (i, key) in keys.google_api_keys.iter().enumerate() {
        let used = requests.len().saturating_sub(i * REQUESTS_PER_KEY).min(REQUESTS_PER_KEY);
        info!("[google] Created {used} URLs using key ...{}", key_suffix(key));
    }
    info!("[google] Saved {} URLs to {}", requests.len(), config.elevation_google_urls_path.display());
    Ok(requests.len())
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter().map(i64::to_string).collect::<Vec<_>>().join(" ")
}

fn parse_ids(text: &str) -> Result<Vec<i64>> {
    text.split_whitespace()
        .map(|id| id.parse().with_context(|| format!("[google] Invalid node id {id:?}")))
        .collect()
}

fn key_suffix(key: &str) -> String {
    let tail: Vec<char> = key.chars().rev().take(6).collect();
    tail.into_iter().rev().collect()
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ElevationResponse {
    status: String,
    #[serde(default)]
    results: Option<Vec<ElevationResult>>,
}

#[derive(Debug, Deserialize)]
struct ElevationResult {
    elevation: Option<f64>,
    resolution: Option<f64>,
}

/// Pair an API response's results with the nodes of its request.
///
/// Responses without results, or with results lacking an elevation, yield
/// nothing. A result count differing from the node count is an error.
pub fn parse_elevations(body: &str, nodes: &[i64]) -> Result<Vec<GoogleElevation>> {
    let response: ElevationResponse = serde_json::from_str(body).context("[google] Invalid elevation response")?;
    let Some(results) = response.results else {
        warn!("[google] Response with status {} has no results", response.status);
        return Ok(Vec::new());
    };
    if results.iter().any(|r| r.elevation.is_none()) {
        warn!("[google] Response with status {} has no elevation results", response.status);
        return Ok(Vec::new());
    }
    ensure!(results.len() == nodes.len(), "[google] Got {} results for {} nodes", results.len(), nodes.len());

    Ok(nodes.iter().zip(results)
        .filter_map(|(&osmid, r)| Some(GoogleElevation {
            osmid,
            elevation: round_to(r.elevation?, 2),
            resolution: r.resolution.map(|v| round_to(v, 2)),
        }))
        .collect())
}

/// On-disk cache of Elevation API responses, keyed by URL.
struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    fn new(dir: PathBuf) -> Self { Self { dir } }

    fn path(&self, url: &str) -> PathBuf { self.dir.join(format!("{}.json", sha256_hex(url.as_bytes()))) }

    #[inline] fn contains(&self, url: &str) -> bool { self.path(url).is_file() }

    fn get(&self, url: &str) -> Result<Option<String>> {
        let path = self.path(url);
        if !path.is_file() { return Ok(None) }
        let body = std::fs::read_to_string(&path)
            .with_context(|| format!("[google] Failed to read cached response {}", path.display()))?;
        Ok(Some(body))
    }

    fn put(&self, url: &str, body: &str) -> Result<()> {
        ensure_dir_exists(&self.dir)?;
        let path = self.path(url);
        write_atomic(&path, body.as_bytes()).with_context(|| format!("[google] Failed to cache response {}", path.display()))
    }
}

fn request_elevations(client: &Client, cache: &ResponseCache, url: &str) -> Result<String> {
    if let Some(body) = cache.get(url)? { return Ok(body) }

    let body = client.get(url).send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.text())
        .with_context(|| format!("[google] Request failed for {}", cache.path(url).display()))?;
    let response: ElevationResponse = serde_json::from_str(&body).context("[google] Invalid elevation response")?;
    if response.status != "OK" { bail!("[google] API returned status {}", response.status) }
    cache.put(url, &body)?;
    Ok(body)
}

/// Fetch the elevations of every URL, from the response cache or (with
/// `allow_api`) from the paid API, and save them. Returns the number of
/// node elevations saved.
pub fn download_google_elevations(config: &Config, allow_api: bool) -> Result<usize> {
    let df = read_csv_strings(&config.elevation_google_urls_path)?;
    let requests = str_values(&df, "nodes")?.into_iter().zip(str_values(&df, "url")?)
        .map(|(nodes, url)| Ok(GoogleRequest { nodes: parse_ids(&nodes)?, url }))
        .collect::<Result<Vec<_>>>()?;

    let cache = ResponseCache::new(config.http_cache_path.join("google"));
    let cached = requests.iter().filter(|r| cache.contains(&r.url)).count();
    let uncached = requests.len() - cached;
    info!("[google] Getting {cached} URLs from cache and {uncached} from API");
    ensure!(allow_api || uncached == 0, "[google] {uncached} URLs are not cached; pass --allow-api to request them");

    let client = http_client(Duration::from_secs(60))?;
    let chunks = run_tasks("google", config.workers(), requests, |request| {
        let body = request_elevations(&client, &cache, &request.url)?;
        parse_elevations(&body, &request.nodes)
    })?;

    let mut elevations: Vec<GoogleElevation> = chunks.into_iter().flatten().collect();
    elevations.sort_by_key(|e| e.osmid);
    let mut out = DataFrame::new(vec![
        Column::new("osmid".into(), elevations.iter().map(|e| e.osmid).collect::<Vec<_>>()),
        Column::new("elevation".into(), elevations.iter().map(|e| e.elevation).collect::<Vec<_>>()),
        Column::new("resolution".into(), elevations.iter().map(|e| e.resolution).collect::<Vec<_>>()),
    ])?;
    write_csv(&mut out, &config.elevation_google_elevations_path)?;
    info!("[google] Saved {} node elevations to {}", elevations.len(), config.elevation_google_elevations_path.display());
    Ok(elevations.len())
}

/// Google elevations by node, as saved by [`download_google_elevations`].
pub fn load_google_elevations(path: &Path) -> Result<AHashMap<i64, f64>> {
    let df = read_csv(path)?;
    let osmids = i64_values(&df, "osmid")?;
    let elevations = f64_values(&df, "elevation")?;
    Ok(osmids.into_iter().zip(elevations).filter_map(|(id, e)| Some((id, e?))).collect())
}
