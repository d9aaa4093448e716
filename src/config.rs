use std::{collections::BTreeMap, fs::File, io::BufReader, path::{Path, PathBuf}};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

/// Shared filesystem layout and worker settings for every pipeline stage.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Worker count for I/O-bound stages, 0 means all logical CPUs.
    #[serde(default)]
    pub cpus: usize,
    /// Worker count for the memory-hungry indicator stages, 0 means all logical CPUs.
    #[serde(default)]
    pub cpus_stats: usize,

    // urban centers
    pub uc_input_path: PathBuf,
    pub iso_codes_path: PathBuf,
    pub uc_dataset_path: PathBuf,

    // graph acquisition
    #[serde(default = "default_overpass_url")]
    pub overpass_url: String,
    #[serde(default = "default_overpass_timeout")]
    pub overpass_timeout_secs: u64,
    pub http_cache_path: PathBuf,

    // models
    pub models_graphml_path: PathBuf,
    pub models_geojson_path: PathBuf,
    pub models_nelist_path: PathBuf,
    pub models_metadata_nodes_path: PathBuf,
    pub models_metadata_edges_path: PathBuf,

    // elevation
    pub elevation_nodeclusters_path: PathBuf,
    pub elevation_google_urls_path: PathBuf,
    pub elevation_google_elevations_path: PathBuf,
    pub elevation_final_path: PathBuf,
    pub gdem_aster_path: PathBuf,
    pub gdem_aster_urls_path: PathBuf,
    pub gdem_srtm_path: PathBuf,
    pub gdem_srtm_urls_path: PathBuf,

    // indicators
    pub node_bc_path: PathBuf,
    pub indicators_street_path: PathBuf,
    pub indicators_path: PathBuf,
    pub indicators_all_path: PathBuf,
    pub indicators_metadata_path: PathBuf,
    pub indicators_all_metadata_path: PathBuf,

    // staging
    pub staging_graphml_path: PathBuf,
    pub staging_geojson_path: PathBuf,
    pub staging_nelist_path: PathBuf,
}

fn default_overpass_url() -> String { "https://overpass-api.de/api/interpreter".into() }

fn default_overpass_timeout() -> u64 { 180 }

impl Config {
    /// Load the pipeline configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("[config] Failed to open config file: {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("[config] Failed to parse config file: {}", path.display()))
    }

    /// Worker count for general stages.
    #[inline] pub fn workers(&self) -> usize { resolve_cpus(self.cpus) }

    /// Worker count for indicator stages.
    #[inline] pub fn stats_workers(&self) -> usize { resolve_cpus(self.cpus_stats) }
}

/// Resolve a configured CPU count, treating 0 as every logical CPU.
pub fn resolve_cpus(cpus: usize) -> usize {
    if cpus > 0 { return cpus }
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Credentials for external services, kept apart from the shareable config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Keys {
    /// Google Elevation API keys, used in order.
    #[serde(default)]
    pub google_api_keys: Vec<String>,
    #[serde(default)]
    pub earthdata_username: String,
    #[serde(default)]
    pub earthdata_password: String,
    #[serde(default)]
    pub dataverse: Option<DataverseKeys>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataverseKeys {
    pub host: String,
    pub api_key: String,
    /// Dataset DOI per staged format, e.g. `"graphml" -> "doi:10.7910/DVN/..."`.
    pub dois: BTreeMap<String, String>,
}

impl Keys {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("[config] Failed to open keys file: {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("[config] Failed to parse keys file: {}", path.display()))
    }

    /// Earthdata basic-auth credentials, required for raster downloads.
    pub fn earthdata(&self) -> Result<(&str, &str)> {
        ensure!(!self.earthdata_username.is_empty(), "[config] Missing earthdata_username in keys file");
        Ok((&self.earthdata_username, &self.earthdata_password))
    }
}

#[cfg(test)]
const SAMPLE: &str = r#"{
    "cpus": 2,
    "uc_input_path": "ROOT/input/ucdb.geojson",
    "iso_codes_path": "ROOT/input/iso.csv",
    "uc_dataset_path": "ROOT/ucs/ucs.geojson",
    "http_cache_path": "ROOT/cache",
    "models_graphml_path": "ROOT/models/graphml",
    "models_geojson_path": "ROOT/models/geojson",
    "models_nelist_path": "ROOT/models/nelist",
    "models_metadata_nodes_path": "ROOT/models/metadata/nodes.csv",
    "models_metadata_edges_path": "ROOT/models/metadata/edges.csv",
    "elevation_nodeclusters_path": "ROOT/elevation/clusters",
    "elevation_google_urls_path": "ROOT/elevation/google_urls.csv",
    "elevation_google_elevations_path": "ROOT/elevation/google.csv",
    "elevation_final_path": "ROOT/elevation/final.csv",
    "gdem_aster_path": "ROOT/gdem/aster",
    "gdem_aster_urls_path": "ROOT/gdem/aster_urls.txt",
    "gdem_srtm_path": "ROOT/gdem/srtm",
    "gdem_srtm_urls_path": "ROOT/gdem/srtm_urls.txt",
    "node_bc_path": "ROOT/indicators/bc",
    "indicators_street_path": "ROOT/indicators/street.csv",
    "indicators_path": "ROOT/indicators/indicators.csv",
    "indicators_all_path": "ROOT/indicators/indicators_all.csv",
    "indicators_metadata_path": "ROOT/indicators/metadata.csv",
    "indicators_all_metadata_path": "ROOT/indicators/metadata_all.csv",
    "staging_graphml_path": "ROOT/staging/graphml",
    "staging_geojson_path": "ROOT/staging/geojson",
    "staging_nelist_path": "ROOT/staging/nelist"
}"#;

#[cfg(test)]
impl Config {
    /// A complete configuration with every path under `root`.
    pub(crate) fn under(root: &Path) -> Self {
        let json = SAMPLE.replace("ROOT", &root.display().to_string());
        serde_json::from_str(&json).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_config_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.replace("ROOT", "data").as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.workers(), 2);
        assert!(config.stats_workers() >= 1);
        assert_eq!(config.overpass_timeout_secs, 180);
        assert_eq!(config.models_graphml_path, PathBuf::from("data/models/graphml"));
    }

    #[test]
    fn missing_path_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"cpus": 1}"#).unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn keys_require_earthdata_user() {
        let keys: Keys = serde_json::from_str(r#"{"google_api_keys": ["a", "b"]}"#).unwrap();
        assert_eq!(keys.google_api_keys.len(), 2);
        assert!(keys.earthdata().is_err());
        assert!(keys.dataverse.is_none());
    }
}
