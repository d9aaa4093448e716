use std::{fmt, fs::File, io::BufReader, path::{Path, PathBuf}, str::FromStr};

use ahash::AHashMap;
use anyhow::{Context, Result, anyhow, bail, ensure};
use log::{debug, info};
use netgraph::{Node, StreetGraph, graphml::load_graphml};
use tiff::decoder::{Decoder, DecodingResult};

use crate::config::Config;
use crate::io::save_graph;
use crate::layout::graph_files;
use crate::pool::run_tasks;

/// A 1-arc-second global elevation model delivered as 1°×1° tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterSource {
    /// ASTER GDEM v3 GeoTIFF tiles.
    Aster,
    /// SRTMGL1 raw `.hgt` tiles.
    Srtm,
}

impl RasterSource {
    pub const ALL: [RasterSource; 2] = [RasterSource::Aster, RasterSource::Srtm];

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            RasterSource::Aster => "aster",
            RasterSource::Srtm => "srtm",
        }
    }

    /// Node attribute holding this source's elevation.
    #[inline]
    pub fn attr(self) -> &'static str {
        match self {
            RasterSource::Aster => "elevation_aster",
            RasterSource::Srtm => "elevation_srtm",
        }
    }

    /// Directory holding this source's tiles.
    pub fn tiles_dir(self, config: &Config) -> &Path {
        match self {
            RasterSource::Aster => &config.gdem_aster_path,
            RasterSource::Srtm => &config.gdem_srtm_path,
        }
    }

    /// Headerless CSV listing this source's tile URLs.
    pub fn urls_path(self, config: &Config) -> &Path {
        match self {
            RasterSource::Aster => &config.gdem_aster_urls_path,
            RasterSource::Srtm => &config.gdem_srtm_urls_path,
        }
    }

    /// File name of a tile, e.g. `ASTGTMV003_N47E008_dem.tif` or `N47E008.hgt`.
    pub fn tile_file_name(self, tile: &str) -> String {
        match self {
            RasterSource::Aster => format!("ASTGTMV003_{tile}_dem.tif"),
            RasterSource::Srtm => format!("{tile}.hgt"),
        }
    }

    /// Value marking missing data.
    #[inline]
    fn nodata(self) -> i16 {
        match self {
            RasterSource::Aster => -9999,
            RasterSource::Srtm => -32768,
        }
    }

    #[inline]
    pub fn get(self, node: &Node) -> Option<f64> {
        match self {
            RasterSource::Aster => node.elevation_aster,
            RasterSource::Srtm => node.elevation_srtm,
        }
    }

    #[inline]
    pub fn set(self, node: &mut Node, value: Option<f64>) {
        match self {
            RasterSource::Aster => node.elevation_aster = value,
            RasterSource::Srtm => node.elevation_srtm = value,
        }
    }
}

impl fmt::Display for RasterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl FromStr for RasterSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "aster" => Ok(RasterSource::Aster),
            "srtm" => Ok(RasterSource::Srtm),
            other => bail!("Unknown raster source {other:?} (expected aster or srtm)"),
        }
    }
}

/// Name of the 1°×1° tile containing a point, from its south-west corner.
pub fn tile_name(lon: f64, lat: f64) -> String {
    let (south, west) = (lat.floor() as i32, lon.floor() as i32);
    format!(
        "{}{:02}{}{:03}",
        if south < 0 { 'S' } else { 'N' }, south.unsigned_abs(),
        if west < 0 { 'W' } else { 'E' }, west.unsigned_abs(),
    )
}

// ---------------------------------------------------------------------------
// Tiles
// ---------------------------------------------------------------------------

/// One decoded tile. Samples are row-major from the north-west corner, with
/// the outer rows and columns lying on the tile's edges.
pub struct Tile {
    south: f64,
    west: f64,
    size: usize,
    samples: Vec<i16>,
    nodata: i16,
}

impl Tile {
    pub fn new(south: f64, west: f64, size: usize, samples: Vec<i16>, nodata: i16) -> Result<Self> {
        ensure!(size >= 2 && samples.len() == size * size, "[raster] Expected {size}x{size} samples, got {}", samples.len());
        Ok(Self { south, west, size, samples, nodata })
    }

    /// Read an SRTM `.hgt` tile: big-endian 16-bit samples, 3601 or 1201 per side.
    pub fn read_hgt(path: &Path, south: f64, west: f64) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("[raster] Failed to read {}", path.display()))?;
        let size = match bytes.len() {
            n if n == 3601 * 3601 * 2 => 3601,
            n if n == 1201 * 1201 * 2 => 1201,
            n => bail!("[raster] {} has unexpected size {n}", path.display()),
        };
        let samples = bytes.chunks_exact(2).map(|b| i16::from_be_bytes([b[0], b[1]])).collect();
        Self::new(south, west, size, samples, RasterSource::Srtm.nodata())
    }

    /// Read a square single-band 16-bit GeoTIFF tile.
    pub fn read_geotiff(path: &Path, south: f64, west: f64) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("[raster] Failed to open {}", path.display()))?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .with_context(|| format!("[raster] {} is not a TIFF", path.display()))?;
        let (width, height) = decoder.dimensions()?;
        ensure!(width == height, "[raster] {} is not square ({width}x{height})", path.display());
        let samples = match decoder.read_image()? {
            DecodingResult::I16(v) => v,
            DecodingResult::U16(v) => v.into_iter().map(|s| s.min(i16::MAX as u16) as i16).collect(),
            _ => bail!("[raster] {} does not hold 16-bit samples", path.display()),
        };
        Self::new(south, west, width as usize, samples, RasterSource::Aster.nodata())
    }

    /// Elevation of the pixel nearest a point, `None` for voids and points
    /// outside the tile.
    pub fn sample(&self, lon: f64, lat: f64) -> Option<f64> {
        let span = (self.size - 1) as f64;
        let row = ((self.south + 1.0 - lat) * span).round();
        let col = ((lon - self.west) * span).round();
        if !(0.0..=span).contains(&row) || !(0.0..=span).contains(&col) { return None }
        let value = self.samples[row as usize * self.size + col as usize];
        (value != self.nodata).then_some(value as f64)
    }
}

/// Lazily loaded tiles of one source. Tiles missing from disk sample as `None`.
pub struct TileSet {
    source: RasterSource,
    dir: PathBuf,
    tiles: AHashMap<String, Option<Tile>>,
}

impl TileSet {
    pub fn new(source: RasterSource, dir: &Path) -> Self {
        Self { source, dir: dir.to_path_buf(), tiles: AHashMap::new() }
    }

    fn load(&self, name: &str, lon: f64, lat: f64) -> Result<Option<Tile>> {
        let path = self.dir.join(self.source.tile_file_name(name));
        if !path.is_file() {
            debug!("[raster] No {} tile {name}", self.source);
            return Ok(None);
        }
        let (south, west) = (lat.floor(), lon.floor());
        let tile = match self.source {
            RasterSource::Aster => Tile::read_geotiff(&path, south, west)?,
            RasterSource::Srtm => Tile::read_hgt(&path, south, west)?,
        };
        Ok(Some(tile))
    }

    pub fn sample(&mut self, lon: f64, lat: f64) -> Result<Option<f64>> {
        let name = tile_name(lon, lat);
        if !self.tiles.contains_key(&name) {
            let tile = self.load(&name, lon, lat)?;
            self.tiles.insert(name.clone(), tile);
        }
        let tile = self.tiles.get(&name).ok_or_else(|| anyhow!("[raster] Tile {name} not loaded"))?;
        Ok(tile.as_ref().and_then(|t| t.sample(lon, lat)))
    }
}

// ---------------------------------------------------------------------------
// Graphs
// ---------------------------------------------------------------------------

/// Sample `source` at every node. Returns how many nodes got a value.
pub fn sample_graph(graph: &mut StreetGraph, tiles: &mut TileSet) -> Result<usize> {
    let source = tiles.source;
    let mut found = 0;
    for node in graph.nodes_mut() {
        let value = tiles.sample(node.x, node.y)?;
        found += value.is_some() as usize;
        source.set(node, value);
    }
    Ok(found)
}

/// Fill in each raster source missing from any node. Returns whether the graph changed.
fn add_to_graph(config: &Config, path: &Path) -> Result<bool> {
    let mut graph = load_graphml(path).with_context(|| format!("[raster] Failed to load {}", path.display()))?;
    let mut changed = false;
    for source in RasterSource::ALL {
        if graph.nodes().iter().all(|n| source.get(n).is_some()) { continue }
        let mut tiles = TileSet::new(source, source.tiles_dir(config));
        let found = sample_graph(&mut graph, &mut tiles)?;
        debug!("[raster] {}: {found} of {} nodes have {}", path.display(), graph.node_count(), source.attr());
        changed = true;
    }
    if changed {
        save_graph(&graph, path).with_context(|| format!("[raster] Failed to save {}", path.display()))?;
    }
    Ok(changed)
}

/// Add ASTER and SRTM elevations to every graph whose nodes lack them.
/// Returns the number of graphs updated.
pub fn add_raster_elevations(config: &Config) -> Result<usize> {
    let graphs = graph_files(&config.models_graphml_path)?;
    info!("[raster] Adding elevation to {} graphs", graphs.len());
    let changed = run_tasks("raster", config.workers(), graphs, |path| add_to_graph(config, path))?;
    Ok(changed.into_iter().filter(|&c| c).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{save_test_graph, street_grid};

    /// A 1201×1201 tile whose samples encode their row and column.
    fn write_hgt(path: &Path, void_at: (usize, usize)) {
        let mut bytes = Vec::with_capacity(1201 * 1201 * 2);
        for row in 0..1201 {
            for col in 0..1201 {
                let value: i16 = if (row, col) == void_at { -32768 } else { (row % 100 * 100 + col % 100) as i16 };
                bytes.extend_from_slice(&value.to_be_bytes());
            }
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn tile_names_use_south_west_corner() {
        assert_eq!(tile_name(8.54, 47.37), "N47E008");
        assert_eq!(tile_name(-0.5, -0.5), "S01W001");
        assert_eq!(tile_name(-73.99, 40.73), "N40W074");
        assert_eq!(tile_name(151.2, -33.87), "S34E151");
        assert_eq!(RasterSource::Aster.tile_file_name("N47E008"), "ASTGTMV003_N47E008_dem.tif");
    }

    #[test]
    fn sampling_picks_nearest_pixel() {
        let samples: Vec<i16> = (0..9).collect();
        let tile = Tile::new(10.0, 20.0, 3, samples, -9999).unwrap();
        // north-west corner, center and south-east corner
        assert_eq!(tile.sample(20.0, 11.0), Some(0.0));
        assert_eq!(tile.sample(20.5, 10.5), Some(4.0));
        assert_eq!(tile.sample(20.99, 10.01), Some(8.0));
        // closer to the middle row than to the top
        assert_eq!(tile.sample(20.1, 10.7), Some(3.0));
        assert_eq!(tile.sample(21.5, 10.5), None);
    }

    #[test]
    fn hgt_voids_are_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("N00E000.hgt");
        write_hgt(&path, (0, 0));
        let tile = Tile::read_hgt(&path, 0.0, 0.0).unwrap();
        assert_eq!(tile.sample(0.0, 1.0), None);
        // row 1200 - 0.001 * 1200 = 1198.8 -> 1199, col 0.002 * 1200 = 2.4 -> 2
        assert_eq!(tile.sample(0.002, 0.001), Some((99 * 100 + 2) as f64));

        std::fs::write(dir.path().join("bad.hgt"), [0u8; 10]).unwrap();
        assert!(Tile::read_hgt(&dir.path().join("bad.hgt"), 0.0, 0.0).is_err());
    }

    #[test]
    fn graphs_get_missing_sources_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::under(dir.path());
        std::fs::create_dir_all(&config.gdem_srtm_path).unwrap();
        write_hgt(&config.gdem_srtm_path.join("N00E000.hgt"), (usize::MAX, 0));

        let mut grid = street_grid(2);
        grid.nodes_mut().iter_mut().for_each(|n| n.elevation_srtm = None);
        let path = save_test_graph(&config, "nowhere-XXX", "grid-1", &grid);

        assert_eq!(add_raster_elevations(&config).unwrap(), 1);
        let graph = load_graphml(&path).unwrap();
        // node 1 sits on the tile's south-west corner: row 1200, col 0
        assert_eq!(graph.node(1).unwrap().elevation_srtm, Some(0.0));
        assert_eq!(graph.node(1).unwrap().elevation_aster, Some(100.0));
        assert!(graph.nodes().iter().all(|n| n.elevation_srtm.is_some()));

        assert_eq!(add_raster_elevations(&config).unwrap(), 0);
    }
}
