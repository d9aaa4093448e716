use std::{path::Path, time::Duration};

use anyhow::{Context, Result, anyhow};
use log::info;

use crate::common::{download_file, ensure_dir_exists, extract_zip, http_client};
use crate::config::{Config, Keys};
use crate::io::read_first_column;
use crate::pool::run_tasks;

use super::raster::RasterSource;

/// Concurrent downloads allowed against the Earthdata servers.
const DOWNLOAD_WORKERS: usize = 4;

fn url_file_name(url: &str) -> Result<&str> {
    url.rsplit('/').next().filter(|name| !name.is_empty())
        .ok_or_else(|| anyhow!("[tiles] No file name in URL {url}"))
}

/// Tile URLs of `source` that still need downloading, sorted.
///
/// Only ASTER elevation rasters (`*_dem.tif`) are kept. SRTM downloads are
/// zips named after their tile, done once the tile's `.hgt` exists.
pub fn remaining_urls(source: RasterSource, mut urls: Vec<String>, dir: &Path) -> Result<Vec<String>> {
    urls.sort();
    let mut remaining = Vec::new();
    for url in urls {
        let name = url_file_name(&url)?;
        let done = match source {
            RasterSource::Aster => {
                if !name.ends_with("_dem.tif") { continue }
                dir.join(name).is_file()
            }
            RasterSource::Srtm => {
                let tile = name.split('.').next().unwrap_or(name);
                dir.join(format!("{tile}.hgt")).is_file()
            }
        };
        if !done { remaining.push(url) }
    }
    Ok(remaining)
}

fn download_tile(client: &reqwest::blocking::Client, source: RasterSource, dir: &Path, url: &str, auth: (&str, &str)) -> Result<()> {
    let path = dir.join(url_file_name(url)?);
    download_file(client, url, &path, Some(auth))?;
    if source == RasterSource::Srtm {
        extract_zip(&path, dir, true).with_context(|| format!("[tiles] Failed to unpack {}", path.display()))?;
    }
    Ok(())
}

/// Download every missing tile of `source` listed in its URL file, with
/// Earthdata credentials. Returns the number of tiles downloaded.
pub fn download_rasters(config: &Config, keys: &Keys, source: RasterSource) -> Result<usize> {
    let auth = keys.earthdata()?;
    let dir = source.tiles_dir(config);
    ensure_dir_exists(dir)?;

    let urls = read_first_column(source.urls_path(config))?;
    let total = urls.len();
    let remaining = remaining_urls(source, urls, dir)?;
    info!("[tiles] Downloading {} of {total} {source} URLs", remaining.len());

    let client = http_client(Duration::from_secs(600))?;
    let done = run_tasks("tiles", DOWNLOAD_WORKERS, remaining, |url| download_tile(&client, source, dir, url, auth))?;

    let files = std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0);
    info!("[tiles] Finished: {files} files in {}", dir.display());
    Ok(done.len())
}
