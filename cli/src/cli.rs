use std::path::PathBuf;

use streetnets::RasterSource;

/// Street network pipeline for the world's urban centers
#[derive(clap::Parser, Debug)]
#[command(name = "streetnets", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace), RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Pipeline configuration file
    #[arg(long, default_value = "./config.json", global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Credentials file for Google, Earthdata and Dataverse
    #[arg(long, default_value = "./keys.json", global = true, value_hint = clap::ValueHint::FilePath)]
    pub keys: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Filter and clean the urban centers dataset
    PrepUcs,

    /// Fetch every urban center's Overpass responses into the cache
    CacheOverpass,

    /// Build, simplify and save every urban center's street graph
    Acquire,

    /// Group graph nodes into spatial clusters for Google requests
    ClusterNodes,

    /// Build Google Elevation API request URLs from node clusters
    GoogleUrls,

    /// Download Google elevations for every request URL
    GoogleDownload(GoogleDownloadArgs),

    /// Download ASTER or SRTM raster tiles
    RasterDownload(RasterDownloadArgs),

    /// Sample raster elevations onto graph nodes
    RasterElevations,

    /// Reconcile node elevations and add edge grades
    AttachElevations,

    /// Calculate node betweenness centrality
    NodeBc,

    /// Calculate street network indicators
    Indicators,

    /// Merge indicators with urban center attributes
    MergeIndicators,

    /// Write node, edge and indicator metadata
    Metadata,

    /// Save GeoJSON and node/edge lists for every graph
    SaveFiles,

    /// Check model files are consistent across formats
    VerifyFiles(VerifyArgs),

    /// Zip each country folder of each format
    StageFiles,

    /// Upload staged zips to Dataverse
    Upload(UploadArgs),
}

#[derive(clap::Args, Debug)]
pub struct GoogleDownloadArgs {
    /// Request URLs missing from the response cache from the API
    #[arg(long)]
    pub allow_api: bool,
}

#[derive(clap::Args, Debug)]
pub struct RasterDownloadArgs {
    /// Raster source: aster or srtm
    #[arg(long)]
    pub source: RasterSource,
}

#[derive(clap::Args, Debug)]
pub struct VerifyArgs {
    /// Also load every graph and check its elevations and grades
    #[arg(long)]
    pub deep: bool,
}

#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    /// Delete every file in the draft datasets before uploading
    #[arg(long)]
    pub delete_existing: bool,
}
