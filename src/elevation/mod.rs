//! Node elevations from ASTER and SRTM rasters, checked against the Google
//! Elevation API.
//!
//! Stages run in order: raster tiles are downloaded and sampled at every
//! node, nodes are clustered into API-sized batches whose URLs are fetched
//! (or read from the response cache), then the sources are reconciled into
//! one elevation per node and edge grades are recomputed.

mod attach;
mod cluster;
mod google;
mod raster;
mod reconcile;
mod tiles;

pub use attach::{attach_elevations, attach_to_graph};
pub use cluster::{MAX_CLUSTER_SIZE, cluster_nodes, cluster_points, clusters_path};
pub use google::{
    ClusteredNode, GoogleElevation, GoogleRequest, MAX_URL_CHARS, REQUESTS_PER_KEY, download_google_elevations,
    google_requests, load_google_elevations, make_google_urls, parse_elevations,
};
pub use raster::{RasterSource, Tile, TileSet, add_raster_elevations, sample_graph, tile_name};
pub use reconcile::{ElevationRecord, SRTM_ERROR_M, reconcile};
pub use tiles::{download_rasters, remaining_urls};
