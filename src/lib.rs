#![doc = "Build, enrich and publish street network datasets for the world's urban centers"]
mod common;
mod io;
#[cfg(test)]
mod testutil;

pub mod acquire;
pub mod config;
pub mod elevation;
pub mod indicators;
pub mod layout;
pub mod pool;
pub mod publish;
pub mod ucdb;

#[doc(inline)]
pub use config::{Config, Keys};

#[doc(inline)]
pub use acquire::{acquire_graphs, cache_overpass};

#[doc(inline)]
pub use elevation::{RasterSource, add_raster_elevations, attach_elevations, cluster_nodes, download_google_elevations, download_rasters, make_google_urls};

#[doc(inline)]
pub use indicators::{calculate_indicators, calculate_node_bc, create_metadata, merge_indicators};

#[doc(inline)]
pub use publish::{save_files, stage_files, upload_files, verify_files};

#[doc(inline)]
pub use ucdb::{load_urban_centers, prep_urban_centers};
