//! Street network indicators per urban center.
//!
//! Betweenness is computed first and saved onto the graphs, then every graph
//! is summarized into one row of indicators. Rows are merged with the urban
//! center attributes and documented in metadata tables.

mod betweenness;
mod merge;
mod metadata;
mod orientation;
pub mod stats;
mod street;

pub use betweenness::{bc_path, calculate_node_bc, node_betweenness};
pub use merge::{ATTRIBUTE_NAMES, UNPUBLISHED, attributes_frame, merge_frames, merge_indicators};
pub use metadata::{EDGE_FIELDS, INDICATOR_DESCRIPTIONS, NODE_FIELDS, create_metadata, describe_indicators, type_name};
pub use orientation::{ENTROPY_BINS, MIN_BEARING_LENGTH_M, bearing_histogram, orientation_entropy, orientation_order, street_bearings};
pub use street::{CHECKPOINT_EVERY, CLEAN_INTERSECTION_TOL_M, IndicatorRow, calculate_indicators, graph_identity, graph_indicators, rows_frame};
