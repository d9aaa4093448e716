//! Publishing: alternate model formats, consistency checks, per-country zips
//! and the Dataverse upload.

mod checks;
mod save;
mod stage;
mod upload;

pub use checks::{FileReport, verify_files};
pub use save::{EDGE_COLUMNS, EDGE_LIST, NODE_COLUMNS, NODE_LIST, SavedPaths, edges_frame, graph_features, nodes_frame, save_files};
pub use stage::{Format, formats, stage_files, zip_folder};
pub use upload::{
    Dataverse, UploadReport, country_name, parse_added_md5, parse_file_list, parse_statement, server_filename,
    upload_files, upload_payload, wrap_in_zip,
};
