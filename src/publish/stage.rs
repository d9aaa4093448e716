use std::{fs::File, io, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use log::info;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use crate::common::{PendingWrite, files_at_depth, subdirs};
use crate::config::Config;
use crate::pool::run_tasks;

/// A published model format and where its files and staged zips live.
#[derive(Debug, Clone)]
pub struct Format {
    pub name: &'static str,
    pub models: PathBuf,
    pub staging: PathBuf,
    /// Depth of the model files below a country folder.
    pub depth: usize,
    pub extension: &'static str,
}

/// GraphML, GeoJSON and node/edge lists, in upload order.
pub fn formats(config: &Config) -> [Format; 3] {
    [
        Format {
            name: "graphml",
            models: config.models_graphml_path.clone(),
            staging: config.staging_graphml_path.clone(),
            depth: 1,
            extension: "graphml",
        },
        Format {
            name: "geojson",
            models: config.models_geojson_path.clone(),
            staging: config.staging_geojson_path.clone(),
            depth: 1,
            extension: "geojson",
        },
        Format {
            name: "nelist",
            models: config.models_nelist_path.clone(),
            staging: config.staging_nelist_path.clone(),
            depth: 2,
            extension: "csv",
        },
    ]
}

/// Zip every model file of one country folder. Entries are named by their
/// parent folder and file name, e.g. `france-FRA/lyon-7.graphml` or
/// `lyon-7/node_list.csv`.
pub fn zip_folder(input: &Path, output: &Path, depth: usize, extension: &str) -> Result<usize> {
    let files = files_at_depth(input, depth, extension)?;
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut zip = ZipWriter::new(PendingWrite::open(output, false)?);
    for path in &files {
        let folder = path.parent().and_then(Path::file_name).and_then(|s| s.to_str()).unwrap_or_default();
        let name = path.file_name().and_then(|s| s.to_str()).unwrap_or_default();
        zip.start_file(format!("{folder}/{name}"), options)
            .with_context(|| format!("[stage] Failed to add {} to {}", path.display(), output.display()))?;
        let mut file = File::open(path).with_context(|| format!("[stage] Failed to open {}", path.display()))?;
        io::copy(&mut file, &mut zip)?;
    }
    let mut sink = zip.finish().with_context(|| format!("[stage] Failed to finish {}", output.display()))?;
    sink.finalize()?;
    Ok(files.len())
}

/// Zip each country folder of each format to `{staging}/{country}.zip`
/// unless the zip exists. Returns the number of zips written.
pub fn stage_files(config: &Config) -> Result<usize> {
    let mut todo = Vec::new();
    for format in formats(config) {
        for country in subdirs(&format.models)? {
            let Some(name) = country.file_name().and_then(|s| s.to_str()) else { continue };
            let output = format.staging.join(format!("{name}.zip"));
            if !output.is_file() { todo.push((country.clone(), output, format.depth, format.extension)) }
        }
    }
    info!("[stage] Compressing and staging {} country folders", todo.len());
    let done = run_tasks("stage", config.workers(), todo, |(input, output, depth, extension)| {
        let count = zip_folder(input, output, *depth, extension)?;
        info!("[stage] Staged {count} files to {}", output.display());
        Ok(())
    })?;
    Ok(done.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip::ZipArchive;

    fn entry_names(path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_owned).collect();
        names.sort();
        names
    }

    #[test]
    fn country_folders_are_zipped_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::under(dir.path());
        let graphml = config.models_graphml_path.join("france-FRA");
        let lists = config.models_nelist_path.join("france-FRA/lyon-7");
        std::fs::create_dir_all(&graphml).unwrap();
        std::fs::create_dir_all(&lists).unwrap();
        std::fs::create_dir_all(config.models_geojson_path.join("france-FRA")).unwrap();
        std::fs::write(graphml.join("lyon-7.graphml"), "<graphml/>").unwrap();
        std::fs::write(lists.join("node_list.csv"), "osmid\n1\n").unwrap();
        std::fs::write(lists.join("edge_list.csv"), "u,v\n1,2\n").unwrap();

        assert_eq!(stage_files(&config).unwrap(), 3);
        assert_eq!(entry_names(&config.staging_graphml_path.join("france-FRA.zip")), ["france-FRA/lyon-7.graphml"]);
        assert_eq!(
            entry_names(&config.staging_nelist_path.join("france-FRA.zip")),
            ["lyon-7/edge_list.csv", "lyon-7/node_list.csv"],
        );
        assert!(entry_names(&config.staging_geojson_path.join("france-FRA.zip")).is_empty());

        assert_eq!(stage_files(&config).unwrap(), 0);
    }
}
