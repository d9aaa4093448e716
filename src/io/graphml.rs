use std::{io::BufWriter, path::Path};

use anyhow::{Context, Result};
use netgraph::{StreetGraph, graphml::write_graphml};

use crate::common::PendingWrite;

/// Save a graph as GraphML, replacing any existing file only once the whole
/// document is written.
pub(crate) fn save_graph(graph: &StreetGraph, path: &Path) -> Result<()> {
    let mut sink = PendingWrite::open(path, true)?;
    write_graphml(graph, BufWriter::new(&mut sink))
        .with_context(|| format!("[io::graphml] Failed to write {}", path.display()))?;
    sink.finalize()
}
