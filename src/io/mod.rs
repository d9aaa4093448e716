//! Tabular and geometry file formats shared by the pipeline stages.

mod csv;
mod geojson;
mod graphml;

pub(crate) use csv::*;
pub(crate) use geojson::*;
pub(crate) use graphml::*;
