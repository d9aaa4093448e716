pub mod centrality;
pub mod clustering;
pub mod consolidate;
pub mod convert;
pub mod csr;
pub mod geodesy;
pub mod graph;
pub mod graphml;
pub mod simplify;
pub mod truncate;

pub use convert::{SimpleDigraph, SimpleGraph, UndirectedEdge, UndirectedMultigraph};
pub use csr::Csr;
pub use graph::{Edge, GraphError, Node, StreetGraph};
