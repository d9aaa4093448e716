//! Urban-centers dataset: filtering, cleaning and loading.

mod clean;
mod dataset;

pub use clean::clean_str;
pub use dataset::*;
