mod download;
mod fs;
mod hash;
mod num;

pub(crate) use download::*;
pub(crate) use fs::*;
pub(crate) use hash::*;
pub(crate) use num::*;
