pub mod elevation;
pub mod indicators;
pub mod publish;

use anyhow::Result;
use log::info;
use streetnets::{Config, Keys};

use crate::cli::Cli;

pub fn load_config(cli: &Cli) -> Result<Config> {
    info!("Loading config from {}", cli.config.display());
    Config::load(&cli.config)
}

pub fn load_keys(cli: &Cli) -> Result<Keys> {
    Keys::load(&cli.keys)
}

pub fn prep_ucs(cli: &Cli) -> Result<()> {
    let kept = streetnets::prep_urban_centers(&load_config(cli)?)?;
    info!("Prepared {kept} urban centers");
    Ok(())
}

pub fn cache_overpass(cli: &Cli) -> Result<()> {
    let cached = streetnets::cache_overpass(&load_config(cli)?)?;
    info!("Cached Overpass responses for {cached} urban centers");
    Ok(())
}

pub fn acquire(cli: &Cli) -> Result<()> {
    let saved = streetnets::acquire_graphs(&load_config(cli)?)?;
    info!("Saved {saved} graphs");
    Ok(())
}
