use anyhow::Result;
use log::info;

use super::load_config;
use crate::cli::Cli;

pub fn node_bc(cli: &Cli) -> Result<()> {
    let done = streetnets::calculate_node_bc(&load_config(cli)?)?;
    info!("Calculated betweenness for {done} graphs");
    Ok(())
}

pub fn indicators(cli: &Cli) -> Result<()> {
    let saved = streetnets::calculate_indicators(&load_config(cli)?)?;
    info!("Calculated indicators for {saved} graphs");
    Ok(())
}

pub fn merge(cli: &Cli) -> Result<()> {
    let rows = streetnets::merge_indicators(&load_config(cli)?)?;
    info!("Merged indicators of {rows} urban centers");
    Ok(())
}

pub fn metadata(cli: &Cli) -> Result<()> {
    streetnets::create_metadata(&load_config(cli)?)
}
