use anyhow::Result;
use log::info;

use super::{load_config, load_keys};
use crate::cli::{Cli, GoogleDownloadArgs, RasterDownloadArgs};

pub fn cluster_nodes(cli: &Cli) -> Result<()> {
    let clustered = streetnets::cluster_nodes(&load_config(cli)?)?;
    info!("Clustered nodes of {clustered} graphs");
    Ok(())
}

pub fn google_urls(cli: &Cli) -> Result<()> {
    let urls = streetnets::make_google_urls(&load_config(cli)?, &load_keys(cli)?)?;
    info!("Made {urls} Google Elevation request URLs");
    Ok(())
}

pub fn google_download(cli: &Cli, args: &GoogleDownloadArgs) -> Result<()> {
    let nodes = streetnets::download_google_elevations(&load_config(cli)?, args.allow_api)?;
    info!("Saved Google elevations of {nodes} nodes");
    Ok(())
}

pub fn raster_download(cli: &Cli, args: &RasterDownloadArgs) -> Result<()> {
    let tiles = streetnets::download_rasters(&load_config(cli)?, &load_keys(cli)?, args.source)?;
    info!("Downloaded {tiles} {} tiles", args.source);
    Ok(())
}

pub fn raster_elevations(cli: &Cli) -> Result<()> {
    let updated = streetnets::add_raster_elevations(&load_config(cli)?)?;
    info!("Added raster elevations to {updated} graphs");
    Ok(())
}

pub fn attach_elevations(cli: &Cli) -> Result<()> {
    let updated = streetnets::attach_elevations(&load_config(cli)?)?;
    info!("Attached elevations and grades to {updated} graphs");
    Ok(())
}
