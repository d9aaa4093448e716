use anyhow::{Result, bail};
use log::info;

use super::{load_config, load_keys};
use crate::cli::{Cli, UploadArgs, VerifyArgs};

pub fn save_files(cli: &Cli) -> Result<()> {
    let saved = streetnets::save_files(&load_config(cli)?)?;
    info!("Saved GeoJSON and node/edge lists for {saved} graphs");
    Ok(())
}

pub fn verify_files(cli: &Cli, args: &VerifyArgs) -> Result<()> {
    streetnets::verify_files(&load_config(cli)?, args.deep)?;
    Ok(())
}

pub fn stage_files(cli: &Cli) -> Result<()> {
    let staged = streetnets::stage_files(&load_config(cli)?)?;
    info!("Staged {staged} zip files");
    Ok(())
}

pub fn upload(cli: &Cli, args: &UploadArgs) -> Result<()> {
    let report = streetnets::upload_files(&load_config(cli)?, &load_keys(cli)?, args.delete_existing)?;
    if !report.failed.is_empty() {
        bail!("{} uploads failed: {:?}", report.failed.len(), report.failed);
    }
    Ok(())
}
