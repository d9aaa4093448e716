mod cli;
mod commands;

use clap::Parser;

use cli::{Cli, Commands};

fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::PrepUcs => commands::prep_ucs(cli),
        Commands::CacheOverpass => commands::cache_overpass(cli),
        Commands::Acquire => commands::acquire(cli),
        Commands::ClusterNodes => commands::elevation::cluster_nodes(cli),
        Commands::GoogleUrls => commands::elevation::google_urls(cli),
        Commands::GoogleDownload(args) => commands::elevation::google_download(cli, args),
        Commands::RasterDownload(args) => commands::elevation::raster_download(cli, args),
        Commands::RasterElevations => commands::elevation::raster_elevations(cli),
        Commands::AttachElevations => commands::elevation::attach_elevations(cli),
        Commands::NodeBc => commands::indicators::node_bc(cli),
        Commands::Indicators => commands::indicators::indicators(cli),
        Commands::MergeIndicators => commands::indicators::merge(cli),
        Commands::Metadata => commands::indicators::metadata(cli),
        Commands::SaveFiles => commands::publish::save_files(cli),
        Commands::VerifyFiles(args) => commands::publish::verify_files(cli, args),
        Commands::StageFiles => commands::publish::stage_files(cli),
        Commands::Upload(args) => commands::publish::upload(cli, args),
    }
}

fn main() {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_module_path(false)
        .init();

    if let Err(e) = run(&cli) {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}
