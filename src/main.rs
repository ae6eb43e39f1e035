use clap::Parser;
use log::{debug, error, info};

// Define modules used by main
mod cli;
mod colormap;
mod composite;
mod dehnen;
mod derive;
mod driver;
mod image;
mod mond;
mod movify;
mod profile;
mod registry;
mod view;

use cli::Cli;
use cluster_common::{init_config, init_logging, ClusterConfig, LogOutput};

fn main() {
    let args = Cli::parse();

    // --- Load Configuration ---
    let config = match ClusterConfig::load_or_default() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("fatal: {e}");
            std::process::exit(1);
        }
    };

    // --- Initialize the logger ---
    let output = match args.output_type {
        cli::OutputTarget::File => LogOutput::File,
        cli::OutputTarget::Stdout => LogOutput::Stdout,
    };
    let level = args.logging_level.unwrap_or(config.logging.level);
    if let Err(e) = init_logging(
        level,
        output,
        &config.paths.figures_root,
        &config.logging.file,
    ) {
        eprintln!("fatal: {e:#}");
        std::process::exit(1);
    }
    init_config(config);

    info!("Starting cluster pipeline...");
    debug!("Parsed arguments: {args:#?}");

    // --- Dispatch ---
    if let Err(e) = cli::run(args) {
        error!("{e}");
        std::process::exit(e.exit_code());
    }
    info!("Done.");
}
