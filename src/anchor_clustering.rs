use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

use detprep::{run_anchor_clustering, AnchorArgs};

fn main() -> ExitCode {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = AnchorArgs::parse();

    let dirname = PathBuf::from(&args.file_path);
    if !dirname.exists() {
        error!("The specified file_path does not exist: {}", args.file_path);
        return ExitCode::FAILURE;
    }

    info!("Starting anchor clustering...");

    match run_anchor_clustering(&args) {
        Ok(layers) => {
            for layer in &layers {
                info!(
                    "thresh {}: {} anchor(s) {:?}",
                    layer.thresh,
                    layer.final_centro.len(),
                    layer.final_centro
                );
            }
            info!("Anchor clustering completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Anchor clustering failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
