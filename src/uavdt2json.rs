use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

use detprep::{run_uavdt_conversion, ConvertArgs};

fn main() -> ExitCode {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = ConvertArgs::parse();

    let dirname = PathBuf::from(&args.file_path);
    if !dirname.exists() {
        error!("The specified file_path does not exist: {}", args.file_path);
        return ExitCode::FAILURE;
    }

    info!("Starting UAVDT ground truth conversion...");

    match run_uavdt_conversion(&args) {
        Ok(paths) => {
            info!("Conversion completed, wrote {} file(s).", paths.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to convert ground truth: {}", e);
            ExitCode::FAILURE
        }
    }
}
