use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

use detprep::{run_record_creation, RecordArgs};

fn main() -> ExitCode {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = RecordArgs::parse();

    let dirname = PathBuf::from(&args.file_path);
    if !dirname.exists() {
        error!("The specified file_path does not exist: {}", args.file_path);
        return ExitCode::FAILURE;
    }

    info!("Starting record creation...");

    match run_record_creation(&args) {
        Ok((count, paths)) => {
            info!(
                "Successfully wrote {} example(s) to {} file(s) under {}",
                count,
                paths.len(),
                dirname.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to create records: {}", e);
            ExitCode::FAILURE
        }
    }
}
