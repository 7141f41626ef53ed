use std::path::PathBuf;

use clap::Parser;
use ext_config::{Config, File, FileFormat};
use share_processor::{config::ShareProcessorConfig, error::Error};
use tracing::error;

/// CLI argument parser for the share processor binary.
///
/// Supports the following flags:
/// - `-c`, `--config`: specify a custom config file path
/// - `-f`, `--log-file`: also write logs to this file
/// - `-i`, `--input`: JSON-lines share events to replay, stdin when absent
#[derive(Parser, Debug)]
#[command(author, version, about = "Pool share processor", long_about = None)]
pub struct Args {
    #[arg(
        short = 'c',
        long = "config",
        help = "Path to the TOML configuration file",
        default_value = "share-processor-config.toml"
    )]
    pub config_path: PathBuf,
    #[arg(
        short = 'f',
        long = "log-file",
        help = "Path to the log file. If not set, logs will only be written to stdout."
    )]
    pub log_file: Option<PathBuf>,
    #[arg(
        short = 'i',
        long = "input",
        help = "JSON-lines file of share events. Reads stdin when not set."
    )]
    pub input: Option<PathBuf>,
}

/// Process CLI args and load configuration.
pub fn process_cli_args() -> Result<(ShareProcessorConfig, Option<PathBuf>), Error> {
    let args = Args::parse();

    let config_path = args.config_path.to_str().ok_or_else(|| {
        error!("Invalid configuration path.");
        Error::BadCliArgs(format!("{:?}", args.config_path))
    })?;

    let settings = Config::builder()
        .add_source(File::new(config_path, FileFormat::Toml))
        .build()
        .map_err(|e| {
            error!("Failed to build config: {}", e);
            e
        })?;

    let mut config = settings
        .try_deserialize::<ShareProcessorConfig>()
        .map_err(|e| {
            error!("Failed to deserialize config: {}", e);
            e
        })?;

    config.set_log_file(args.log_file);

    Ok((config, args.input))
}
