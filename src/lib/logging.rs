use std::{fs::OpenOptions, io, path::Path, str::FromStr};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Initialize logging to stdout and optionally to a file.
///
/// The level comes from `RUST_LOG` and defaults to "info". A log file that
/// cannot be opened is reported and logging continues on stdout only.
pub fn init_logging(log_file: Option<&Path>) {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let log_level_filter = LevelFilter::from_str(&rust_log).unwrap_or(LevelFilter::INFO);
    let env_filter = EnvFilter::new(log_level_filter.to_string());
    let stdout_layer = fmt::layer().with_writer(io::stdout);

    let file = log_file.map(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| (path.to_owned(), e))
    });

    let result = match file {
        Some(Ok(file)) => {
            let file_layer = fmt::layer().with_ansi(false).with_writer(std::sync::Mutex::new(file));
            tracing::subscriber::set_global_default(
                Registry::default()
                    .with(env_filter)
                    .with(stdout_layer)
                    .with(file_layer),
            )
        }
        Some(Err((path, e))) => {
            eprintln!("Failed to open log file {}: {}", path.display(), e);
            tracing::subscriber::set_global_default(
                Registry::default().with(env_filter).with(stdout_layer),
            )
        }
        None => tracing::subscriber::set_global_default(
            Registry::default().with(env_filter).with(stdout_layer),
        ),
    };

    if let Err(e) = result {
        eprintln!("Failed to set global subscriber: {}", e);
    }
}
