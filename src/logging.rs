use std::fs::File;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogConfig;

/// Initialize tracing with optional file output.
///
/// The terminal belongs to the TUI, so log lines never go to stdout or
/// stderr. Logging stays off entirely unless `log.file` is configured
/// (or `FEEDR_LOG__FILE` is set).
pub fn init(cfg: &LogConfig) {
    let Some(path) = cfg.file.as_ref() else {
        return;
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.level.clone()));

    let Ok(file) = File::create(path) else {
        eprintln!("Warning: Failed to create log file: {}", path.display());
        return;
    };

    let file_layer = fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();
}
