use std::fs::OpenOptions;

use anyhow::{Context, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log to stderr, filtered by `RUST_LOG` (default `info`). When
/// `FEEDSTR_LOG_FILE` is set, DEBUG and above also go to that file.
pub fn init_tracing() -> Result<()> {
    let file_logging = std::env::var("FEEDSTR_LOG_FILE").ok();

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    let registry = tracing_subscriber::registry().with(stderr_layer);

    if let Some(log_path) = file_logging {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file: {}", log_path))?;

        let file_layer = fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(LevelFilter::DEBUG);

        registry.with(file_layer).try_init()?;
        eprintln!("File logging enabled: {}", log_path);
    } else {
        registry.try_init()?;
    }
    Ok(())
}
