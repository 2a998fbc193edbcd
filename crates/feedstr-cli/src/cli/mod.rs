pub mod commands;
pub mod config;
pub mod render;
pub mod tracing_setup;

pub use commands::{run_feed, run_feeds, run_note, run_thread, OutputFormat};
pub use config::CliConfig;
pub use tracing_setup::init_tracing;
