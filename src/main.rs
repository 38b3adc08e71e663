use std::io;

use log::warn;
use tracing_subscriber::EnvFilter;

use task_progress_tracker::app::cli;
use task_progress_tracker::config::TrackerConfig;
use task_progress_tracker::manager::task_registry::TaskRegistry;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> io::Result<()> {
    init_logging();

    let config = TrackerConfig::from_env().unwrap_or_else(|e| {
        warn!("Invalid configuration, using defaults: {}", e);
        TrackerConfig::default()
    });
    let registry = TaskRegistry::new(config);

    cli::run_cli(registry)
}
