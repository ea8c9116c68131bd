//! Patchbay daemon - Main entry point
//!
//! Serves the migration-procedure REST API, or generates a single
//! procedure from a pair of layout files and exits.

mod api;
mod config;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use patchbay_core::{Layout, Plan, TaskRecord, Topology};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "patchbay")]
#[command(about = "Composable hardware migration procedure generator")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "patchbay.toml")]
    config: PathBuf,

    /// Bind address for the API server
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Current layout file; generate one procedure and exit
    #[arg(long, value_name = "FILE", requires = "new")]
    prev: Option<PathBuf>,

    /// Desired layout file; generate one procedure and exit
    #[arg(long, value_name = "FILE", requires = "prev")]
    new: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Patchbay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    // Override bind address if specified
    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }

    if let (Some(prev), Some(new)) = (&args.prev, &args.new) {
        // One-shot mode
        let records = plan_from_files(prev, new)?;
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        server::run(&config.daemon.bind).await?;
    }

    Ok(())
}

/// Generate a single migration procedure from two layout files.
fn plan_from_files(prev: &Path, new: &Path) -> Result<Vec<TaskRecord>> {
    let prev_json = std::fs::read_to_string(prev)
        .with_context(|| format!("Failed to read {}", prev.display()))?;
    let new_json = std::fs::read_to_string(new)
        .with_context(|| format!("Failed to read {}", new.display()))?;

    let prev_layout = Layout::parse(&prev_json)?;
    let new_layout = Layout::parse(&new_json)?;
    let bound = new_layout.bound_devices.clone();
    let prev_topology = Topology::from_layout(&prev_layout, &bound)?;
    let new_topology = Topology::from_layout(&new_layout, &bound)?;

    Ok(Plan::system_update_plan(&prev_topology, &new_topology).encode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_plan_from_files() {
        let mut prev = tempfile::NamedTempFile::new().unwrap();
        write!(
            prev,
            r#"{{"nodes": [{{"device": {{"cpu": {{"deviceIDs": ["cpu-01"]}},
                "memory": {{"deviceIDs": ["mem-01"]}}}}}}]}}"#
        )
        .unwrap();
        let mut new = tempfile::NamedTempFile::new().unwrap();
        write!(new, r#"{{"nodes": []}}"#).unwrap();

        let records = plan_from_files(prev.path(), new.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].operation, patchbay_core::Operation::Shutdown);
        assert_eq!(records[1].operation, patchbay_core::Operation::Disconnect);
    }

    #[test]
    fn test_plan_from_files_missing_file() {
        let err = plan_from_files(
            Path::new("/nonexistent/prev.json"),
            Path::new("/nonexistent/new.json"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
