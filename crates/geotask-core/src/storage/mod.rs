mod config;
pub mod database;
pub mod memory;

pub use config::{Config, LoggingSection, SchedulerConfig, SchedulerSection};
pub use database::Database;
pub use memory::{MemoryStore, RecordingAlarms};

use std::path::PathBuf;

/// Returns `~/.config/geotask[-dev]/` based on GEOTASK_ENV.
///
/// Set GEOTASK_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("GEOTASK_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("geotask-dev")
    } else {
        base_dir.join("geotask")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
