use crate::core::config::AppConfig;
use anyhow::{Context, Result};
use std::path::Path;

// Shipped inside the binary so setup works from any directory
const DEFAULT_CONFIG: &str = include_str!("../../docs/example_config.yaml");

/// Writes the example configuration to the platform config location.
pub fn setup() -> Result<()> {
    setup_at_path(AppConfig::default_config_path()?)
}

pub fn setup_at_path<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    std::fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
