//! Initialize the configuration directory: create ~/.simon, a default config
//! file, and the conversation store directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config;

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with `{}` if missing.
/// - Creates the conversation store directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        std::fs::write(config_path, b"{}")
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    let (loaded, _) = config::load_config(Some(config_path.to_path_buf()))?;
    let store_dir = config::resolve_store_dir(&loaded);
    std::fs::create_dir_all(&store_dir)
        .with_context(|| format!("creating store directory {}", store_dir.display()))?;
    log::info!("conversation store directory at {}", store_dir.display());

    Ok(config_dir.to_path_buf())
}
