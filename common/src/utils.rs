//! Small shared helpers.

use std::path::PathBuf;

use anyhow::{anyhow, Result};

/// Resolve (and create, if missing) the directory Rialto keeps its config in.
pub fn get_app_config_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow!("failed to find os config dir"))?;
    path.push("rialto");

    if !path.exists() {
        std::fs::create_dir_all(&path)?;
    }
    Ok(path)
}
