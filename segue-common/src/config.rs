//! Configuration file resolution and loading
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config file (`<config dir>/segue/config.toml`)
//! 4. None: callers fall back to built-in defaults

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SEGUE_CONFIG";

/// Resolve which configuration file to read, if any.
///
/// An explicit CLI path or environment variable is returned even when the
/// file does not exist, so that `load_toml` reports the missing file instead
/// of silently falling back to defaults. The per-user file is only returned
/// when present.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: per-user config file
    let user_config = default_config_file()?;
    if user_config.exists() {
        Some(user_config)
    } else {
        debug!("No config file at {}", user_config.display());
        None
    }
}

/// Platform per-user config file location
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("segue").join("config.toml"))
}

/// Read and deserialize a TOML file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(format!("Config file not found: {}", path.display()))
        } else {
            Error::Io(e)
        }
    })?;

    let value = toml::from_str::<T>(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(value)
}

/// Resolve and load a config file, falling back to `T::default()` when no
/// file is configured.
pub fn load_or_default<T>(cli_arg: Option<&Path>, env_var_name: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match resolve_config_path(cli_arg, env_var_name) {
        Some(path) => load_toml(&path),
        None => {
            info!("No configuration file found, using built-in defaults");
            Ok(T::default())
        }
    }
}
