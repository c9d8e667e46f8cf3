//! Config file discovery and layered loading.
//!
//! Implements the `Config::load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Merge `~/.tether/config.toml` (or `TETHER_HOME/config.toml`)
//! 3. Merge the explicit config file, if one was given
//! 4. Apply `TETHER_LOG_LEVEL` / `TETHER_LOG_FORMAT` overrides
//! 5. Deserialize merged tree → `Config`
//! 6. Validate
//! 7. Return `ResolvedConfig`

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::merge::deep_merge;
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Environment variables mapped onto config fields. Unlike file layers these
/// override whatever the files say.
const ENV_OVERRIDES: &[(&str, &str, &str)] = &[
    ("TETHER_LOG_LEVEL", "logging", "level"),
    ("TETHER_LOG_FORMAT", "logging", "format"),
];

/// A validated configuration plus the files it was assembled from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final configuration.
    pub config: Config,
    /// Files that contributed a layer, lowest precedence first.
    pub loaded_files: Vec<String>,
}

/// Load the configuration with layered file precedence.
///
/// `explicit` is a config file the caller insists on; unlike the user layer
/// it must exist. `home_override` is treated as the `.tether` directory
/// itself, bypassing home-directory discovery and `TETHER_HOME`.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed or missing when
/// required, or if the merged configuration fails validation.
pub fn load(explicit: Option<&Path>, home_override: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    let env_vars: HashMap<String, String> = std::env::vars()
        .filter(|(key, _)| key.starts_with("TETHER_"))
        .collect();
    load_with_env(explicit, home_override, &env_vars)
}

pub(crate) fn load_with_env(
    explicit: Option<&Path>,
    home_override: Option<&Path>,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<ResolvedConfig> {
    // 1. Parse embedded defaults.
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    let mut loaded_files = Vec::new();

    // 2. User config.
    let user_path = user_config_path(home_override, env_vars)?;
    if let Some(path) = user_path
        && let Some(overlay) = try_load_file(&path)?
    {
        deep_merge(&mut merged, &overlay);
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), "loaded user config");
    }

    // 3. Explicit config.
    if let Some(path) = explicit {
        let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
            path: path.display().to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        deep_merge(&mut merged, &overlay);
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), "loaded explicit config");
    }

    // 4. Environment overrides.
    let env_count = apply_env_overrides(&mut merged, env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable overrides");
    }

    // 5. Deserialize.
    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    // 6. Validate.
    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        loaded_files,
    })
}

/// Load a config from a specific file path (no layering).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })?;
    let config: Config = overlay
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;

    validate::validate(&config)?;
    Ok(config)
}

/// Parse a config from a TOML string layered over the defaults.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the string is not valid TOML or the result
/// fails validation.
pub fn load_str(content: &str) -> ConfigResult<Config> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    let overlay: toml::Value = toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: "<string>".to_owned(),
        source: e,
    })?;
    deep_merge(&mut merged, &overlay);

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<string>".to_owned(),
                source: e,
            })?;
    validate::validate(&config)?;
    Ok(config)
}

fn user_config_path(
    home_override: Option<&Path>,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<Option<PathBuf>> {
    if let Some(h) = home_override {
        return Ok(Some(h.join("config.toml")));
    }
    if let Some(tether_home) = env_vars.get("TETHER_HOME") {
        return Ok(Some(PathBuf::from(tether_home).join("config.toml")));
    }
    let home = home_directory()?;
    Ok(Some(home.join(".tether").join("config.toml")))
}

/// Try to load a file, returning `None` if the file doesn't exist.
///
/// Uses a single read to avoid separate exists/metadata checks.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {} byte limit",
                content.len(),
                MAX_CONFIG_FILE_SIZE
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

fn apply_env_overrides(merged: &mut toml::Value, env_vars: &HashMap<String, String>) -> usize {
    let Some(root) = merged.as_table_mut() else {
        return 0;
    };
    let mut applied = 0usize;
    for (var, section, field) in ENV_OVERRIDES {
        let Some(value) = env_vars.get(*var) else {
            continue;
        };
        let table = root
            .entry((*section).to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
        if let Some(table) = table.as_table_mut() {
            table.insert((*field).to_owned(), toml::Value::String(value.clone()));
            applied = applied.saturating_add(1);
        }
    }
    applied
}

/// Determine the user's home directory.
fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}
