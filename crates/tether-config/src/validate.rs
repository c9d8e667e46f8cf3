//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_logging(config)?;
    validate_permissions(config)?;
    validate_discovery(config)?;
    validate_loader(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        ));
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        ));
    }

    Ok(())
}

fn validate_permissions(config: &Config) -> ConfigResult<()> {
    let p = &config.permissions;
    for (field, domains) in [
        ("permissions.fetch_domains", &p.fetch_domains),
        ("permissions.embed_domains", &p.embed_domains),
    ] {
        if let Some(bad) = domains
            .iter()
            .find(|d| d.trim().is_empty() || d.contains('/'))
        {
            return Err(invalid(
                field,
                format!("'{bad}' is not a host pattern; use \"*\" or a bare domain"),
            ));
        }
    }
    Ok(())
}

fn validate_discovery(config: &Config) -> ConfigResult<()> {
    let d = &config.discovery;
    for (field, value) in [
        ("discovery.block_editor_member", &d.block_editor_member),
        ("discovery.extension_added_event", &d.extension_added_event),
        ("discovery.tooling_global", &d.tooling_global),
        ("discovery.fiber_root_marker", &d.fiber_root_marker),
    ] {
        if value.trim().is_empty() {
            return Err(invalid(field, "must not be empty"));
        }
    }

    if d.state_markers.is_empty() {
        return Err(invalid(
            "discovery.state_markers",
            "at least one marker is required",
        ));
    }
    if d.state_markers
        .iter()
        .any(|m| m.split('.').any(str::is_empty))
    {
        return Err(invalid(
            "discovery.state_markers",
            "markers must be non-empty dot paths",
        ));
    }
    if d.max_search_depth == Some(0) {
        return Err(invalid(
            "discovery.max_search_depth",
            "depth must be at least 1 when set",
        ));
    }
    Ok(())
}

fn validate_loader(config: &Config) -> ConfigResult<()> {
    let id = &config.loader.container_id;
    if id.is_empty() || id.chars().any(char::is_whitespace) {
        return Err(invalid(
            "loader.container_id",
            "must be a non-empty identifier without whitespace",
        ));
    }
    if config.loader.user_agent.trim().is_empty() {
        return Err(invalid("loader.user_agent", "must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_owned();
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "logging.format"));
    }

    #[test]
    fn test_rejects_empty_marker() {
        let mut config = Config::default();
        config.discovery.fiber_root_marker = "  ".to_owned();
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.discovery.state_markers = vec!["scratchGui..vm".to_owned()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_bad_container_id() {
        let mut config = Config::default();
        config.loader.container_id = "has space".to_owned();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_url_as_domain() {
        let mut config = Config::default();
        config.permissions.fetch_domains = vec!["https://example.com/".to_owned()];
        assert!(validate(&config).is_err());
    }
}
