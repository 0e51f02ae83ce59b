use crate::config::types::{Config, CrawlerConfig, IndexConfig, OutputConfig, TargetConfig, TorConfig};
use crate::ConfigError;
use std::net::SocketAddr;
use url::Url;

/// Upper bound on concurrent sessions; each one holds its own circuit
const MAX_WORKERS: u32 = 32;

/// Upper bound on attempts for a single search page
const MAX_PAGE_RETRY_CEILING: u32 = 10;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_target_config(&config.target)?;
    validate_tor_config(&config.tor)?;
    validate_output_config(&config.output)?;
    if let Some(index) = &config.index {
        validate_index_config(index)?;
    }
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and {}, got {}",
            MAX_WORKERS, config.workers
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.page_retry_ceiling < 1 || config.page_retry_ceiling > MAX_PAGE_RETRY_CEILING {
        return Err(ConfigError::Validation(format!(
            "page_retry_ceiling must be between 1 and {}, got {}",
            MAX_PAGE_RETRY_CEILING, config.page_retry_ceiling
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    Ok(())
}

/// Validates the target endpoints
fn validate_target_config(config: &TargetConfig) -> Result<(), ConfigError> {
    let base = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use http or https",
            config.base_url
        )));
    }

    for (name, path) in [
        ("products_path", &config.products_path),
        ("search_path", &config.search_path),
    ] {
        if !path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "{} must start with '/', got '{}'",
                name, path
            )));
        }
    }

    if config.category_marker.trim().is_empty() {
        return Err(ConfigError::Validation(
            "category_marker cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates Tor addresses (only when Tor is in use)
fn validate_tor_config(config: &TorConfig) -> Result<(), ConfigError> {
    if !config.enabled {
        return Ok(());
    }

    for (name, addr) in [
        ("socks_addr", &config.socks_addr),
        ("control_addr", &config.control_addr),
    ] {
        addr.parse::<SocketAddr>().map_err(|e| {
            ConfigError::Validation(format!("{} '{}' is not a socket address: {}", name, addr, e))
        })?;
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.json_dir.is_empty() {
        return Err(ConfigError::Validation(
            "json_dir cannot be empty".to_string(),
        ));
    }

    if config.datasheet_path.is_empty() {
        return Err(ConfigError::Validation(
            "datasheet_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates index configuration
fn validate_index_config(config: &IndexConfig) -> Result<(), ConfigError> {
    Url::parse(&config.host)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid index host: {}", e)))?;

    if config.index_uid.is_empty() {
        return Err(ConfigError::Validation(
            "index_uid cannot be empty".to_string(),
        ));
    }

    Ok(())
}
