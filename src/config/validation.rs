use crate::config::types::{
    Config, DispatchConfig, FetcherConfig, PolicyConfig, SeedEntry, StoreConfig,
};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_store_config(&config.store)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_dispatch_config(&config.dispatch)?;
    validate_policy_config(&config.policy)?;
    validate_seeds(&config.seed)?;
    Ok(())
}

fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 || config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "fetcher timeouts must be >= 1 second".to_string(),
        ));
    }

    Ok(())
}

fn validate_dispatch_config(config: &DispatchConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.select_interval_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "select_interval_secs must be >= 1, got {}",
            config.select_interval_secs
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    Ok(())
}

fn validate_policy_config(config: &PolicyConfig) -> Result<(), ConfigError> {
    if config.fetchable_schemes.is_empty() {
        return Err(ConfigError::Validation(
            "fetchable_schemes must name at least one scheme".to_string(),
        ));
    }

    for scheme in &config.fetchable_schemes {
        validate_scheme_name(scheme)?;
    }

    for pattern in &config.excluded_hosts {
        validate_host_pattern(pattern)?;
    }

    if config.sweep_batch < 1 {
        return Err(ConfigError::Validation(
            "sweep_batch must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_seeds(seeds: &[SeedEntry]) -> Result<(), ConfigError> {
    for seed in seeds {
        crate::url::parse(&seed.url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL: {}", e)))?;
    }
    Ok(())
}

/// Scheme names are compared against canonical (lowercase) schemes
fn validate_scheme_name(scheme: &str) -> Result<(), ConfigError> {
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+-.".contains(c));

    if !valid {
        return Err(ConfigError::Validation(format!(
            "scheme '{}' must be lowercase ASCII (e.g. 'http')",
            scheme
        )));
    }

    Ok(())
}

/// Validates a host pattern (supports a leading `*.` wildcard)
fn validate_host_pattern(pattern: &str) -> Result<(), ConfigError> {
    let host = pattern.strip_prefix("*.").unwrap_or(pattern);

    if host.is_empty() {
        return Err(ConfigError::InvalidPattern(format!(
            "Host pattern '{}' is empty",
            pattern
        )));
    }

    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host pattern '{}' contains invalid characters",
            pattern
        )));
    }

    if host.starts_with('.') || host.ends_with('.') || host.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Host pattern '{}' has an empty label",
            pattern
        )));
    }

    Ok(())
}
