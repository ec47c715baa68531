use crate::config::types::{CanvasConfig, Config, ExtractionConfig, OutputConfig, RetryConfig};
use crate::ConfigError;
use url::Url;

/// Canvas rejects page sizes above this value
const MAX_PER_PAGE: u32 = 100;

/// Upper bound for the base transport backoff (one minute)
const MAX_TRANSPORT_BACKOFF_MS: u64 = 60_000;

/// Upper bound for a run deadline (one week)
const MAX_DEADLINE_SECS: u64 = 7 * 24 * 60 * 60;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_canvas_config(&config.canvas)?;
    validate_retry_config(&config.retry)?;
    validate_extraction_config(&config.extraction)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the Canvas connection parameters
fn validate_canvas_config(config: &CanvasConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.host)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid host '{}': {}", config.host, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Host '{}' must use http or https",
            config.host
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "Host '{}' has no host component",
            config.host
        )));
    }

    validate_account_id(&config.account_id)?;

    if config.per_page < 1 || config.per_page > MAX_PER_PAGE {
        return Err(ConfigError::Validation(format!(
            "per_page must be between 1 and {}, got {}",
            MAX_PER_PAGE, config.per_page
        )));
    }

    if config.bearer_token.is_none() && config.token_env.is_empty() {
        return Err(ConfigError::Validation(
            "either bearer_token or token_env must be set".to_string(),
        ));
    }

    Ok(())
}

/// Account ids end up inside URL paths
fn validate_account_id(account_id: &str) -> Result<(), ConfigError> {
    if account_id.is_empty() {
        return Err(ConfigError::Validation(
            "account_id cannot be empty".to_string(),
        ));
    }

    if !account_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ':')
    {
        return Err(ConfigError::Validation(format!(
            "account_id contains invalid characters: '{}'",
            account_id
        )));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.transport_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "transport_retries must be <= 10, got {}",
            config.transport_retries
        )));
    }

    if config.transport_backoff_ms > MAX_TRANSPORT_BACKOFF_MS {
        return Err(ConfigError::Validation(format!(
            "transport_backoff_ms must be <= {}, got {}",
            MAX_TRANSPORT_BACKOFF_MS, config.transport_backoff_ms
        )));
    }

    Ok(())
}

fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_endpoints < 1 {
        return Err(ConfigError::Validation(
            "max_concurrent_endpoints must be >= 1".to_string(),
        ));
    }

    if config.endpoint_retries > 5 {
        return Err(ConfigError::Validation(format!(
            "endpoint_retries must be <= 5, got {}",
            config.endpoint_retries
        )));
    }

    match config.deadline_secs {
        Some(0) => {
            return Err(ConfigError::Validation(
                "deadline_secs must be > 0 when set".to_string(),
            ))
        }
        Some(secs) if secs > MAX_DEADLINE_SECS => {
            return Err(ConfigError::Validation(format!(
                "deadline_secs must be <= {}, got {}",
                MAX_DEADLINE_SECS, secs
            )))
        }
        _ => {}
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
