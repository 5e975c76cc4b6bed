use crate::config::types::{
    CaptchaConfig, Config, ConversionConfig, RemoteBackend, RemoteConfig, ResponseMarkers,
    RetryConfig, SessionConfig, SourceConfig, StorageConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_source_config(&config.source)?;
    validate_retry_config(&config.retry)?;
    validate_session_config(&config.session)?;
    validate_storage_config(&config.storage)?;
    validate_conversion_config(&config.conversion)?;
    if let Some(remote) = &config.remote {
        validate_remote_config(remote)?;
    }
    validate_captcha_config(&config.captcha)?;
    Ok(())
}

/// Validates the source URLs and response markers
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    validate_http_url("portal-url", &config.portal_url)?;
    validate_http_url("api-base-url", &config.api_base_url)?;

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    for (name, path) in [
        ("draft", &config.endpoints.draft),
        ("final", &config.endpoints.final_roll),
        ("general", &config.endpoints.general),
        ("captcha", &config.endpoints.captcha),
    ] {
        if !path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "endpoint '{}' must start with '/', got '{}'",
                name, path
            )));
        }
    }

    for (name, path) in [
        ("districts", &config.endpoints.districts),
        ("constituencies", &config.endpoints.constituencies),
    ] {
        if !path.contains("{state}") {
            return Err(ConfigError::Validation(format!(
                "endpoint '{}' must contain a {{state}} placeholder, got '{}'",
                name, path
            )));
        }
    }

    validate_markers(&config.markers)
}

fn validate_markers(markers: &ResponseMarkers) -> Result<(), ConfigError> {
    if markers.invalid_captcha.iter().all(|m| m.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "markers.invalid-captcha needs at least one non-empty marker".to_string(),
        ));
    }
    if markers.unpublished.iter().all(|m| m.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "markers.unpublished needs at least one non-empty marker".to_string(),
        ));
    }
    Ok(())
}

/// Validates per-operation retry limits
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 20 {
        return Err(ConfigError::Validation(format!(
            "retry.max-attempts must be between 1 and 20, got {}",
            config.max_attempts
        )));
    }

    if config.initial_delay_ms < 1 {
        return Err(ConfigError::Validation(
            "retry.initial-delay-ms must be >= 1".to_string(),
        ));
    }

    if config.max_captcha_attempts < 1 {
        return Err(ConfigError::Validation(
            "retry.max-captcha-attempts must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates session restart limits
fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 20 {
        return Err(ConfigError::Validation(format!(
            "session.max-attempts must be between 1 and 20, got {}",
            config.max_attempts
        )));
    }

    if config.initial_delay_ms < 1 {
        return Err(ConfigError::Validation(
            "session.initial-delay-ms must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.data_dir.is_empty() {
        return Err(ConfigError::Validation(
            "storage.data-dir cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates conversion queue and pool sizes
fn validate_conversion_config(config: &ConversionConfig) -> Result<(), ConfigError> {
    if config.queue_capacity < 1 || config.queue_capacity > 64 {
        return Err(ConfigError::Validation(format!(
            "conversion.queue-capacity must be between 1 and 64, got {}",
            config.queue_capacity
        )));
    }

    if config.workers < 1 || config.workers > 32 {
        return Err(ConfigError::Validation(format!(
            "conversion.workers must be between 1 and 32, got {}",
            config.workers
        )));
    }

    if config.page_threads > 256 {
        return Err(ConfigError::Validation(format!(
            "conversion.page-threads must be <= 256, got {}",
            config.page_threads
        )));
    }

    Ok(())
}

/// Validates remote storage settings
fn validate_remote_config(config: &RemoteConfig) -> Result<(), ConfigError> {
    validate_bucket_name("raw-bucket", &config.raw_bucket)?;
    validate_bucket_name("pages-bucket", &config.pages_bucket)?;

    if config.raw_bucket == config.pages_bucket {
        return Err(ConfigError::Validation(
            "raw-bucket and pages-bucket must differ".to_string(),
        ));
    }

    match config.backend {
        RemoteBackend::S3 => {
            if let Some(endpoint) = &config.endpoint {
                validate_http_url("remote.endpoint", endpoint)?;
            }
        }
        RemoteBackend::Local => {
            if config.local_root.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::Validation(
                    "remote.local-root is required for the local backend".to_string(),
                ));
            }
        }
    }

    // S3 rejects multipart chunks under 5 MiB
    if config.chunk_size_mb < 5 {
        return Err(ConfigError::Validation(format!(
            "remote.chunk-size-mb must be >= 5, got {}",
            config.chunk_size_mb
        )));
    }

    if config.max_concurrency < 1 || config.max_concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "remote.max-concurrency must be between 1 and 64, got {}",
            config.max_concurrency
        )));
    }

    Ok(())
}

fn validate_captcha_config(config: &CaptchaConfig) -> Result<(), ConfigError> {
    match config.command.first() {
        Some(program) if !program.trim().is_empty() => Ok(()),
        _ => Err(ConfigError::Validation(
            "captcha.command must name a solver program".to_string(),
        )),
    }
}

/// Validates that a value is an absolute http(s) URL
fn validate_http_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {}: {}", name, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            name, value
        )));
    }

    Ok(())
}

/// Basic bucket name validation
fn validate_bucket_name(name: &str, bucket: &str) -> Result<(), ConfigError> {
    if bucket.is_empty() {
        return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
    }

    if !bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(ConfigError::Validation(format!(
            "{} '{}' may only contain lowercase letters, digits, '-' and '.'",
            name, bucket
        )));
    }

    Ok(())
}
