//! Configuration validation.
//!
//! Serde handles syntax; this module checks values that deserialize fine but
//! cannot work at runtime. All problems are reported at once.

use std::net::SocketAddr;

use crate::config::schema::AppConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a loaded configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.upstream.domain.trim().is_empty() && config.upstream.base_url.is_none() {
        errors.push(ValidationError::new(
            "upstream.domain",
            "must be set when upstream.base_url is absent",
        ));
    }

    check_url(&mut errors, "upstream.base_url", config.upstream.base_url.as_deref());
    check_url(
        &mut errors,
        "registration.tracking_uri",
        config.registration.tracking_uri.as_deref(),
    );
    check_url(&mut errors, "assist.endpoint", config.assist.endpoint.as_deref());

    for (field, secs) in [
        ("upstream.timeout_secs", config.upstream.timeout_secs),
        ("proxy.timeout_secs", config.proxy.timeout_secs),
        ("registration.upload_timeout_secs", config.registration.upload_timeout_secs),
        ("assist.timeout_secs", config.assist.timeout_secs),
    ] {
        if secs == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new(
            "limits.max_body_bytes",
            "must be greater than zero",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address when metrics are enabled",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: Option<&str>) {
    let Some(value) = value else { return };
    match url::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, e.to_string())),
    }
}
