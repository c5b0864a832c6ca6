//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid environment variable {name}: {message}")]
    Env { name: &'static str, message: String },
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: optional TOML file, then process environment, then validate.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_file(path)?,
        None => AppConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn parse_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Apply the deployment environment on top of file configuration.
///
/// Empty values are ignored so an unset variable in a container spec does not
/// clobber the file.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(domain) = get("DOMINO_DOMAIN") {
        config.upstream.domain = domain;
    }
    if let Some(key) = get("DOMINO_USER_API_KEY") {
        config.upstream.api_key = key;
    }
    if let Some(project) = get("DOMINO_PROJECT_ID") {
        config.upstream.project_id = project;
    }
    if let Some(path) = get("DOMINO_RUN_HOST_PATH") {
        config.upstream.run_host_path = path;
    }
    if let Some(uri) = get("MLFLOW_TRACKING_URI") {
        config.registration.tracking_uri = Some(uri);
    }
    if let Some(port) = get("PORT") {
        let port: u16 = port.trim().parse().map_err(|_| ConfigError::Env {
            name: "PORT",
            message: format!("'{}' is not a port number", port),
        })?;
        config.listener.set_port(port);
    }

    Ok(())
}
