//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{FirebaseJson, FirecloudConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid hosting file {path}: {source}")]
    HostingFile {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<FirecloudConfig, ConfigError> {
    let content = read(path)?;
    let mut config = parse_config(&content)?;

    if let Some(hosting_file) = config.firebase.hosting_file.clone() {
        let hosting_path = match path.parent() {
            Some(dir) if hosting_file.is_relative() => dir.join(&hosting_file),
            _ => hosting_file,
        };
        import_hosting_file(&mut config, &hosting_path)?;
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::info!(
        path = %path.display(),
        project_id = %config.firebase.project_id,
        rewrites = config.firebase.rewrites.len(),
        "Configuration loaded"
    );
    Ok(config)
}

/// Parse TOML without validating.
pub fn parse_config(content: &str) -> Result<FirecloudConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Append the `hosting.rewrites` of a `firebase.json` to the configured ones.
pub fn import_hosting_file(config: &mut FirecloudConfig, path: &Path) -> Result<(), ConfigError> {
    let content = read(path)?;
    let json: FirebaseJson = serde_json::from_str(&content).map_err(|source| ConfigError::HostingFile {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(
        path = %path.display(),
        rewrites = json.hosting.rewrites.len(),
        "Imported hosting rewrites"
    );
    config.firebase.rewrites.extend(json.hosting.rewrites);
    Ok(())
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
