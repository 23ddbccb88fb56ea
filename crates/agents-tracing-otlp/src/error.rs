//! Error types for configuring and installing the exporter.

use crate::exporter::ExportError;
use thiserror::Error;

/// A specialised Result type for configuration and setup operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading configuration or building the exporter.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration could not be loaded or extracted.
    #[error("configuration error")]
    Config(#[source] Box<figment::Error>),

    /// The exporter could not be built from the loaded configuration.
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Config(Box::new(err))
    }
}
