//! Configuration Error Types
//!
//! Only the loading of a configuration *file* can fail. Individual parameters
//! never raise; they fall back to their compiled-in defaults.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// An explicitly requested configuration file does not exist
    #[error("Configuration file not found: {path:?}")]
    ConfigFileNotFound { path: PathBuf },

    /// File I/O or syntax errors while building the layered configuration
    #[error("Failed to read configuration file '{file_path}': {error}")]
    FileReadError { file_path: String, error: String },

    /// Errors raised by the layered configuration builder itself
    #[error("Failed to build configuration: {0}")]
    BuildError(String),
}

impl ConfigurationError {
    pub fn file_read_error(file_path: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::FileReadError {
            file_path: file_path.into(),
            error: error.to_string(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(error: config::ConfigError) -> Self {
        Self::BuildError(error.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
