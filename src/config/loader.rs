//! Configuration Loader
//!
//! Builds a layered [`config::Config`] from an optional configuration file and
//! `PETASOS__`-prefixed environment variables, then resolves the typed
//! [`PetasosConfig`] from it parameter by parameter.

use super::error::{ConfigResult, ConfigurationError};
use super::PetasosConfig;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONFIG_PATH_VARIABLE: &str = "PETASOS_CONFIG_PATH";
const DEFAULT_CONFIG_FILE: &str = "config/petasos.toml";
const ENVIRONMENT_PREFIX: &str = "PETASOS";
const ENVIRONMENT_SEPARATOR: &str = "__";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from `PETASOS_CONFIG_PATH` when set, otherwise from
    /// `config/petasos.toml` when it exists, otherwise from the environment alone.
    pub fn load() -> ConfigResult<PetasosConfig> {
        match env::var(CONFIG_PATH_VARIABLE) {
            Ok(path) => Self::load_from_file(Some(Path::new(&path))),
            Err(_) => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::load_from_file(Some(&default_path))
                } else {
                    Self::load_from_file(None)
                }
            }
        }
    }

    /// Load from an explicit file (TOML, YAML or JSON by extension) layered under
    /// environment overrides. A named file that does not exist is an error.
    pub fn load_from_file(path: Option<&Path>) -> ConfigResult<PetasosConfig> {
        let layered = Self::build_layered(path)?;
        let config = PetasosConfig::from_source(&layered);

        debug!(
            "Configuration resolved: {}",
            serde_json::to_string(&config).unwrap_or_else(|_| "[serialization error]".to_string())
        );
        info!(
            site = %config.node.site,
            zone = %config.node.zone,
            service = %config.node.service,
            config_file = ?path.map(|p| p.display().to_string()),
            "Configuration loaded"
        );

        Ok(config)
    }

    fn build_layered(path: Option<&Path>) -> ConfigResult<config::Config> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigurationError::ConfigFileNotFound {
                    path: path.to_path_buf(),
                });
            }
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENVIRONMENT_PREFIX).separator(ENVIRONMENT_SEPARATOR),
        );

        builder.build().map_err(|e| match path {
            Some(path) => ConfigurationError::file_read_error(path.display().to_string(), e),
            None => ConfigurationError::from(e),
        })
    }
}
