//! Loading the configuration file.

use std::path::Path;

use ini::Ini;
use thiserror::Error;

use super::settings::ConfigFile;

/// Conventional file name of the manager configuration.
pub const CONFIG_FILE_NAME: &str = "frm.ini";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigFile {
    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Load `frm.ini` from `dir`, falling back to defaults when absent.
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigFileError> {
        Self::load_from(&dir.join(CONFIG_FILE_NAME))
    }
}
