//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::Ini;

use super::defaults::clamp_worker_pool_size;
use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [container] section
    if let Some(section) = ini.section(Some("container")) {
        if let Some(v) = section.get("name") {
            let v = v.trim();
            if v.is_empty() {
                return Err(invalid("container", "name", v, "must not be empty"));
            }
            config.container.name = v.to_string();
        }
    }

    // [distribution] section
    if let Some(section) = ini.section(Some("distribution")) {
        if let Some(v) = section.get("timeout_secs") {
            let secs: u64 = parse_number("distribution", "timeout_secs", v)?;
            if secs == 0 {
                return Err(invalid("distribution", "timeout_secs", v, "must be at least 1"));
            }
            config.distribution.timeout_secs = secs;
        }
    }

    // [event_loop] section
    if let Some(section) = ini.section(Some("event_loop")) {
        if let Some(v) = section.get("worker_pool_size") {
            let size: usize = parse_number("event_loop", "worker_pool_size", v)?;
            config.event_loop.worker_pool_size = clamp_worker_pool_size(size);
        }
    }

    // [flows] section
    if let Some(section) = ini.section(Some("flows")) {
        if let Some(v) = section.get("preserve_on_node_down") {
            config.flows.preserve_on_node_down = parse_bool("flows", "preserve_on_node_down", v)?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = PathBuf::from(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, "must be a non-negative integer"))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigFileError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(invalid(section, key, value, "must be true or false")),
    }
}
