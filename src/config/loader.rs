//! Configuration loading from files (std only).

use core::fmt::Write;
use std::fs;
use std::path::Path;

use crate::error::{ConfigError, Error, Result};

use super::{validate_config, EngineConfig};

/// Load and validate a machine configuration from a TOML file.
///
/// # Errors
///
/// Returns an error naming the file if it cannot be read, or a parse or
/// validation error for its contents.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|err| {
        let mut msg = heapless::String::<128>::new();
        let _ = write!(msg, "{}: {}", path.display(), err);
        ConfigError::IoError(msg)
    })?;

    parse_config(&raw)
}

/// Parse and validate a machine configuration from a TOML string.
///
/// Missing sections fall back to the same defaults as
/// [`EngineConfig::default`], so a partial file describing only the
/// non-standard axes is enough.
///
/// # Errors
///
/// Returns an error if the TOML is invalid or the parsed configuration
/// fails [`validate_config`].
pub fn parse_config(raw: &str) -> Result<EngineConfig> {
    match toml::from_str::<EngineConfig>(raw) {
        Ok(config) => {
            validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let mut msg = heapless::String::<128>::new();
            let _ = write!(msg, "{}", err.message());
            Err(Error::Config(ConfigError::ParseError(msg)))
        }
    }
}
