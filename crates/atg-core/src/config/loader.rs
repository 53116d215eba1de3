//! TOML loading for [`AtgConfig`](super::AtgConfig), grounded on
//! `clnrm-core/src/config/loader.rs`'s single-pass parse-then-validate
//! idiom (its template-rendering machinery does not apply here: this
//! driver has nothing to template, just flag defaults to read once).

use std::path::Path;

use super::AtgConfig;
use crate::error::{AtgError, Result};

/// Reads and parses a config file. Missing file is a configuration
/// error, not a silent default, since the caller only calls this when
/// `--config_py` (or equivalent) was given explicitly.
pub fn load_from_path(path: &Path) -> Result<AtgConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| AtgError::io(path, e).with_context("reading config file"))?;
    toml::from_str(&contents)
        .map_err(|e| AtgError::configuration(format!("invalid config file {}: {e}", path.display())))
}
