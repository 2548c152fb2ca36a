//! Subcommand handlers.

pub mod config_cmd;
pub mod run;

use std::path::PathBuf;

use dropminer_config::Config;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Settings file in effect: `--config` or the platform default.
pub fn settings_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(dropminer_config::config_path)
}

/// Load and validate the settings file in effect.
pub fn load_settings(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = settings_path(global);
    dropminer_config::load_config_from(&path).map_err(|source| CliError::Config {
        path: path.display().to_string(),
        source,
    })
}
