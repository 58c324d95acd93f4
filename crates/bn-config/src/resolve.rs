//! Configuration resolution.
//!
//! Order of precedence: explicit CLI path, then the `BNET_CONFIG` environment
//! variable, then built-in defaults.

use std::path::{Path, PathBuf};

use crate::engine::EngineConfig;
use crate::validate::ValidationError;

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "BNET_CONFIG";

/// Where the resolved configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Cli(PathBuf),
    Env(PathBuf),
    Defaults,
}

/// Resolve the engine configuration from CLI → env → defaults.
pub fn resolve_config(
    cli_path: Option<&Path>,
) -> Result<(EngineConfig, ConfigSource), ValidationError> {
    let env_path = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
    resolve_from(cli_path, env_path)
}

fn resolve_from(
    cli_path: Option<&Path>,
    env_path: Option<PathBuf>,
) -> Result<(EngineConfig, ConfigSource), ValidationError> {
    if let Some(path) = cli_path {
        let config = EngineConfig::from_file(path)?;
        return Ok((config, ConfigSource::Cli(path.to_path_buf())));
    }
    if let Some(path) = env_path.filter(|p| !p.as_os_str().is_empty()) {
        let config = EngineConfig::from_file(&path)?;
        return Ok((config, ConfigSource::Env(path)));
    }
    Ok((EngineConfig::default(), ConfigSource::Defaults))
}
