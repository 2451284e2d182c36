// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, NeurodynConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// File name searched for when no path is given
pub const CONFIG_FILE_NAME: &str = "neurodyn.toml";

/// Find the neurodyn configuration file
///
/// Search order:
/// 1. `NEURODYN_CONFIG_PATH` environment variable
/// 2. Current working directory: `./neurodyn.toml`
/// 3. Parent directories (up to 5 levels)
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("NEURODYN_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by NEURODYN_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.as_path();
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent;
                }
                None => break,
            }
        }
    }

    if let Some(found) = search_paths.iter().find(|p| p.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");
    Err(ConfigError::FileNotFound(format!(
        "Configuration file '{}' not found in any of these locations:\n{}\n\nSet NEURODYN_CONFIG_PATH environment variable to specify custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if config file is not found or contains invalid TOML.
/// Value ranges are checked separately by [`crate::validate_config`].
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<NeurodynConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };
    debug!("Loading configuration from {}", config_file.display());

    let content = fs::read_to_string(&config_file)?;
    let mut config: NeurodynConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    Ok(config)
}

/// Parse `raw` into `target`; unparsable values are logged and ignored
fn set_parsed<T: FromStr>(target: &mut T, source: &str, raw: &str) {
    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => warn!("Ignoring unparsable override {}={}", source, raw),
    }
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `NEURODYN_RESOLUTION_MS` -> `simulation.resolution_ms`
/// - `NEURODYN_MIN_DELAY_STEPS` -> `simulation.min_delay_steps`
/// - `NEURODYN_MAX_DELAY_STEPS` -> `simulation.max_delay_steps`
/// - `NEURODYN_MAX_ERROR` -> `integrator.max_error`
/// - `NEURODYN_MIN_STEP_MS` -> `integrator.min_step_ms`
/// - `NEURODYN_LOG_LEVEL` -> `logging.level`
pub fn apply_environment_overrides(config: &mut NeurodynConfig) {
    if let Ok(value) = env::var("NEURODYN_RESOLUTION_MS") {
        set_parsed(&mut config.simulation.resolution_ms, "NEURODYN_RESOLUTION_MS", &value);
    }
    if let Ok(value) = env::var("NEURODYN_MIN_DELAY_STEPS") {
        set_parsed(&mut config.simulation.min_delay_steps, "NEURODYN_MIN_DELAY_STEPS", &value);
    }
    if let Ok(value) = env::var("NEURODYN_MAX_DELAY_STEPS") {
        set_parsed(&mut config.simulation.max_delay_steps, "NEURODYN_MAX_DELAY_STEPS", &value);
    }
    if let Ok(value) = env::var("NEURODYN_MAX_ERROR") {
        set_parsed(&mut config.integrator.max_error, "NEURODYN_MAX_ERROR", &value);
    }
    if let Ok(value) = env::var("NEURODYN_MIN_STEP_MS") {
        set_parsed(&mut config.integrator.min_step_ms, "NEURODYN_MIN_STEP_MS", &value);
    }
    if let Ok(value) = env::var("NEURODYN_LOG_LEVEL") {
        config.logging.level = value;
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - HashMap of CLI arguments (e.g., `{"resolution_ms": "0.05", "log_level": "debug"}`)
pub fn apply_cli_overrides(config: &mut NeurodynConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("resolution_ms") {
        set_parsed(&mut config.simulation.resolution_ms, "resolution_ms", value);
    }
    if let Some(value) = cli_args.get("min_delay_steps") {
        set_parsed(&mut config.simulation.min_delay_steps, "min_delay_steps", value);
    }
    if let Some(value) = cli_args.get("max_delay_steps") {
        set_parsed(&mut config.simulation.max_delay_steps, "max_delay_steps", value);
    }
    if let Some(value) = cli_args.get("max_error") {
        set_parsed(&mut config.integrator.max_error, "max_error", value);
    }
    if let Some(value) = cli_args.get("min_step_ms") {
        set_parsed(&mut config.integrator.min_step_ms, "min_step_ms", value);
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
    if let Some(value) = cli_args.get("log_dir") {
        config.logging.log_dir = PathBuf::from(value);
    }
}
