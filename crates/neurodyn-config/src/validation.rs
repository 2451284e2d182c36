// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Every check runs; all problems are reported together in one
//! `ConfigError::ValidationError`.

use crate::{ConfigError, ConfigResult, NeurodynConfig};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    NotPositive { field: String, value: f64 },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotPositive { field, value } => {
                write!(f, "{} = {} must be positive and finite", field, value)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every failed check
pub fn validate_config(config: &NeurodynConfig) -> ConfigResult<()> {
    let errors = collect_errors(config);
    if errors.is_empty() {
        return Ok(());
    }

    let error_messages = errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n");
    Err(ConfigError::ValidationError(format!(
        "Configuration validation failed:\n{}",
        error_messages
    )))
}

/// All problems found in `config`, in section order
pub fn collect_errors(config: &NeurodynConfig) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();
    validate_simulation(config, &mut errors);
    validate_integrator(config, &mut errors);
    validate_logging(config, &mut errors);
    errors
}

fn require_positive(field: &str, value: f64, errors: &mut Vec<ConfigValidationError>) -> bool {
    if value.is_finite() && value > 0.0 {
        return true;
    }
    errors.push(ConfigValidationError::NotPositive {
        field: field.to_string(),
        value,
    });
    false
}

fn validate_simulation(config: &NeurodynConfig, errors: &mut Vec<ConfigValidationError>) {
    let sim = &config.simulation;
    require_positive("simulation.resolution_ms", sim.resolution_ms, errors);

    if sim.min_delay_steps == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "simulation.min_delay_steps".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    if sim.max_delay_steps < sim.min_delay_steps {
        errors.push(ConfigValidationError::InvalidValue {
            field: "simulation.max_delay_steps".to_string(),
            reason: format!(
                "{} is below min_delay_steps ({})",
                sim.max_delay_steps, sim.min_delay_steps
            ),
        });
    }
}

fn validate_integrator(config: &NeurodynConfig, errors: &mut Vec<ConfigValidationError>) {
    let integrator = &config.integrator;
    require_positive("integrator.max_error", integrator.max_error, errors);
    let min_step_ok = require_positive("integrator.min_step_ms", integrator.min_step_ms, errors);

    let h = config.simulation.resolution_ms;
    if min_step_ok && h.is_finite() && h > 0.0 && integrator.min_step_ms > h {
        errors.push(ConfigValidationError::InvalidValue {
            field: "integrator.min_step_ms".to_string(),
            reason: format!("{} ms exceeds the resolution ({} ms)", integrator.min_step_ms, h),
        });
    }
}

fn validate_logging(config: &NeurodynConfig, errors: &mut Vec<ConfigValidationError>) {
    let logging = &config.logging;
    if !LOG_LEVELS.contains(&logging.level.to_lowercase().as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: format!("'{}' is not one of {}", logging.level, LOG_LEVELS.join(", ")),
        });
    }
    if logging.retention_runs == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.retention_runs".to_string(),
            reason: "must keep at least the current run".to_string(),
        });
    }
}
