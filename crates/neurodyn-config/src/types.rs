// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `neurodyn.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NeurodynConfig {
    pub simulation: SimulationConfig,
    pub integrator: IntegratorConfig,
    pub logging: LoggingConfig,
}

/// Global clock settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Step length h (ms)
    pub resolution_ms: f64,
    /// Batch length; inputs can be scheduled at least this far ahead
    pub min_delay_steps: usize,
    /// Scheduling horizon of the input buffers
    pub max_delay_steps: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            resolution_ms: 0.1,
            min_delay_steps: 1,
            max_delay_steps: 100,
        }
    }
}

/// Adaptive integrator tolerances (MAXERR / HMIN)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IntegratorConfig {
    /// Absolute error bound on the membrane potential per internal step (mV)
    pub max_error: f64,
    /// Smallest internal step (ms); a step this small is always accepted
    pub min_step_ms: f64,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            max_error: 1.0e-10,
            min_step_ms: 1.0e-3,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Base directory for per-run log folders
    pub log_dir: PathBuf,
    pub retention_days: u64,
    pub retention_runs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("./logs"),
            retention_days: 30,
            retention_runs: 10,
        }
    }
}
