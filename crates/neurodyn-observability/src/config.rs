// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Observability configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    pub level: String,

    /// Base directory for per-run log folders
    pub log_dir: PathBuf,

    /// Run folders older than this are deleted
    pub retention_days: u64,

    /// At most this many run folders are kept
    pub retention_runs: usize,

    /// Print the event target (module path) on the console
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            log_dir: PathBuf::from("./logs"),
            retention_days: 30,
            retention_runs: 10,
            show_target: false,
        }
    }
}
