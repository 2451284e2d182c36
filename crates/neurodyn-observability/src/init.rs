// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Unified logging initialization for neurodyn
//!
//! Console logging is always available. With the `file-logging` feature,
//! each run additionally gets a timestamped folder of log files with
//! retention cleanup.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::cli::CrateDebugFlags;
use crate::config::LoggingConfig;

const RUN_PREFIX: &str = "run_";
const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Filter combining the configured default level with per-crate debug flags
pub fn build_filter(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<EnvFilter> {
    let directives = debug_flags.to_filter_string(&config.level.to_lowercase());
    EnvFilter::try_new(&directives)
        .map_err(|e| anyhow!("Invalid log filter '{}': {}", directives, e))
}

/// Install a console subscriber
///
/// # Errors
/// Fails if the filter is invalid or a global subscriber is already set.
pub fn init_console_logging(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(debug_flags, config)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.show_target)
        .try_init()
        .map_err(|e| anyhow!("Failed to install console logger: {}", e))
}

/// Logging initialization result
#[cfg(feature = "file-logging")]
pub struct LoggingGuard {
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: PathBuf,
}

#[cfg(feature = "file-logging")]
impl LoggingGuard {
    /// Get the log directory path of this run
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

/// Initialize console logging plus per-run log files
///
/// Creates a timestamped folder structure:
/// ```text
/// ./logs/
///   └── run_20250101_120000/
///       ├── neurodyn-npu-neural.log
///       ├── neurodyn-npu-runtime.log
///       └── neurodyn.log (combined)
/// ```
#[cfg(feature = "file-logging")]
pub fn init_logging(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<LoggingGuard> {
    use anyhow::Context;
    use tracing_appender::rolling;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{Layer, Registry};

    let run_folder = create_run_folder(&config.log_dir, Utc::now())?;
    let removed = cleanup_old_logs(&config.log_dir, config.retention_days, config.retention_runs)
        .context("Failed to apply log retention")?;

    let env_filter = build_filter(debug_flags, config)?;
    let mut layers = Vec::new();
    let mut file_guards = Vec::new();

    // Console layer (human-readable)
    layers.push(
        tracing_subscriber::fmt::layer()
            .with_target(config.show_target)
            .with_filter(env_filter)
            .boxed(),
    );

    // File layers - one per crate
    for crate_name in crate::KNOWN_CRATES {
        let file_appender = rolling::daily(&run_folder, format!("{}.log", crate_name));
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        file_guards.push(guard);

        let target = crate_name.replace('-', "_");
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(EnvFilter::try_new(format!("off,{}=debug", target))?)
                .boxed(),
        );
    }

    // Combined log file (all crates)
    let combined_appender = rolling::daily(&run_folder, "neurodyn.log");
    let (combined_non_blocking, combined_guard) = tracing_appender::non_blocking(combined_appender);
    file_guards.push(combined_guard);
    layers.push(
        tracing_subscriber::fmt::layer()
            .with_writer(combined_non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_filter(build_filter(debug_flags, config)?)
            .boxed(),
    );

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow!("Failed to install file logger: {}", e))?;

    tracing::info!(
        "Logging to {} ({} old run folders removed)",
        run_folder.display(),
        removed
    );

    Ok(LoggingGuard {
        _file_guards: file_guards,
        log_dir: run_folder,
    })
}

/// Create `base/run_<timestamp>` for a run starting at `now`
pub fn create_run_folder(base_log_dir: &Path, now: DateTime<Utc>) -> Result<PathBuf> {
    let run_folder = base_log_dir.join(format!(
        "{}{}",
        RUN_PREFIX,
        now.format(RUN_TIMESTAMP_FORMAT)
    ));
    std::fs::create_dir_all(&run_folder)
        .map_err(|e| anyhow!("Failed to create log directory {}: {}", run_folder.display(), e))?;
    Ok(run_folder)
}

fn run_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let name = path.file_name()?.to_str()?;
    let stamp = name.strip_prefix(RUN_PREFIX)?;
    let naive = NaiveDateTime::parse_from_str(stamp, RUN_TIMESTAMP_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Delete run folders older than `retention_days`, then all but the newest
/// `retention_runs`. Returns the number of folders removed.
pub fn cleanup_old_logs(
    base_log_dir: &Path,
    retention_days: u64,
    retention_runs: usize,
) -> Result<usize> {
    if !base_log_dir.exists() {
        return Ok(0);
    }
    let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);

    let mut runs: Vec<(PathBuf, DateTime<Utc>)> = Vec::new();
    for entry in std::fs::read_dir(base_log_dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if let Some(stamp) = run_timestamp(&path) {
                runs.push((path, stamp));
            }
        }
    }
    // Newest first
    runs.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (index, (path, stamp)) in runs.iter().enumerate() {
        if *stamp < cutoff || index >= retention_runs {
            match std::fs::remove_dir_all(path) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    "Failed to remove old log directory {}: {}",
                    path.display(),
                    e
                ),
            }
        }
    }
    Ok(removed)
}
