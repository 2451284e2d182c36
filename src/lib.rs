// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # neurodyn
//!
//! Per-neuron ODE core for spiking network simulation.
//!
//! This umbrella crate re-exports the workspace members and wires the
//! configuration file into the runner and the logging layer.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! neurodyn = "0.1"
//! ```
//!
//! ```rust,no_run
//! use neurodyn::prelude::*;
//!
//! let config = neurodyn::config::load_config(None, None)?;
//! neurodyn::init_console_from_config(&config)?;
//!
//! let mut sim = neurodyn::simulation_from_config(&config)?;
//! // Adaptive models pick up the `[integrator]` tolerances when added
//! let id = sim.add_neuron(Box::new(AeifCondAlpha::new()));
//! sim.deliver_spike(id, SpikeInput::new(10, 20.0))?;
//! sim.simulate(1000)?;
//! println!("{} spikes", sim.spikes().spikes_of(id).count());
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: neurodyn-config                            │
//! │  (neurodyn.toml + environment + CLI overrides)          │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Numerics: neurodyn-npu-neural                          │
//! │  (integrator, propagators, firing, buffers, models)     │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Runner: neurodyn-npu-runtime                           │
//! │  (clock, min-delay batches, recorders)                  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! `neurodyn-observability` sits beside all three and only installs the
//! `tracing` subscriber.
//!
//! ## License
//!
//! Apache-2.0

pub use neurodyn_config as config;
pub use neurodyn_npu_neural as neural;
pub use neurodyn_npu_runtime as runtime;
pub use neurodyn_observability as observability;

use anyhow::Context;
use neurodyn_config::NeurodynConfig;
use neurodyn_npu_neural::Tolerances;
use neurodyn_npu_runtime::{Simulation, SimulationSettings};

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::neural::models::*;
    pub use crate::neural::{
        Clock, ConfigurationError, CurrentInput, IllegalConnection, NeuronError, NeuronId,
        NumericalFault, Port, SpikeEvent, SpikeInput, Step, Tolerances,
    };
    pub use crate::runtime::{Multimeter, RuntimeError, Simulation, SimulationSettings, SpikeRecorder};
}

/// Runner settings described by a configuration
pub fn simulation_settings(config: &NeurodynConfig) -> SimulationSettings {
    SimulationSettings {
        resolution_ms: config.simulation.resolution_ms,
        min_delay_steps: config.simulation.min_delay_steps,
        max_delay_steps: config.simulation.max_delay_steps,
        tolerances: Tolerances::new(config.integrator.max_error, config.integrator.min_step_ms),
    }
}

/// Logging settings described by a configuration
pub fn logging_config(config: &NeurodynConfig) -> observability::LoggingConfig {
    observability::LoggingConfig {
        level: config.logging.level.clone(),
        log_dir: config.logging.log_dir.clone(),
        retention_days: config.logging.retention_days,
        retention_runs: config.logging.retention_runs,
        ..Default::default()
    }
}

/// Validate `config` and build an empty simulation from it.
///
/// Neurons added to it integrate with the `[integrator]` tolerances.
pub fn simulation_from_config(config: &NeurodynConfig) -> anyhow::Result<Simulation> {
    neurodyn_config::validate_config(config).context("Invalid neurodyn configuration")?;
    let sim = Simulation::new(simulation_settings(config))?;
    Ok(sim)
}

/// Install console logging at the configured level plus `--debug-*` flags
pub fn init_console_from_config(config: &NeurodynConfig) -> anyhow::Result<()> {
    let flags = observability::parse_debug_flags();
    observability::init_console_logging(&flags, &logging_config(config))?;
    tracing::debug!("neurodyn {} logging initialised", env!("CARGO_PKG_VERSION"));
    Ok(())
}

/// Install console and per-run file logging; keep the guard alive for the run
#[cfg(feature = "file-logging")]
pub fn init_logging_from_config(
    config: &NeurodynConfig,
) -> anyhow::Result<observability::LoggingGuard> {
    let flags = observability::parse_debug_flags();
    observability::init_logging(&flags, &logging_config(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_follow_config() {
        let mut config = NeurodynConfig::default();
        config.simulation.resolution_ms = 0.05;
        config.simulation.min_delay_steps = 3;
        config.integrator.max_error = 1e-8;

        let settings = simulation_settings(&config);
        assert_eq!(settings.resolution_ms, 0.05);
        assert_eq!(settings.min_delay_steps, 3);
        assert_eq!(settings.max_delay_steps, 100);
        assert_eq!(settings.tolerances, Tolerances::new(1e-8, 1e-3));
    }

    #[test]
    fn test_logging_config_copies_fields() {
        let mut config = NeurodynConfig::default();
        config.logging.level = "debug".to_string();
        config.logging.retention_runs = 2;

        let logging = logging_config(&config);
        assert_eq!(logging.level, "debug");
        assert_eq!(logging.retention_runs, 2);
        assert!(!logging.show_target);
    }

    #[test]
    fn test_invalid_config_rejected_before_run() {
        let mut config = NeurodynConfig::default();
        config.integrator.min_step_ms = 1.0;
        assert!(simulation_from_config(&config).is_err());

        let sim = simulation_from_config(&NeurodynConfig::default()).unwrap();
        assert!(sim.is_empty());
    }
}
