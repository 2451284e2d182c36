// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! Core traits shared by all neuron models

use crate::context::{Clock, UpdateContext};
use crate::integrator::Tolerances;
use crate::types::{
    ConfigurationError, CurrentInput, IllegalConnection, NumericalFault, Port, SpikeInput,
};

/// A single neuron as seen by the scheduler.
///
/// ## Call protocol
/// 1. `calibrate(clock)` after construction and after every parameter or
///    resolution change, before the next `update`.
/// 2. `update(ctx, from, to)` once per min-delay batch, covering lags
///    `from..to` relative to `ctx.origin()`.
/// 3. `deliver_spike` / `deliver_current` at any time between updates, for
///    delivery steps not yet drained.
///
/// A [`NumericalFault`] returned from `update` is fatal for the run. The
/// model's committed state is left as it was at the start of the failing
/// step.
pub trait NeuronModel: Send {
    /// Model name (e.g., "iaf_psc_exp")
    fn model_name(&self) -> &'static str;

    /// Rebuild resolution-dependent coefficients and size input buffers
    fn calibrate(&mut self, clock: &dyn Clock) -> Result<(), ConfigurationError>;

    /// Advance through lags `from..to` of the current batch
    fn update(
        &mut self,
        ctx: &mut UpdateContext<'_>,
        from: usize,
        to: usize,
    ) -> Result<(), NumericalFault>;

    /// Check whether a connection may target `port`
    fn handles_port(&self, port: Port) -> Result<(), IllegalConnection>;

    /// Buffer an incoming spike for its delivery step
    fn deliver_spike(&mut self, spike: &SpikeInput) -> Result<(), IllegalConnection>;

    /// Buffer an injected current for its delivery step
    fn deliver_current(&mut self, current: &CurrentInput) -> Result<(), IllegalConnection>;

    /// Current state vector; component 0 is always the membrane potential
    fn state_vector(&self) -> &[f64];

    /// Overwrite the state vector (same length and order as [`Self::state_vector`])
    fn set_state_vector(&mut self, values: &[f64]) -> Result<(), ConfigurationError>;

    /// Names of the state vector components, in order
    fn state_labels(&self) -> Vec<String>;

    /// Whether emitted spikes carry sub-step offsets
    fn is_precise(&self) -> bool {
        false
    }

    /// Integrator tolerances; `None` for models solved by exact propagation
    fn tolerances(&self) -> Option<Tolerances> {
        None
    }

    /// Replace the integrator tolerances. Takes effect at the next
    /// `calibrate`; exactly solved models ignore it.
    fn set_tolerances(&mut self, _tolerances: Tolerances) -> Result<(), ConfigurationError> {
        Ok(())
    }
}

/// Validated parameter record of a model
pub trait ModelParameters {
    /// Check internal consistency. Resolution-dependent checks happen at calibration.
    fn validate(&self) -> Result<(), ConfigurationError>;
}

/// Port check for models with a single input channel (port 0)
pub(crate) fn single_port(model: &'static str, port: Port) -> Result<(), IllegalConnection> {
    if port == Port::DEFAULT {
        Ok(())
    } else {
        Err(IllegalConnection::UnknownReceptor {
            model,
            port: port.0,
            valid: "0".to_string(),
        })
    }
}

/// Copy a caller-supplied state after checking its length and finiteness
pub(crate) fn assign_state(dst: &mut [f64], src: &[f64]) -> Result<(), ConfigurationError> {
    if dst.len() != src.len() {
        return Err(ConfigurationError::InvalidValue {
            name: "state",
            reason: format!("expected {} components, got {}", dst.len(), src.len()),
        });
    }
    for value in src {
        ConfigurationError::require_finite("state", *value)?;
    }
    dst.copy_from_slice(src);
    Ok(())
}
