// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Neurodyn Neural Computation
//!
//! ALL per-neuron numerics in one place:
//! - **Types**: steps, ports, spike descriptors and the error taxonomy
//! - **Dynamics**: the derivative capability every nonlinear model implements
//! - **Integrator**: adaptive Dormand-Prince 5(4) stepper with step-size persistence
//! - **Propagator**: closed-form coefficients for linear (exponential/alpha) models
//! - **Firing**: threshold detection, crossing localisation and refractory bookkeeping
//! - **Buffer**: per-neuron delay ring buffers (grid and precise)
//! - **Context**: the narrow clock / spike sink / data sink interfaces
//! - **Models**: concrete neuron models built from the pieces above
//!
//! ## Execution model
//! Every model is updated by exactly one thread per min-delay batch. Nothing in
//! this crate blocks, allocates on the hot path after calibration, or touches
//! global state; the scheduler hands a [`context::UpdateContext`] to each call.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Core type definitions
pub mod types;

// Numerical engines
pub mod dynamics;
pub mod firing;
pub mod integrator;
pub mod propagator;

// Event plumbing
pub mod buffer;
pub mod context;

// Neuron models
pub mod models;

pub use dynamics::Dynamics;
pub use integrator::{DormandPrince, IntegrationStats, Tolerances};
pub use propagator::{AlphaPropagator, ExpPropagator, MembranePropagator};

// Re-export types
pub use types::{
    ConfigurationError, CurrentInput, IllegalConnection, NeuronError, NeuronId, NumericalFault,
    NeuronResult, Port, SpikeEvent, SpikeInput, Step,
};

pub use buffer::{PreciseEvent, RingBuffer, SliceRingBuffer};
pub use context::{Clock, ClockSnapshot, DataSink, SpikeSink, UpdateContext};

// Re-export neuron models
pub use models::{
    AeifCondAlpha, AeifCondAlphaMultisynapse, HhPscAlpha, IafPscAlpha, IafPscExp, IafPscExpPs,
    ModelParameters, NeuronModel,
};
