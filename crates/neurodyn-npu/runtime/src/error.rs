// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for runtime operations

use neurodyn_npu_neural::{ConfigurationError, IllegalConnection, NeuronId, NumericalFault, Step};
use thiserror::Error;

/// Runtime errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// Clock or batch settings rejected
    #[error("Invalid simulation settings: {0}")]
    InvalidSettings(String),

    /// No neuron with this id
    #[error("Unknown neuron: {0}")]
    UnknownNeuron(NeuronId),

    /// A neuron refused its parameters at calibration
    #[error("{neuron} failed to calibrate: {source}")]
    Calibration {
        /// Offending neuron
        neuron: NeuronId,
        /// Underlying cause
        #[source]
        source: ConfigurationError,
    },

    /// Input refused by the receiving neuron
    #[error("{neuron} rejected input: {source}")]
    Connection {
        /// Receiving neuron
        neuron: NeuronId,
        /// Underlying cause
        #[source]
        source: IllegalConnection,
    },

    /// Input scheduled for a step that has already been simulated
    #[error("{neuron}: delivery step {step} is before the current step {current}")]
    LateDelivery {
        /// Receiving neuron
        neuron: NeuronId,
        /// Requested delivery step
        step: Step,
        /// First step not yet simulated
        current: Step,
    },

    /// Fatal numerical fault; the run is aborted
    #[error("{neuron} aborted the batch starting at step {batch_origin}: {source}")]
    Numerical {
        /// Failing neuron
        neuron: NeuronId,
        /// First step of the failing batch
        batch_origin: Step,
        /// Underlying cause
        #[source]
        source: NumericalFault,
    },

    /// A previous numerical fault ended the run
    #[error("Simulation was aborted by an earlier numerical fault")]
    Aborted,
}

impl RuntimeError {
    /// Numerical faults end the run; everything else can be corrected and retried
    pub fn is_fatal(&self) -> bool {
        matches!(self, RuntimeError::Numerical { .. } | RuntimeError::Aborted)
    }
}

/// Result type for runtime operations
pub type Result<T> = core::result::Result<T, RuntimeError>;
