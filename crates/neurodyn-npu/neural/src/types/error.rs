// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for neuron models
//!
//! - [`ConfigurationError`]: recoverable, raised by parameter writes and calibration
//! - [`NumericalFault`]: fatal for the run, raised during an update call
//! - [`IllegalConnection`]: raised when a connection or input cannot be received

/// Invalid parameter combination, detected before a run starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("{name} must be strictly positive (got {value})")]
    NonPositive { name: &'static str, value: f64 },

    #[error("{name} must not be negative (got {value})")]
    Negative { name: &'static str, value: f64 },

    #[error("{name} must be finite (got {value})")]
    NotFinite { name: &'static str, value: f64 },

    #[error("reset potential V_reset = {v_reset} mV must be below threshold {threshold} mV")]
    ResetNotBelowThreshold { v_reset: f64, threshold: f64 },

    #[error("V_peak = {v_peak} mV must not be below V_th = {v_th} mV")]
    PeakBelowThreshold { v_peak: f64, v_th: f64 },

    #[error("{name} = {tau} ms equals tau_m; the closed-form propagator is singular")]
    DegenerateTimeConstants { name: &'static str, tau: f64 },

    #[error("refractory time {t_ref} ms is shorter than one step of {resolution} ms")]
    RefractoryBelowResolution { t_ref: f64, resolution: f64 },

    #[error("refractory time {t_ref} ms is not a multiple of the resolution {resolution} ms")]
    RefractoryNotMultiple { t_ref: f64, resolution: f64 },

    #[error("receptor vectors differ in length: E_rev has {e_rev}, tau_syn has {tau_syn}")]
    ReceptorMismatch { e_rev: usize, tau_syn: usize },

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

impl ConfigurationError {
    /// Reject non-positive or non-finite values
    pub fn require_positive(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
        if !value.is_finite() {
            return Err(ConfigurationError::NotFinite { name, value });
        }
        if value <= 0.0 {
            return Err(ConfigurationError::NonPositive { name, value });
        }
        Ok(())
    }

    /// Reject negative or non-finite values
    pub fn require_non_negative(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
        if !value.is_finite() {
            return Err(ConfigurationError::NotFinite { name, value });
        }
        if value < 0.0 {
            return Err(ConfigurationError::Negative { name, value });
        }
        Ok(())
    }

    pub fn require_finite(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(ConfigurationError::NotFinite { name, value })
        }
    }
}

/// Fatal numerical failure inside an update call.
///
/// Never retried; the scheduler is expected to abort the run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NumericalFault {
    #[error("{model}: numerical instability, {variable} = {value} left its admissible range")]
    Instability {
        model: &'static str,
        variable: &'static str,
        value: f64,
    },

    #[error("{model}: integrator failed to converge ({reason})")]
    NonConvergence { model: &'static str, reason: String },

    #[error("{model}: update called before calibrate")]
    Uncalibrated { model: &'static str },
}

impl NumericalFault {
    /// Name of the model that raised the fault
    pub fn model(&self) -> &'static str {
        match self {
            NumericalFault::Instability { model, .. } => model,
            NumericalFault::NonConvergence { model, .. } => model,
            NumericalFault::Uncalibrated { model } => model,
        }
    }
}

/// Connection or input the model cannot receive.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IllegalConnection {
    #[error("{model} has no receptor port {port} (valid ports: {valid})")]
    UnknownReceptor {
        model: &'static str,
        port: usize,
        valid: String,
    },

    #[error("{model} requires non-negative weights on conductance receptors (got {weight})")]
    NegativeWeight { model: &'static str, weight: f64 },

    #[error("{model} received a spike offset of {offset} ms outside [0, resolution)")]
    OffsetOutOfRange { model: &'static str, offset: f64 },
}

/// Umbrella error for callers handling every fault kind uniformly
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NeuronError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Numerical(#[from] NumericalFault),

    #[error(transparent)]
    IllegalConnection(#[from] IllegalConnection),
}

impl NeuronError {
    /// Numerical faults abort the run; everything else can be corrected
    pub fn is_fatal(&self) -> bool {
        matches!(self, NeuronError::Numerical(_))
    }
}

/// Result type for neuron operations
pub type NeuronResult<T> = core::result::Result<T, NeuronError>;
