// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Adaptive-step integration
//!
//! Embedded Runge-Kutta integration for the nonlinear models. The stepper
//! keeps its internal step size between simulation steps and only ever
//! shortens it to land exactly on the end of the current interval.

pub mod dormand_prince;

pub use dormand_prince::DormandPrince;

use crate::types::ConfigurationError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Error-control settings of the adaptive stepper
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Tolerances {
    /// Admissible local error of the membrane potential (mV)
    pub max_error: f64,
    /// Smallest internal step (ms); steps at this size are always accepted
    pub min_step: f64,
}

impl Tolerances {
    pub const DEFAULT_MAX_ERROR: f64 = 1.0e-10;
    pub const DEFAULT_MIN_STEP: f64 = 1.0e-3;

    pub fn new(max_error: f64, min_step: f64) -> Self {
        Self {
            max_error,
            min_step,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        ConfigurationError::require_positive("MAXERR", self.max_error)?;
        ConfigurationError::require_positive("HMIN", self.min_step)?;
        Ok(())
    }
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            max_error: Self::DEFAULT_MAX_ERROR,
            min_step: Self::DEFAULT_MIN_STEP,
        }
    }
}

/// Attempt counters of one integration call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegrationStats {
    pub accepted: usize,
    pub rejected: usize,
}
