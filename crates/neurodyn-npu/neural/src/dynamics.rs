// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Dynamics capability
//!
//! A model's right-hand side `dy/dt = f(y)` as seen by the adaptive
//! integrator. Implementations are short-lived views borrowing the model's
//! parameters together with the inputs that stay constant over one
//! simulation step (stimulus current, refractory flag), so `f` itself is pure.

use crate::types::NumericalFault;

pub trait Dynamics {
    /// Model name attached to numerical faults
    fn model_name(&self) -> &'static str;

    /// Length of the state vector
    fn dimension(&self) -> usize;

    /// Write `f(y)` into `dydt`. Both slices have length [`Self::dimension`].
    fn derivative(&self, y: &[f64], dydt: &mut [f64]);

    /// Model-specific sanity bounds, checked after every accepted step.
    fn check_state(&self, _y: &[f64]) -> Result<(), NumericalFault> {
        Ok(())
    }
}

/// Fail with [`NumericalFault::Instability`] unless `lower <= value <= upper`.
#[inline]
pub fn within_bounds(
    model: &'static str,
    variable: &'static str,
    value: f64,
    lower: f64,
    upper: f64,
) -> Result<(), NumericalFault> {
    if value >= lower && value <= upper {
        Ok(())
    } else {
        Err(NumericalFault::Instability {
            model,
            variable,
            value,
        })
    }
}
