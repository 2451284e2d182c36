// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Exact propagators for linear subthreshold dynamics
//!
//! Between events, the current-based integrate-and-fire models are linear
//! and time invariant, so one step of length `h` is a fixed matrix-vector
//! product:
//!
//! ```text
//! Membrane (V relative to E_L, constant input I):
//!     dV/dt = -V/τm + (I + I_syn)/C
//!     V(h)  = P33·V + P30·I + (synaptic coupling terms)
//!     P33   = exp(-h/τm)
//!     P30   = τm/C · (1 - exp(-h/τm))
//!
//! Exponential kernel:
//!     dI/dt = -I/τs
//!     P11   = exp(-h/τs)
//!     P21   = (exp(-h/τm) - exp(-h/τs)) / (C (1/τs - 1/τm))      I → V
//!
//! Alpha kernel (dI' = -I'/τs, dI = I' - I/τs):
//!     P11 = P22 = exp(-h/τs)
//!     P21 = h·exp(-h/τs)                                          I' → I
//!     P32 = (exp(-h/τm) - exp(-h/τs)) / (C Δ)                     I  → V
//!     P31 = (P32 - h·exp(-h/τs)/C) / Δ                            I' → V
//!     Δ   = 1/τs - 1/τm
//! ```
//!
//! The coupling terms are singular for `τs == τm`; construction rejects that
//! combination instead of producing NaN. Differences of exponentials are
//! evaluated with `expm1` to limit cancellation when `τs` is close to `τm`.

use crate::types::ConfigurationError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Leaky membrane driven by a constant current
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MembranePropagator {
    /// P33
    pub decay: f64,
    /// P30
    pub input: f64,
}

impl MembranePropagator {
    pub fn new(tau_m: f64, c_m: f64, h: f64) -> Result<Self, ConfigurationError> {
        ConfigurationError::require_positive("tau_m", tau_m)?;
        ConfigurationError::require_positive("C_m", c_m)?;
        ConfigurationError::require_positive("resolution", h)?;
        Ok(Self::compute(tau_m, c_m, h))
    }

    pub(crate) fn compute(tau_m: f64, c_m: f64, h: f64) -> Self {
        let decay_m1 = (-h / tau_m).exp_m1();
        Self {
            decay: decay_m1 + 1.0,
            input: -tau_m / c_m * decay_m1,
        }
    }

    /// Membrane potential (relative to E_L) after one interval
    #[inline]
    pub fn advance(&self, v_rel: f64, current: f64) -> f64 {
        self.decay * v_rel + self.input * current
    }
}

/// Single-exponential synaptic current and its coupling into the membrane
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExpPropagator {
    /// P11: `exp(-h/τs)`
    pub decay: f64,
    /// P21: contribution of the current to the membrane potential
    pub coupling: f64,
}

impl ExpPropagator {
    pub fn new(tau_syn: f64, tau_m: f64, c_m: f64, h: f64) -> Result<Self, ConfigurationError> {
        ConfigurationError::require_positive("tau_syn", tau_syn)?;
        ConfigurationError::require_positive("tau_m", tau_m)?;
        ConfigurationError::require_positive("C_m", c_m)?;
        ConfigurationError::require_positive("resolution", h)?;
        if tau_syn == tau_m {
            return Err(ConfigurationError::DegenerateTimeConstants {
                name: "tau_syn",
                tau: tau_syn,
            });
        }
        Ok(Self::compute(tau_syn, tau_m, c_m, h))
    }

    /// Coefficients for an arbitrary interval; time constants already validated.
    pub(crate) fn compute(tau_syn: f64, tau_m: f64, c_m: f64, h: f64) -> Self {
        let decay = (-h / tau_syn).exp();
        Self {
            decay,
            coupling: membrane_coupling(tau_syn, tau_m, c_m, h, decay),
        }
    }

    #[inline]
    pub fn membrane_input(&self, i_syn: f64) -> f64 {
        self.coupling * i_syn
    }

    #[inline]
    pub fn advance(&self, i_syn: f64) -> f64 {
        self.decay * i_syn
    }
}

/// Alpha-shaped synaptic current (two coupled state variables)
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AlphaPropagator {
    pub p11: f64,
    pub p21: f64,
    pub p22: f64,
    pub p31: f64,
    pub p32: f64,
}

impl AlphaPropagator {
    pub fn new(tau_syn: f64, tau_m: f64, c_m: f64, h: f64) -> Result<Self, ConfigurationError> {
        ConfigurationError::require_positive("tau_syn", tau_syn)?;
        ConfigurationError::require_positive("tau_m", tau_m)?;
        ConfigurationError::require_positive("C_m", c_m)?;
        ConfigurationError::require_positive("resolution", h)?;
        if tau_syn == tau_m {
            return Err(ConfigurationError::DegenerateTimeConstants {
                name: "tau_syn",
                tau: tau_syn,
            });
        }

        let decay = (-h / tau_syn).exp();
        let delta = 1.0 / tau_syn - 1.0 / tau_m;
        let p32 = membrane_coupling(tau_syn, tau_m, c_m, h, decay);
        let p31 = (p32 - h * decay / c_m) / delta;

        Ok(Self {
            p11: decay,
            p21: h * decay,
            p22: decay,
            p31,
            p32,
        })
    }

    /// Contribution of (I', I) to the membrane potential over one interval
    #[inline]
    pub fn membrane_input(&self, di: f64, i: f64) -> f64 {
        self.p31 * di + self.p32 * i
    }

    /// Advance (I', I) by one interval
    #[inline]
    pub fn advance(&self, di: &mut f64, i: &mut f64) {
        *i = self.p21 * *di + self.p22 * *i;
        *di *= self.p11;
    }
}

/// `(exp(-h/τm) - exp(-h/τs)) / (C (1/τs - 1/τm))`, with `decay = exp(-h/τs)`
#[inline]
fn membrane_coupling(tau_syn: f64, tau_m: f64, c_m: f64, h: f64, decay: f64) -> f64 {
    let delta = 1.0 / tau_syn - 1.0 / tau_m;
    decay * (delta * h).exp_m1() / (c_m * delta)
}
