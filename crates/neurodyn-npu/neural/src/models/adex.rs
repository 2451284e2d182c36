// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Adaptive exponential membrane shared by the `aeif_*` models
//!
//! ## Model Dynamics
//!
//! ```text
//! C dV/dt = -g_L (V - E_L) + g_L Δ_T exp((V - V_th)/Δ_T) - I_syn - w + I_e + I_stim
//! τ_w dw/dt = a (V - E_L) - w
//!
//! V >= V_peak: V ← V_reset, w ← w + b, refractory for t_ref
//! ```
//!
//! Inside the right-hand side the potential is read as `min(V, V_peak)`
//! (or `V_reset` while refractory) so the exponential cannot overflow
//! between threshold checks. With `Δ_T = 0` the exponential term is dropped
//! and spikes are detected at `V_th` instead of `V_peak`.
//!
//! Threshold checks and spike-driven adaptation happen between the internal
//! steps of the adaptive integrator, see [`integrate_with_threshold`].

use crate::dynamics::{within_bounds, Dynamics};
use crate::firing::{interpolate_state, linear_crossing, RefractoryState};
use crate::integrator::{DormandPrince, IntegrationStats};
use crate::types::{ConfigurationError, NumericalFault};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest admissible exponent of the spike current at `V_peak`
const MAX_EXPONENT: f64 = 690.0;

/// Membrane and adaptation parameters common to all `aeif_*` models (ms, mV, pF, nS, pA)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AdaptiveMembrane {
    #[cfg_attr(feature = "serde", serde(rename = "C_m"))]
    pub c_m: f64,
    #[cfg_attr(feature = "serde", serde(rename = "g_L"))]
    pub g_l: f64,
    #[cfg_attr(feature = "serde", serde(rename = "E_L"))]
    pub e_l: f64,
    #[cfg_attr(feature = "serde", serde(rename = "V_th"))]
    pub v_th: f64,
    #[cfg_attr(feature = "serde", serde(rename = "Delta_T"))]
    pub delta_t: f64,
    #[cfg_attr(feature = "serde", serde(rename = "V_peak"))]
    pub v_peak: f64,
    #[cfg_attr(feature = "serde", serde(rename = "V_reset"))]
    pub v_reset: f64,
    pub t_ref: f64,
    /// Subthreshold adaptation (nS)
    pub a: f64,
    /// Spike-triggered adaptation (pA)
    pub b: f64,
    pub tau_w: f64,
    #[cfg_attr(feature = "serde", serde(rename = "I_e"))]
    pub i_e: f64,
}

impl Default for AdaptiveMembrane {
    fn default() -> Self {
        Self {
            c_m: 281.0,
            g_l: 30.0,
            e_l: -70.6,
            v_th: -50.4,
            delta_t: 2.0,
            v_peak: 0.0,
            v_reset: -60.0,
            t_ref: 0.0,
            a: 4.0,
            b: 80.5,
            tau_w: 144.0,
            i_e: 0.0,
        }
    }
}

impl AdaptiveMembrane {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        ConfigurationError::require_positive("C_m", self.c_m)?;
        ConfigurationError::require_non_negative("g_L", self.g_l)?;
        ConfigurationError::require_positive("tau_w", self.tau_w)?;
        ConfigurationError::require_non_negative("Delta_T", self.delta_t)?;
        ConfigurationError::require_non_negative("t_ref", self.t_ref)?;
        for (name, value) in [
            ("E_L", self.e_l),
            ("V_th", self.v_th),
            ("V_peak", self.v_peak),
            ("V_reset", self.v_reset),
            ("a", self.a),
            ("b", self.b),
            ("I_e", self.i_e),
        ] {
            ConfigurationError::require_finite(name, value)?;
        }
        if self.v_peak < self.v_th {
            return Err(ConfigurationError::PeakBelowThreshold {
                v_peak: self.v_peak,
                v_th: self.v_th,
            });
        }
        if self.v_reset >= self.v_peak {
            return Err(ConfigurationError::ResetNotBelowThreshold {
                v_reset: self.v_reset,
                threshold: self.v_peak,
            });
        }
        if self.delta_t > 0.0 && (self.v_peak - self.v_th) / self.delta_t > MAX_EXPONENT {
            return Err(ConfigurationError::InvalidValue {
                name: "Delta_T",
                reason: format!(
                    "exp((V_peak - V_th)/Delta_T) overflows for V_peak = {}, V_th = {}, Delta_T = {}",
                    self.v_peak, self.v_th, self.delta_t
                ),
            });
        }
        Ok(())
    }

    /// Spike detection level: `V_peak`, or `V_th` for the reduced variant
    pub fn effective_peak(&self) -> f64 {
        if self.delta_t > 0.0 {
            self.v_peak
        } else {
            self.v_th
        }
    }

    /// Potential as seen by the right-hand side
    #[inline]
    pub(crate) fn clamped_potential(&self, v: f64, refractory: bool, v_peak: f64) -> f64 {
        if refractory {
            self.v_reset
        } else {
            v.min(v_peak)
        }
    }

    /// `(dV/dt, dw/dt)` for a clamped potential and total synaptic current `Σ g (V - E)`
    #[inline]
    pub(crate) fn derivatives(
        &self,
        spike: SpikeCurrent,
        v: f64,
        w: f64,
        i_syn: f64,
        i_stim: f64,
        refractory: bool,
    ) -> (f64, f64) {
        let dv = if refractory {
            0.0
        } else {
            (-self.g_l * (v - self.e_l) + spike.current(v) - i_syn - w + self.i_e + i_stim)
                / self.c_m
        };
        let dw = (self.a * (v - self.e_l) - w) / self.tau_w;
        (dv, dw)
    }
}

/// Exponential spike-initiation current, selected once at calibration
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SpikeCurrent {
    Exponential { g_l: f64, delta_t: f64, v_th: f64 },
    Reduced,
}

impl SpikeCurrent {
    pub(crate) fn select(membrane: &AdaptiveMembrane) -> Self {
        if membrane.delta_t > 0.0 {
            SpikeCurrent::Exponential {
                g_l: membrane.g_l,
                delta_t: membrane.delta_t,
                v_th: membrane.v_th,
            }
        } else {
            SpikeCurrent::Reduced
        }
    }

    #[inline]
    pub(crate) fn current(&self, v: f64) -> f64 {
        match *self {
            SpikeCurrent::Exponential {
                g_l,
                delta_t,
                v_th,
            } => g_l * delta_t * ((v - v_th) / delta_t).exp(),
            SpikeCurrent::Reduced => 0.0,
        }
    }
}

/// Sanity bounds `V >= -1000 mV` and `|w| <= 1e6 pA`
pub(crate) fn check_bounds(
    model: &'static str,
    y: &[f64],
    w_index: usize,
) -> Result<(), NumericalFault> {
    within_bounds(model, "V_m", y[0], -1.0e3, f64::INFINITY)?;
    within_bounds(model, "w", y[w_index], -1.0e6, 1.0e6)
}

/// Reset rule applied between internal steps
#[derive(Debug, Clone, Copy)]
pub(crate) struct SpikeRule {
    pub v_peak: f64,
    pub v_reset: f64,
    pub b: f64,
    pub refractory_counts: u32,
    pub w_index: usize,
    /// Interpolate the crossing inside the internal step
    pub precise: bool,
}

/// Scratch reused across steps
#[derive(Debug, Clone, Default)]
pub(crate) struct StepScratch {
    old: Vec<f64>,
    interpolated: Vec<f64>,
    /// Offsets of spikes found in the current step (`None` on the grid)
    pub spikes: Vec<Option<f64>>,
}

/// Advance `y` over one simulation step of length `h`, checking the
/// threshold after every accepted internal step.
///
/// `make_dynamics(refractory)` builds the right-hand side for the current
/// refractory flag. Spikes are collected in `scratch.spikes` and left to the
/// caller to emit once the step has succeeded.
pub(crate) fn integrate_with_threshold<D, F>(
    stepper: &mut DormandPrince,
    y: &mut [f64],
    refractory: &mut RefractoryState,
    h: f64,
    rule: &SpikeRule,
    scratch: &mut StepScratch,
    make_dynamics: F,
) -> Result<IntegrationStats, NumericalFault>
where
    D: Dynamics,
    F: Fn(bool) -> D,
{
    let mut stats = IntegrationStats::default();
    scratch.spikes.clear();
    scratch.old.resize(y.len(), 0.0);
    scratch.interpolated.resize(y.len(), 0.0);

    let mut t = 0.0;
    while t < h {
        let dynamics = make_dynamics(refractory.is_refractory());
        scratch.old.copy_from_slice(y);
        let t_old = t;
        t = stepper.step(&dynamics, y, t, h, &mut stats)?;

        if refractory.is_refractory() {
            y[0] = rule.v_reset;
        } else if y[0] >= rule.v_peak {
            let offset = if rule.precise {
                let t_cross = linear_crossing(t_old, scratch.old[0], t, y[0], rule.v_peak);
                if t > t_old {
                    let fraction = (t_cross - t_old) / (t - t_old);
                    interpolate_state(&scratch.old, y, fraction, &mut scratch.interpolated);
                    y.copy_from_slice(&scratch.interpolated);
                }
                t = t_cross;
                Some((h - t_cross).clamp(0.0, h * (1.0 - f64::EPSILON)))
            } else {
                None
            };

            y[0] = rule.v_reset;
            y[rule.w_index] += rule.b;
            dynamics.check_state(y)?;
            if rule.refractory_counts > 0 {
                // The decrement at the end of this step leaves exactly `refractory_counts`
                refractory.fire(rule.refractory_counts + 1);
            }
            scratch.spikes.push(offset);
        }
    }
    Ok(stats)
}
