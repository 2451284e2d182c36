// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # hh_psc_alpha: Hodgkin-Huxley neuron with alpha-shaped currents
//!
//! ## Model Dynamics
//!
//! ```text
//! C dV/dt = -g_Na m³h (V - E_Na) - g_K n⁴ (V - E_K) - g_L (V - E_L)
//!           + I_ex + I_in + I_e + I_stim
//! dx/dt   = α_x(V)(1 - x) - β_x(V) x            x ∈ {m, h, n}
//!
//! α_n = 0.01 (V+55) / (1 - e^{-(V+55)/10})     β_n = 0.125 e^{-(V+65)/80}
//! α_m = 0.1 (V+40) / (1 - e^{-(V+40)/10})      β_m = 4 e^{-(V+65)/18}
//! α_h = 0.07 e^{-(V+65)/20}                    β_h = 1 / (1 + e^{-(V+35)/10})
//! ```
//!
//! There is no reset: a spike is reported when the potential has passed a
//! peak above 0 mV (`V >= 0` and falling) outside the refractory period. The
//! refractory period only suppresses detection.

use super::traits::{assign_state, single_port, ModelParameters, NeuronModel};
use crate::buffer::RingBuffer;
use crate::context::{Clock, UpdateContext};
use crate::dynamics::{within_bounds, Dynamics};
use crate::firing::{refractory_steps, RefractoryState};
use crate::integrator::{DormandPrince, Tolerances};
use crate::types::{
    ConfigurationError, CurrentInput, IllegalConnection, NumericalFault, Port, SpikeInput,
};
use core::f64::consts::E;
use tracing::{debug, trace};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const MODEL: &str = "hh_psc_alpha";

const V_M: usize = 0;
const DI_EX: usize = 1;
const I_EX: usize = 2;
const DI_IN: usize = 3;
const I_IN: usize = 4;
const HH_M: usize = 5;
const HH_H: usize = 6;
const HH_N: usize = 7;
const DIMENSION: usize = 8;

/// Initial membrane potential (mV)
const V_INIT: f64 = -65.0;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HhPscAlphaParameters {
    #[cfg_attr(feature = "serde", serde(rename = "C_m"))]
    pub c_m: f64,
    #[cfg_attr(feature = "serde", serde(rename = "g_Na"))]
    pub g_na: f64,
    #[cfg_attr(feature = "serde", serde(rename = "g_K"))]
    pub g_k: f64,
    #[cfg_attr(feature = "serde", serde(rename = "g_L"))]
    pub g_l: f64,
    #[cfg_attr(feature = "serde", serde(rename = "E_Na"))]
    pub e_na: f64,
    #[cfg_attr(feature = "serde", serde(rename = "E_K"))]
    pub e_k: f64,
    #[cfg_attr(feature = "serde", serde(rename = "E_L"))]
    pub e_l: f64,
    pub tau_syn_ex: f64,
    pub tau_syn_in: f64,
    pub t_ref: f64,
    #[cfg_attr(feature = "serde", serde(rename = "I_e"))]
    pub i_e: f64,
}

impl Default for HhPscAlphaParameters {
    fn default() -> Self {
        Self {
            c_m: 100.0,
            g_na: 12000.0,
            g_k: 3600.0,
            g_l: 30.0,
            e_na: 50.0,
            e_k: -77.0,
            e_l: -54.402,
            tau_syn_ex: 0.2,
            tau_syn_in: 2.0,
            t_ref: 2.0,
            i_e: 0.0,
        }
    }
}

impl ModelParameters for HhPscAlphaParameters {
    fn validate(&self) -> Result<(), ConfigurationError> {
        ConfigurationError::require_positive("C_m", self.c_m)?;
        ConfigurationError::require_non_negative("g_Na", self.g_na)?;
        ConfigurationError::require_non_negative("g_K", self.g_k)?;
        ConfigurationError::require_non_negative("g_L", self.g_l)?;
        ConfigurationError::require_positive("tau_syn_ex", self.tau_syn_ex)?;
        ConfigurationError::require_positive("tau_syn_in", self.tau_syn_in)?;
        ConfigurationError::require_non_negative("t_ref", self.t_ref)?;
        ConfigurationError::require_finite("E_Na", self.e_na)?;
        ConfigurationError::require_finite("E_K", self.e_k)?;
        ConfigurationError::require_finite("E_L", self.e_l)?;
        ConfigurationError::require_finite("I_e", self.i_e)?;
        Ok(())
    }
}

/// `u / (1 - exp(-u/k))`, continuous at `u = 0`
#[inline]
fn linear_rate(u: f64, k: f64) -> f64 {
    if u.abs() < 1.0e-7 {
        k + 0.5 * u
    } else {
        u / -(-u / k).exp_m1()
    }
}

/// Opening and closing rates (1/ms) of the gating variables at `v`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GatingRates {
    pub alpha_m: f64,
    pub beta_m: f64,
    pub alpha_h: f64,
    pub beta_h: f64,
    pub alpha_n: f64,
    pub beta_n: f64,
}

impl GatingRates {
    pub fn at(v: f64) -> Self {
        Self {
            alpha_m: 0.1 * linear_rate(v + 40.0, 10.0),
            beta_m: 4.0 * (-(v + 65.0) / 18.0).exp(),
            alpha_h: 0.07 * (-(v + 65.0) / 20.0).exp(),
            beta_h: 1.0 / (1.0 + (-(v + 35.0) / 10.0).exp()),
            alpha_n: 0.01 * linear_rate(v + 55.0, 10.0),
            beta_n: 0.125 * (-(v + 65.0) / 80.0).exp(),
        }
    }

    /// Steady-state `(m, h, n)`
    pub fn steady_state(&self) -> (f64, f64, f64) {
        (
            self.alpha_m / (self.alpha_m + self.beta_m),
            self.alpha_h / (self.alpha_h + self.beta_h),
            self.alpha_n / (self.alpha_n + self.beta_n),
        )
    }
}

struct HhDynamics<'a> {
    p: &'a HhPscAlphaParameters,
    i_stim: f64,
}

impl Dynamics for HhDynamics<'_> {
    fn model_name(&self) -> &'static str {
        MODEL
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn derivative(&self, y: &[f64], dydt: &mut [f64]) {
        let p = self.p;
        let v = y[V_M];
        let (m, h, n) = (y[HH_M], y[HH_H], y[HH_N]);
        let rates = GatingRates::at(v);

        let i_na = p.g_na * m * m * m * h * (v - p.e_na);
        let i_k = p.g_k * n * n * n * n * (v - p.e_k);
        let i_l = p.g_l * (v - p.e_l);

        dydt[V_M] = (-(i_na + i_k + i_l) + self.i_stim + p.i_e + y[I_EX] + y[I_IN]) / p.c_m;

        dydt[DI_EX] = -y[DI_EX] / p.tau_syn_ex;
        dydt[I_EX] = y[DI_EX] - y[I_EX] / p.tau_syn_ex;
        dydt[DI_IN] = -y[DI_IN] / p.tau_syn_in;
        dydt[I_IN] = y[DI_IN] - y[I_IN] / p.tau_syn_in;

        dydt[HH_M] = rates.alpha_m * (1.0 - m) - rates.beta_m * m;
        dydt[HH_H] = rates.alpha_h * (1.0 - h) - rates.beta_h * h;
        dydt[HH_N] = rates.alpha_n * (1.0 - n) - rates.beta_n * n;
    }

    fn check_state(&self, y: &[f64]) -> Result<(), NumericalFault> {
        within_bounds(MODEL, "V_m", y[V_M], -1.0e3, 1.0e3)
    }
}

#[derive(Debug, Clone, Copy)]
struct Variables {
    h: f64,
    psc_initial_ex: f64,
    psc_initial_in: f64,
    refractory_counts: u32,
}

/// Hodgkin-Huxley point neuron
#[derive(Debug, Clone)]
pub struct HhPscAlpha {
    params: HhPscAlphaParameters,
    tolerances: Tolerances,
    /// [V_m, dI_ex, I_ex, dI_in, I_in, m, h, n]
    y: [f64; DIMENSION],
    /// Potential at the end of the previous step
    v_old: f64,
    refractory: RefractoryState,
    i_stim: f64,
    spikes_ex: RingBuffer,
    spikes_in: RingBuffer,
    currents: RingBuffer,
    stepper: DormandPrince,
    vars: Option<Variables>,
}

impl Default for HhPscAlpha {
    fn default() -> Self {
        Self::new()
    }
}

impl HhPscAlpha {
    pub fn new() -> Self {
        let tolerances = Tolerances::default();
        let (m, h, n) = GatingRates::at(V_INIT).steady_state();
        Self {
            params: HhPscAlphaParameters::default(),
            tolerances,
            y: [V_INIT, 0.0, 0.0, 0.0, 0.0, m, h, n],
            v_old: V_INIT,
            refractory: RefractoryState::new(),
            i_stim: 0.0,
            spikes_ex: RingBuffer::default(),
            spikes_in: RingBuffer::default(),
            currents: RingBuffer::default(),
            stepper: DormandPrince::new(DIMENSION, tolerances, 0.1),
            vars: None,
        }
    }

    pub fn with_params(params: HhPscAlphaParameters) -> Result<Self, ConfigurationError> {
        let mut neuron = Self::new();
        neuron.set_params(params)?;
        Ok(neuron)
    }

    pub fn with_tolerances(mut self, tolerances: Tolerances) -> Result<Self, ConfigurationError> {
        self.set_tolerances(tolerances)?;
        Ok(self)
    }

    pub fn params(&self) -> &HhPscAlphaParameters {
        &self.params
    }

    pub fn set_params(&mut self, params: HhPscAlphaParameters) -> Result<(), ConfigurationError> {
        params.validate()?;
        self.params = params;
        self.vars = None;
        Ok(())
    }

    pub fn membrane_potential(&self) -> f64 {
        self.y[V_M]
    }

    /// Gating variables `(m, h, n)`
    pub fn gating(&self) -> (f64, f64, f64) {
        (self.y[HH_M], self.y[HH_H], self.y[HH_N])
    }
}

impl NeuronModel for HhPscAlpha {
    fn model_name(&self) -> &'static str {
        MODEL
    }

    fn calibrate(&mut self, clock: &dyn Clock) -> Result<(), ConfigurationError> {
        let h = clock.resolution();
        ConfigurationError::require_positive("resolution", h)?;
        let vars = Variables {
            h,
            psc_initial_ex: E / self.params.tau_syn_ex,
            psc_initial_in: E / self.params.tau_syn_in,
            refractory_counts: refractory_steps(self.params.t_ref, h)?,
        };
        debug!(
            "{} calibrated: h={} ms, refractory_counts={}, tolerances={:?}",
            MODEL, h, vars.refractory_counts, self.tolerances
        );

        self.stepper.reset(DIMENSION, self.tolerances, h);
        let len = clock.buffer_len();
        self.spikes_ex.ensure_len(len);
        self.spikes_in.ensure_len(len);
        self.currents.ensure_len(len);
        self.vars = Some(vars);
        Ok(())
    }

    fn update(
        &mut self,
        ctx: &mut UpdateContext<'_>,
        from: usize,
        to: usize,
    ) -> Result<(), NumericalFault> {
        let vars = self.vars.ok_or(NumericalFault::Uncalibrated { model: MODEL })?;

        for lag in from..to {
            let step = ctx.step(lag);
            let mut work = self.y;
            let dynamics = HhDynamics {
                p: &self.params,
                i_stim: self.i_stim,
            };
            let stats = self.stepper.integrate(&dynamics, &mut work, vars.h)?;
            trace!(
                "{} step {}: {} accepted, {} rejected",
                MODEL,
                step,
                stats.accepted,
                stats.rejected
            );

            work[DI_EX] += vars.psc_initial_ex * self.spikes_ex.get_value(step);
            work[DI_IN] += vars.psc_initial_in * self.spikes_in.get_value(step);
            self.y = work;

            if self.refractory.is_refractory() {
                self.refractory.tick();
            } else if self.y[V_M] >= 0.0 && self.v_old > self.y[V_M] {
                self.refractory.fire(vars.refractory_counts);
                ctx.emit(lag, None);
            }
            self.v_old = self.y[V_M];

            self.i_stim = self.currents.get_value(step);
            ctx.record(lag, &self.y);
        }
        Ok(())
    }

    fn handles_port(&self, port: Port) -> Result<(), IllegalConnection> {
        single_port(MODEL, port)
    }

    fn deliver_spike(&mut self, spike: &SpikeInput) -> Result<(), IllegalConnection> {
        single_port(MODEL, spike.port)?;
        let weight = spike.total_weight();
        if weight > 0.0 {
            self.spikes_ex.add_value(spike.delivery_step, weight);
        } else {
            self.spikes_in.add_value(spike.delivery_step, weight);
        }
        Ok(())
    }

    fn deliver_current(&mut self, current: &CurrentInput) -> Result<(), IllegalConnection> {
        single_port(MODEL, current.port)?;
        self.currents.add_value(current.delivery_step, current.amplitude);
        Ok(())
    }

    fn state_vector(&self) -> &[f64] {
        &self.y
    }

    fn set_state_vector(&mut self, values: &[f64]) -> Result<(), ConfigurationError> {
        assign_state(&mut self.y, values)?;
        self.v_old = self.y[V_M];
        Ok(())
    }

    fn state_labels(&self) -> Vec<String> {
        ["V_m", "dI_ex", "I_ex", "dI_in", "I_in", "Act_m", "Inact_h", "Act_n"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn tolerances(&self) -> Option<Tolerances> {
        Some(self.tolerances)
    }

    fn set_tolerances(&mut self, tolerances: Tolerances) -> Result<(), ConfigurationError> {
        tolerances.validate()?;
        self.tolerances = tolerances;
        self.vars = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ClockSnapshot;
    use crate::types::{SpikeEvent, Step};

    const H: f64 = 0.1;

    fn run(neuron: &mut HhPscAlpha, steps: usize) -> (Vec<SpikeEvent>, Vec<(Step, Vec<f64>)>) {
        let clock = ClockSnapshot::new(H).with_delays(steps, steps);
        neuron.calibrate(&clock).unwrap();
        let mut spikes = Vec::new();
        let mut data = Vec::new();
        let mut ctx = UpdateContext::new(&clock, &mut spikes, &mut data);
        neuron.update(&mut ctx, 0, steps).unwrap();
        (spikes, data)
    }

    #[test]
    fn test_rate_functions_are_continuous_at_singularities() {
        let at = GatingRates::at(-40.0);
        let near = GatingRates::at(-40.0 + 1e-6);
        assert!((at.alpha_m - 1.0).abs() < 1e-12);
        assert!((at.alpha_m - near.alpha_m).abs() < 1e-6);

        let at = GatingRates::at(-55.0);
        assert!((at.alpha_n - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_initial_gating_is_steady_state() {
        let neuron = HhPscAlpha::new();
        let (m, h, n) = neuron.gating();
        for x in [m, h, n] {
            assert!(x > 0.0 && x < 1.0);
        }
        assert!((m - 0.0529).abs() < 1e-3);
        assert!((h - 0.5961).abs() < 1e-3);
        assert!((n - 0.3177).abs() < 1e-3);
    }

    #[test]
    fn test_silent_without_input() {
        let mut neuron = HhPscAlpha::new();
        let (spikes, data) = run(&mut neuron, 1000);
        assert!(spikes.is_empty());
        assert!(data.iter().all(|(_, y)| (y[V_M] + 65.0).abs() < 0.5));
    }

    #[test]
    fn test_tonic_firing_under_constant_current() {
        let mut neuron = HhPscAlpha::with_params(HhPscAlphaParameters {
            i_e: 1000.0,
            ..Default::default()
        })
        .unwrap();
        let (spikes, data) = run(&mut neuron, 1000);
        assert!(spikes.len() >= 2, "spikes = {}", spikes.len());

        // Detected on the falling flank after a peak above 0 mV, no reset
        for spike in &spikes {
            let s = spike.step() as usize;
            assert!(data[s].1[V_M] >= 0.0);
            assert!(data[s - 1].1[V_M] > data[s].1[V_M]);
        }
        // Spikes are separated by more than the refractory period
        for pair in spikes.windows(2) {
            assert!(pair[1].step() - pair[0].step() > 20);
        }
    }

    #[test]
    fn test_excitatory_input_depolarises() {
        let mut neuron = HhPscAlpha::new();
        neuron.deliver_spike(&SpikeInput::new(10, 50.0)).unwrap();
        let (_, data) = run(&mut neuron, 40);
        assert!(data[15].1[V_M] > data[9].1[V_M]);
        assert!(data[10].1[DI_EX] > 0.0);
    }
}
