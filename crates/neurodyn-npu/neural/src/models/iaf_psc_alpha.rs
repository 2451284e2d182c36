// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # iaf_psc_alpha: leaky integrate-and-fire with alpha-shaped currents
//!
//! ## Model Dynamics
//!
//! ```text
//! C dV/dt  = -(V - E_L) C/τm + I_ex + I_in + I_e + I_stim
//! dI'/dt   = -I'/τs                      (per synapse type)
//! dI/dt    =  I' - I/τs
//! spike w  : I' += w·e/τs                (PSC peaks at w after τs)
//! ```
//!
//! Integrated exactly with [`AlphaPropagator`]. An optional lower bound
//! `V_min` clips the membrane potential after every integrated step.

use super::traits::{assign_state, single_port, ModelParameters, NeuronModel};
use crate::buffer::RingBuffer;
use crate::context::{Clock, UpdateContext};
use crate::firing::{refractory_steps, RefractoryState};
use crate::propagator::{AlphaPropagator, MembranePropagator};
use crate::types::{
    ConfigurationError, CurrentInput, IllegalConnection, NumericalFault, Port, SpikeInput,
};
use core::f64::consts::E;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const MODEL: &str = "iaf_psc_alpha";

const V_M: usize = 0;
const DI_EX: usize = 1;
const I_EX: usize = 2;
const DI_IN: usize = 3;
const I_IN: usize = 4;

/// Parameters of [`IafPscAlpha`] (ms, mV, pF, pA)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IafPscAlphaParameters {
    #[cfg_attr(feature = "serde", serde(rename = "C_m"))]
    pub c_m: f64,
    pub tau_m: f64,
    pub tau_syn_ex: f64,
    pub tau_syn_in: f64,
    pub t_ref: f64,
    #[cfg_attr(feature = "serde", serde(rename = "E_L"))]
    pub e_l: f64,
    #[cfg_attr(feature = "serde", serde(rename = "V_th"))]
    pub v_th: f64,
    #[cfg_attr(feature = "serde", serde(rename = "V_reset"))]
    pub v_reset: f64,
    /// Absolute lower bound of the membrane potential, unbounded if `None`
    #[cfg_attr(feature = "serde", serde(rename = "V_min"))]
    pub v_min: Option<f64>,
    #[cfg_attr(feature = "serde", serde(rename = "I_e"))]
    pub i_e: f64,
}

impl Default for IafPscAlphaParameters {
    fn default() -> Self {
        Self {
            c_m: 250.0,
            tau_m: 10.0,
            tau_syn_ex: 2.0,
            tau_syn_in: 2.0,
            t_ref: 2.0,
            e_l: -70.0,
            v_th: -55.0,
            v_reset: -70.0,
            v_min: None,
            i_e: 0.0,
        }
    }
}

impl ModelParameters for IafPscAlphaParameters {
    fn validate(&self) -> Result<(), ConfigurationError> {
        ConfigurationError::require_positive("C_m", self.c_m)?;
        ConfigurationError::require_positive("tau_m", self.tau_m)?;
        ConfigurationError::require_positive("tau_syn_ex", self.tau_syn_ex)?;
        ConfigurationError::require_positive("tau_syn_in", self.tau_syn_in)?;
        ConfigurationError::require_non_negative("t_ref", self.t_ref)?;
        ConfigurationError::require_finite("E_L", self.e_l)?;
        ConfigurationError::require_finite("V_th", self.v_th)?;
        ConfigurationError::require_finite("V_reset", self.v_reset)?;
        ConfigurationError::require_finite("I_e", self.i_e)?;
        if self.v_reset >= self.v_th {
            return Err(ConfigurationError::ResetNotBelowThreshold {
                v_reset: self.v_reset,
                threshold: self.v_th,
            });
        }
        if let Some(v_min) = self.v_min {
            ConfigurationError::require_finite("V_min", v_min)?;
            if self.v_reset < v_min {
                return Err(ConfigurationError::InvalidValue {
                    name: "V_min",
                    reason: format!("V_reset = {} mV lies below V_min = {} mV", self.v_reset, v_min),
                });
            }
        }
        for (name, tau) in [("tau_syn_ex", self.tau_syn_ex), ("tau_syn_in", self.tau_syn_in)] {
            if tau == self.tau_m {
                return Err(ConfigurationError::DegenerateTimeConstants { name, tau });
            }
        }
        Ok(())
    }
}

/// Partial parameter update; unset fields keep their value.
///
/// Changing `E_L` moves `V_th`, `V_reset`, `V_min` and the membrane
/// potential by the same amount unless they are given explicitly.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IafPscAlphaUpdate {
    #[cfg_attr(feature = "serde", serde(rename = "C_m"))]
    pub c_m: Option<f64>,
    pub tau_m: Option<f64>,
    pub tau_syn_ex: Option<f64>,
    pub tau_syn_in: Option<f64>,
    pub t_ref: Option<f64>,
    #[cfg_attr(feature = "serde", serde(rename = "E_L"))]
    pub e_l: Option<f64>,
    #[cfg_attr(feature = "serde", serde(rename = "V_th"))]
    pub v_th: Option<f64>,
    #[cfg_attr(feature = "serde", serde(rename = "V_reset"))]
    pub v_reset: Option<f64>,
    #[cfg_attr(feature = "serde", serde(rename = "V_min"))]
    pub v_min: Option<f64>,
    #[cfg_attr(feature = "serde", serde(rename = "I_e"))]
    pub i_e: Option<f64>,
}

impl IafPscAlphaUpdate {
    fn apply_to(&self, old: &IafPscAlphaParameters) -> IafPscAlphaParameters {
        let e_l = self.e_l.unwrap_or(old.e_l);
        let delta = e_l - old.e_l;
        IafPscAlphaParameters {
            c_m: self.c_m.unwrap_or(old.c_m),
            tau_m: self.tau_m.unwrap_or(old.tau_m),
            tau_syn_ex: self.tau_syn_ex.unwrap_or(old.tau_syn_ex),
            tau_syn_in: self.tau_syn_in.unwrap_or(old.tau_syn_in),
            t_ref: self.t_ref.unwrap_or(old.t_ref),
            e_l,
            v_th: self.v_th.unwrap_or(old.v_th + delta),
            v_reset: self.v_reset.unwrap_or(old.v_reset + delta),
            v_min: self.v_min.or(old.v_min.map(|v| v + delta)),
            i_e: self.i_e.unwrap_or(old.i_e),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Variables {
    membrane: MembranePropagator,
    ex: AlphaPropagator,
    inh: AlphaPropagator,
    /// e/τs: initial I' of a unit-weight PSC
    psc_initial_ex: f64,
    psc_initial_in: f64,
    refractory_counts: u32,
}

/// Current-based LIF neuron with alpha-shaped synaptic currents
#[derive(Debug, Clone)]
pub struct IafPscAlpha {
    params: IafPscAlphaParameters,
    /// [V_m, dI_ex, I_ex, dI_in, I_in]
    y: [f64; 5],
    refractory: RefractoryState,
    i_stim: f64,
    spikes_ex: RingBuffer,
    spikes_in: RingBuffer,
    currents: RingBuffer,
    vars: Option<Variables>,
}

impl Default for IafPscAlpha {
    fn default() -> Self {
        Self::new()
    }
}

impl IafPscAlpha {
    pub fn new() -> Self {
        let params = IafPscAlphaParameters::default();
        Self {
            y: [params.e_l, 0.0, 0.0, 0.0, 0.0],
            params,
            refractory: RefractoryState::new(),
            i_stim: 0.0,
            spikes_ex: RingBuffer::default(),
            spikes_in: RingBuffer::default(),
            currents: RingBuffer::default(),
            vars: None,
        }
    }

    pub fn with_params(params: IafPscAlphaParameters) -> Result<Self, ConfigurationError> {
        params.validate()?;
        let mut neuron = Self::new();
        neuron.y[V_M] = params.e_l;
        neuron.params = params;
        Ok(neuron)
    }

    pub fn params(&self) -> &IafPscAlphaParameters {
        &self.params
    }

    pub fn set_params(&mut self, params: IafPscAlphaParameters) -> Result<(), ConfigurationError> {
        params.validate()?;
        self.params = params;
        self.vars = None;
        Ok(())
    }

    /// Apply a partial update transactionally
    pub fn update_params(&mut self, update: &IafPscAlphaUpdate) -> Result<(), ConfigurationError> {
        let candidate = update.apply_to(&self.params);
        candidate.validate()?;
        self.y[V_M] += candidate.e_l - self.params.e_l;
        self.params = candidate;
        self.vars = None;
        Ok(())
    }

    pub fn membrane_potential(&self) -> f64 {
        self.y[V_M]
    }
}

impl NeuronModel for IafPscAlpha {
    fn model_name(&self) -> &'static str {
        MODEL
    }

    fn calibrate(&mut self, clock: &dyn Clock) -> Result<(), ConfigurationError> {
        let h = clock.resolution();
        let p = &self.params;
        let vars = Variables {
            membrane: MembranePropagator::new(p.tau_m, p.c_m, h)?,
            ex: AlphaPropagator::new(p.tau_syn_ex, p.tau_m, p.c_m, h)?,
            inh: AlphaPropagator::new(p.tau_syn_in, p.tau_m, p.c_m, h)?,
            psc_initial_ex: E / p.tau_syn_ex,
            psc_initial_in: E / p.tau_syn_in,
            refractory_counts: refractory_steps(p.t_ref, h)?,
        };
        debug!(
            "{} calibrated: h={} ms, P31_ex={:.6e}, P32_ex={:.6e}, refractory_counts={}",
            MODEL, h, vars.ex.p31, vars.ex.p32, vars.refractory_counts
        );

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
        let p = &self.params;
        let y = &mut self.y;

        for lag in from..to {
            let step = ctx.step(lag);

            if !self.refractory.enter_step() {
                let v_rel = y[V_M] - p.e_l;
                let mut v = p.e_l
                    + vars.membrane.advance(v_rel, p.i_e + self.i_stim)
                    + vars.ex.membrane_input(y[DI_EX], y[I_EX])
                    + vars.inh.membrane_input(y[DI_IN], y[I_IN]);
                if let Some(v_min) = p.v_min {
                    v = v.max(v_min);
                }
                y[V_M] = v;
            }

            let (mut di, mut i) = (y[DI_EX], y[I_EX]);
            vars.ex.advance(&mut di, &mut i);
            y[DI_EX] = di + vars.psc_initial_ex * self.spikes_ex.get_value(step);
            y[I_EX] = i;

            let (mut di, mut i) = (y[DI_IN], y[I_IN]);
            vars.inh.advance(&mut di, &mut i);
            y[DI_IN] = di + vars.psc_initial_in * self.spikes_in.get_value(step);
            y[I_IN] = i;

            if y[V_M] >= p.v_th {
                self.refractory.fire(vars.refractory_counts);
                y[V_M] = p.v_reset;
                ctx.emit(lag, None);
            }

            self.i_stim = self.currents.get_value(step);
            ctx.record(lag, &y[..]);
        }
        Ok(())
    }

    fn handles_port(&self, port: Port) -> Result<(), IllegalConnection> {
        single_port(MODEL, port)
    }

    fn deliver_spike(&mut self, spike: &SpikeInput) -> Result<(), IllegalConnection> {
        single_port(MODEL, spike.port)?;
        let weight = spike.total_weight();
        if weight >= 0.0 {
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
        assign_state(&mut self.y, values)
    }

    fn state_labels(&self) -> Vec<String> {
        ["V_m", "dI_ex", "I_ex", "dI_in", "I_in"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ClockSnapshot;
    use crate::types::{SpikeEvent, Step};

    const H: f64 = 0.1;

    fn run(neuron: &mut IafPscAlpha, steps: usize) -> (Vec<SpikeEvent>, Vec<(Step, Vec<f64>)>) {
        let clock = ClockSnapshot::new(H).with_delays(steps, steps);
        neuron.calibrate(&clock).unwrap();
        let mut spikes = Vec::new();
        let mut data = Vec::new();
        let mut ctx = UpdateContext::new(&clock, &mut spikes, &mut data);
        neuron.update(&mut ctx, 0, steps).unwrap();
        (spikes, data)
    }

    #[test]
    fn test_psc_peaks_at_weight_after_tau_syn() {
        let mut neuron = IafPscAlpha::new();
        neuron.deliver_spike(&SpikeInput::new(0, 100.0)).unwrap();
        let (_, data) = run(&mut neuron, 60);

        // tau_syn_ex = 2 ms = 20 steps after delivery
        let peak = data[20].1[I_EX];
        assert!((peak - 100.0).abs() < 1e-9, "peak = {}", peak);
        assert!(data.iter().all(|(_, y)| y[I_EX] <= peak + 1e-12));
    }

    #[test]
    fn test_resting_neuron_is_silent() {
        let mut neuron = IafPscAlpha::new();
        let (spikes, data) = run(&mut neuron, 100);
        assert!(spikes.is_empty());
        assert!(data.iter().all(|(_, y)| y[V_M] == -70.0));
    }

    #[test]
    fn test_constant_drive_fires_regularly() {
        let mut neuron = IafPscAlpha::with_params(IafPscAlphaParameters {
            i_e: 450.0,
            ..Default::default()
        })
        .unwrap();
        let (spikes, _) = run(&mut neuron, 1000);
        assert!(spikes.len() >= 3);
        let isi: Vec<i64> = spikes.windows(2).map(|w| w[1].step() - w[0].step()).collect();
        assert!(isi.windows(2).all(|w| w[0] == w[1]), "isi = {:?}", isi);
    }

    #[test]
    fn test_v_min_bounds_hyperpolarisation() {
        let mut neuron = IafPscAlpha::with_params(IafPscAlphaParameters {
            v_min: Some(-72.0),
            ..Default::default()
        })
        .unwrap();
        neuron.deliver_spike(&SpikeInput::new(1, -5000.0)).unwrap();
        let (_, data) = run(&mut neuron, 100);
        assert!(data.iter().all(|(_, y)| y[V_M] >= -72.0));
        assert!(data.iter().any(|(_, y)| y[V_M] == -72.0));
    }

    #[test]
    fn test_equal_tau_rejected_transactionally() {
        let mut neuron = IafPscAlpha::new();
        let before = neuron.params().clone();
        let result = neuron.update_params(&IafPscAlphaUpdate {
            tau_syn_in: Some(10.0),
            ..Default::default()
        });
        assert!(matches!(
            result,
            Err(ConfigurationError::DegenerateTimeConstants { name: "tau_syn_in", .. })
        ));
        assert_eq!(neuron.params(), &before);
    }

    #[test]
    fn test_e_l_shift_moves_v_min() {
        let mut neuron = IafPscAlpha::with_params(IafPscAlphaParameters {
            v_min: Some(-80.0),
            ..Default::default()
        })
        .unwrap();
        neuron
            .update_params(&IafPscAlphaUpdate {
                e_l: Some(-60.0),
                ..Default::default()
            })
            .unwrap();
        let p = neuron.params();
        assert_eq!(p.v_min, Some(-70.0));
        assert_eq!(p.v_th, -45.0);
        assert_eq!(p.v_reset, -60.0);
        assert_eq!(neuron.membrane_potential(), -60.0);
    }

    #[test]
    fn test_v_reset_below_v_min_rejected() {
        let mut neuron = IafPscAlpha::new();
        let result = neuron.update_params(&IafPscAlphaUpdate {
            v_min: Some(-65.0),
            ..Default::default()
        });
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { name: "V_min", .. })));
    }
}
