// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # iaf_psc_exp: leaky integrate-and-fire with exponential currents
//!
//! ## Model Dynamics
//!
//! ```text
//! C dV/dt    = -(V - E_L) C/τm + I_ex + I_in + I_e + I_stim
//! dI_ex/dt   = -I_ex / τ_ex        (jump +w for w >= 0)
//! dI_in/dt   = -I_in / τ_in        (jump +w for w <  0)
//! ```
//!
//! Integrated exactly with [`crate::propagator`]. Per step:
//!
//! ```text
//! if not refractory: V ← E_L + P33(V-E_L) + P30(I_e + I_stim) + P21ex I_ex + P21in I_in
//! I_ex ← P11ex I_ex + spikes_ex[step]      (likewise I_in)
//! if V >= V_th: V ← V_reset, refractory for round(t_ref/h) steps, emit
//! I_stim ← currents[step]                  (applies from the next step)
//! ```

use super::traits::{assign_state, single_port, ModelParameters, NeuronModel};
use crate::buffer::RingBuffer;
use crate::context::{Clock, UpdateContext};
use crate::firing::{refractory_steps, RefractoryState};
use crate::propagator::{ExpPropagator, MembranePropagator};
use crate::types::{
    ConfigurationError, CurrentInput, IllegalConnection, NumericalFault, Port, SpikeInput,
};
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const MODEL: &str = "iaf_psc_exp";

const V_M: usize = 0;
const I_EX: usize = 1;
const I_IN: usize = 2;

/// Parameters of [`IafPscExp`] (ms, mV, pF, pA)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IafPscExpParameters {
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
    #[cfg_attr(feature = "serde", serde(rename = "I_e"))]
    pub i_e: f64,
}

impl Default for IafPscExpParameters {
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
            i_e: 0.0,
        }
    }
}

impl ModelParameters for IafPscExpParameters {
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
/// Changing `E_L` moves `V_th` and `V_reset` (and the membrane potential)
/// by the same amount unless they are given explicitly.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IafPscExpUpdate {
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
    #[cfg_attr(feature = "serde", serde(rename = "I_e"))]
    pub i_e: Option<f64>,
}

impl IafPscExpUpdate {
    /// Candidate record; the caller validates before committing
    fn apply_to(&self, old: &IafPscExpParameters) -> IafPscExpParameters {
        let e_l = self.e_l.unwrap_or(old.e_l);
        let delta = e_l - old.e_l;
        IafPscExpParameters {
            c_m: self.c_m.unwrap_or(old.c_m),
            tau_m: self.tau_m.unwrap_or(old.tau_m),
            tau_syn_ex: self.tau_syn_ex.unwrap_or(old.tau_syn_ex),
            tau_syn_in: self.tau_syn_in.unwrap_or(old.tau_syn_in),
            t_ref: self.t_ref.unwrap_or(old.t_ref),
            e_l,
            v_th: self.v_th.unwrap_or(old.v_th + delta),
            v_reset: self.v_reset.unwrap_or(old.v_reset + delta),
            i_e: self.i_e.unwrap_or(old.i_e),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Variables {
    membrane: MembranePropagator,
    ex: ExpPropagator,
    inh: ExpPropagator,
    refractory_counts: u32,
}

/// Current-based LIF neuron with exponential synaptic currents
#[derive(Debug, Clone)]
pub struct IafPscExp {
    params: IafPscExpParameters,
    /// [V_m, I_syn_ex, I_syn_in]
    y: [f64; 3],
    refractory: RefractoryState,
    /// Injected current applied during the current step
    i_stim: f64,
    spikes_ex: RingBuffer,
    spikes_in: RingBuffer,
    currents: RingBuffer,
    vars: Option<Variables>,
}

impl Default for IafPscExp {
    fn default() -> Self {
        Self::new()
    }
}

impl IafPscExp {
    pub fn new() -> Self {
        let params = IafPscExpParameters::default();
        Self {
            y: [params.e_l, 0.0, 0.0],
            params,
            refractory: RefractoryState::new(),
            i_stim: 0.0,
            spikes_ex: RingBuffer::default(),
            spikes_in: RingBuffer::default(),
            currents: RingBuffer::default(),
            vars: None,
        }
    }

    /// Build with custom parameters; the membrane starts at `E_L`
    pub fn with_params(params: IafPscExpParameters) -> Result<Self, ConfigurationError> {
        params.validate()?;
        let mut neuron = Self::new();
        neuron.y[V_M] = params.e_l;
        neuron.params = params;
        Ok(neuron)
    }

    pub fn params(&self) -> &IafPscExpParameters {
        &self.params
    }

    /// Replace all parameters; nothing changes if validation fails
    pub fn set_params(&mut self, params: IafPscExpParameters) -> Result<(), ConfigurationError> {
        params.validate()?;
        self.params = params;
        self.vars = None;
        Ok(())
    }

    /// Apply a partial update transactionally
    pub fn update_params(&mut self, update: &IafPscExpUpdate) -> Result<(), ConfigurationError> {
        let candidate = update.apply_to(&self.params);
        candidate.validate()?;
        let delta = candidate.e_l - self.params.e_l;
        self.y[V_M] += delta;
        self.params = candidate;
        self.vars = None;
        Ok(())
    }

    pub fn membrane_potential(&self) -> f64 {
        self.y[V_M]
    }

    pub fn is_refractory(&self) -> bool {
        self.refractory.is_refractory()
    }
}

impl NeuronModel for IafPscExp {
    fn model_name(&self) -> &'static str {
        MODEL
    }

    fn calibrate(&mut self, clock: &dyn Clock) -> Result<(), ConfigurationError> {
        let h = clock.resolution();
        let p = &self.params;
        let vars = Variables {
            membrane: MembranePropagator::new(p.tau_m, p.c_m, h)?,
            ex: ExpPropagator::new(p.tau_syn_ex, p.tau_m, p.c_m, h)?,
            inh: ExpPropagator::new(p.tau_syn_in, p.tau_m, p.c_m, h)?,
            refractory_counts: refractory_steps(p.t_ref, h)?,
        };
        debug!(
            "{} calibrated: h={} ms, P33={:.6e}, P30={:.6e}, refractory_counts={}",
            MODEL, h, vars.membrane.decay, vars.membrane.input, vars.refractory_counts
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

        for lag in from..to {
            let step = ctx.step(lag);

            if !self.refractory.enter_step() {
                let v_rel = self.y[V_M] - p.e_l;
                self.y[V_M] = p.e_l
                    + vars.membrane.advance(v_rel, p.i_e + self.i_stim)
                    + vars.ex.membrane_input(self.y[I_EX])
                    + vars.inh.membrane_input(self.y[I_IN]);
            }

            self.y[I_EX] = vars.ex.advance(self.y[I_EX]) + self.spikes_ex.get_value(step);
            self.y[I_IN] = vars.inh.advance(self.y[I_IN]) + self.spikes_in.get_value(step);

            if self.y[V_M] >= p.v_th {
                self.refractory.fire(vars.refractory_counts);
                self.y[V_M] = p.v_reset;
                ctx.emit(lag, None);
            }

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
        if weight >= 0.0 {
            self.spikes_ex.add_value(spike.delivery_step, weight);
        } else {
            self.spikes_in.add_value(spike.delivery_step, weight);
        }
        Ok(())
    }

    fn deliver_current(&mut self, current: &CurrentInput) -> Result<(), IllegalConnection> {
        single_port(MODEL, current.port)?;
        self.currents
            .add_value(current.delivery_step, current.amplitude);
        Ok(())
    }

    fn state_vector(&self) -> &[f64] {
        &self.y
    }

    fn set_state_vector(&mut self, values: &[f64]) -> Result<(), ConfigurationError> {
        assign_state(&mut self.y, values)
    }

    fn state_labels(&self) -> Vec<String> {
        ["V_m", "I_syn_ex", "I_syn_in"]
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

    fn run(neuron: &mut IafPscExp, steps: usize) -> (Vec<SpikeEvent>, Vec<(Step, Vec<f64>)>) {
        let clock = ClockSnapshot::new(H).with_delays(steps, steps);
        neuron.calibrate(&clock).unwrap();
        let mut spikes = Vec::new();
        let mut data = Vec::new();
        let mut ctx = UpdateContext::new(&clock, &mut spikes, &mut data);
        neuron.update(&mut ctx, 0, steps).unwrap();
        (spikes, data)
    }

    #[test]
    fn test_resting_neuron_stays_at_e_l() {
        let mut neuron = IafPscExp::new();
        let (spikes, data) = run(&mut neuron, 100);
        assert!(spikes.is_empty());
        assert!(data.iter().all(|(_, y)| y[V_M] == -70.0));
    }

    #[test]
    fn test_excitatory_current_decays_exponentially() {
        let mut neuron = IafPscExp::new();
        neuron.deliver_spike(&SpikeInput::new(5, 100.0)).unwrap();
        let (_, data) = run(&mut neuron, 20);

        assert_eq!(data[4].1[I_EX], 0.0);
        assert_eq!(data[5].1[I_EX], 100.0);
        let expected = (-H / 2.0).exp();
        for k in 6..20 {
            let ratio = data[k].1[I_EX] / data[k - 1].1[I_EX];
            assert!((ratio - expected).abs() / expected < 1e-12);
        }
        // The membrane starts to move one step after the current arrives
        assert_eq!(data[5].1[V_M], -70.0);
        assert!(data[6].1[V_M] > -70.0);
    }

    #[test]
    fn test_negative_weight_goes_to_inhibitory_current() {
        let mut neuron = IafPscExp::new();
        neuron.deliver_spike(&SpikeInput::new(2, -50.0)).unwrap();
        let (_, data) = run(&mut neuron, 10);
        assert_eq!(data[2].1[I_IN], -50.0);
        assert_eq!(data[2].1[I_EX], 0.0);
        assert!(data[9].1[V_M] < -70.0);
    }

    #[test]
    fn test_refractory_period_clamps_exactly() {
        let mut neuron = IafPscExp::with_params(IafPscExpParameters {
            t_ref: 0.3,
            i_e: 1.0e4,
            ..Default::default()
        })
        .unwrap();
        let (spikes, data) = run(&mut neuron, 200);
        assert!(spikes.len() >= 3);

        for spike in &spikes {
            let s = spike.step() as usize;
            if s + 4 >= data.len() {
                continue;
            }
            for k in s..=s + 3 {
                assert_eq!(data[k].1[V_M], -70.0, "step {} after spike at {}", k, s);
            }
            assert!(data[s + 4].1[V_M] > -70.0);
        }
    }

    #[test]
    fn test_current_injection_applies_from_next_step() {
        let mut neuron = IafPscExp::new();
        neuron.deliver_current(&CurrentInput::new(3, 400.0)).unwrap();
        let (_, data) = run(&mut neuron, 6);
        assert_eq!(data[3].1[V_M], -70.0);
        assert!(data[4].1[V_M] > -70.0);
    }

    #[test]
    fn test_invalid_params_leave_old_record() {
        let mut neuron = IafPscExp::new();
        let before = neuron.params().clone();

        let bad_tau = IafPscExpParameters {
            tau_syn_ex: 0.0,
            ..Default::default()
        };
        assert!(neuron.set_params(bad_tau).is_err());

        let bad_reset = IafPscExpUpdate {
            v_reset: Some(-50.0),
            ..Default::default()
        };
        assert!(matches!(
            neuron.update_params(&bad_reset),
            Err(ConfigurationError::ResetNotBelowThreshold { .. })
        ));
        assert_eq!(neuron.params(), &before);
    }

    #[test]
    fn test_e_l_change_shifts_dependent_potentials() {
        let mut neuron = IafPscExp::new();
        neuron
            .update_params(&IafPscExpUpdate {
                e_l: Some(-65.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(neuron.params().v_th, -50.0);
        assert_eq!(neuron.params().v_reset, -65.0);
        assert_eq!(neuron.membrane_potential(), -65.0);

        neuron
            .update_params(&IafPscExpUpdate {
                e_l: Some(-60.0),
                v_th: Some(-52.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(neuron.params().v_th, -52.0);
        assert_eq!(neuron.params().v_reset, -60.0);
    }

    #[test]
    fn test_update_before_calibrate_is_rejected() {
        let mut neuron = IafPscExp::new();
        let clock = ClockSnapshot::new(H);
        let mut spikes = Vec::new();
        let mut data = Vec::new();
        let mut ctx = UpdateContext::new(&clock, &mut spikes, &mut data);
        assert!(matches!(
            neuron.update(&mut ctx, 0, 1),
            Err(NumericalFault::Uncalibrated { .. })
        ));
    }

    #[test]
    fn test_unknown_port_rejected() {
        let mut neuron = IafPscExp::new();
        assert!(neuron.handles_port(Port(1)).is_err());
        assert!(neuron
            .deliver_spike(&SpikeInput::new(1, 1.0).at_port(Port(3)))
            .is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_params_deserialize_with_nest_names() {
        let params: IafPscExpParameters =
            serde_json::from_str(r#"{"C_m": 200.0, "V_th": -50.0, "tau_syn_ex": 1.5}"#).unwrap();
        assert_eq!(params.c_m, 200.0);
        assert_eq!(params.v_th, -50.0);
        assert_eq!(params.tau_syn_ex, 1.5);
        assert_eq!(params.tau_m, 10.0);
        assert!(params.validate().is_ok());
    }
}
