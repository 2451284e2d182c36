// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # aeif_cond_alpha: adaptive exponential IF with alpha conductances
//!
//! Membrane and adaptation follow [`super::adex`]. Synaptic input is
//! conductance based:
//!
//! ```text
//! I_syn     = g_ex (V - E_ex) + g_in (V - E_in)
//! dg'/dt    = -g'/τs
//! dg/dt     =  g' - g/τs
//! spike w   : g' += |w|·e/τs        (w >= 0 excitatory, w < 0 inhibitory)
//! ```
//!
//! The state is advanced by the adaptive Dormand-Prince stepper; threshold
//! checks run between its internal steps. With `precise_spike_times` the
//! crossing is interpolated inside the internal step and emitted with a
//! sub-step offset.

use super::adex::{
    check_bounds, integrate_with_threshold, AdaptiveMembrane, SpikeCurrent, SpikeRule,
    StepScratch,
};
use super::traits::{assign_state, single_port, ModelParameters, NeuronModel};
use crate::buffer::RingBuffer;
use crate::context::{Clock, UpdateContext};
use crate::dynamics::Dynamics;
use crate::firing::{refractory_steps, RefractoryState};
use crate::integrator::{DormandPrince, Tolerances};
use crate::types::{
    ConfigurationError, CurrentInput, IllegalConnection, NumericalFault, Port, SpikeInput,
};
use core::f64::consts::E;
use tracing::{debug, trace};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const MODEL: &str = "aeif_cond_alpha";

const V_M: usize = 0;
const DG_EX: usize = 1;
const G_EX: usize = 2;
const DG_IN: usize = 3;
const G_IN: usize = 4;
const W: usize = 5;
const DIMENSION: usize = 6;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AeifCondAlphaParameters {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub membrane: AdaptiveMembrane,
    #[cfg_attr(feature = "serde", serde(rename = "E_ex"))]
    pub e_ex: f64,
    #[cfg_attr(feature = "serde", serde(rename = "E_in"))]
    pub e_in: f64,
    pub tau_syn_ex: f64,
    pub tau_syn_in: f64,
    /// Interpolate threshold crossings and emit sub-step offsets
    pub precise_spike_times: bool,
}

impl Default for AeifCondAlphaParameters {
    fn default() -> Self {
        Self {
            membrane: AdaptiveMembrane::default(),
            e_ex: 0.0,
            e_in: -85.0,
            tau_syn_ex: 0.2,
            tau_syn_in: 2.0,
            precise_spike_times: false,
        }
    }
}

impl ModelParameters for AeifCondAlphaParameters {
    fn validate(&self) -> Result<(), ConfigurationError> {
        self.membrane.validate()?;
        ConfigurationError::require_finite("E_ex", self.e_ex)?;
        ConfigurationError::require_finite("E_in", self.e_in)?;
        ConfigurationError::require_positive("tau_syn_ex", self.tau_syn_ex)?;
        ConfigurationError::require_positive("tau_syn_in", self.tau_syn_in)?;
        Ok(())
    }
}

/// Right-hand side for one simulation step
struct AeifCondAlphaDynamics<'a> {
    p: &'a AeifCondAlphaParameters,
    spike: SpikeCurrent,
    v_peak: f64,
    i_stim: f64,
    refractory: bool,
}

impl Dynamics for AeifCondAlphaDynamics<'_> {
    fn model_name(&self) -> &'static str {
        MODEL
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn derivative(&self, y: &[f64], dydt: &mut [f64]) {
        let p = self.p;
        let v = p
            .membrane
            .clamped_potential(y[V_M], self.refractory, self.v_peak);
        let i_syn = y[G_EX] * (v - p.e_ex) + y[G_IN] * (v - p.e_in);
        let (dv, dw) = p
            .membrane
            .derivatives(self.spike, v, y[W], i_syn, self.i_stim, self.refractory);

        dydt[V_M] = dv;
        dydt[DG_EX] = -y[DG_EX] / p.tau_syn_ex;
        dydt[G_EX] = y[DG_EX] - y[G_EX] / p.tau_syn_ex;
        dydt[DG_IN] = -y[DG_IN] / p.tau_syn_in;
        dydt[G_IN] = y[DG_IN] - y[G_IN] / p.tau_syn_in;
        dydt[W] = dw;
    }

    fn check_state(&self, y: &[f64]) -> Result<(), NumericalFault> {
        check_bounds(MODEL, y, W)
    }
}

#[derive(Debug, Clone, Copy)]
struct Variables {
    h: f64,
    spike: SpikeCurrent,
    v_peak: f64,
    g0_ex: f64,
    g0_in: f64,
    refractory_counts: u32,
}

/// Adaptive exponential integrate-and-fire neuron with alpha conductances
#[derive(Debug, Clone)]
pub struct AeifCondAlpha {
    params: AeifCondAlphaParameters,
    tolerances: Tolerances,
    y: [f64; DIMENSION],
    refractory: RefractoryState,
    i_stim: f64,
    spikes_ex: RingBuffer,
    spikes_in: RingBuffer,
    currents: RingBuffer,
    stepper: DormandPrince,
    scratch: StepScratch,
    vars: Option<Variables>,
}

impl Default for AeifCondAlpha {
    fn default() -> Self {
        Self::new()
    }
}

impl AeifCondAlpha {
    pub fn new() -> Self {
        let params = AeifCondAlphaParameters::default();
        let tolerances = Tolerances::default();
        let mut y = [0.0; DIMENSION];
        y[V_M] = params.membrane.e_l;
        Self {
            params,
            tolerances,
            y,
            refractory: RefractoryState::new(),
            i_stim: 0.0,
            spikes_ex: RingBuffer::default(),
            spikes_in: RingBuffer::default(),
            currents: RingBuffer::default(),
            stepper: DormandPrince::new(DIMENSION, tolerances, 0.1),
            scratch: StepScratch::default(),
            vars: None,
        }
    }

    pub fn with_params(params: AeifCondAlphaParameters) -> Result<Self, ConfigurationError> {
        params.validate()?;
        let mut neuron = Self::new();
        neuron.y[V_M] = params.membrane.e_l;
        neuron.params = params;
        Ok(neuron)
    }

    /// Override the integrator tolerances of this instance
    pub fn with_tolerances(mut self, tolerances: Tolerances) -> Result<Self, ConfigurationError> {
        self.set_tolerances(tolerances)?;
        Ok(self)
    }

    pub fn params(&self) -> &AeifCondAlphaParameters {
        &self.params
    }

    pub fn set_params(&mut self, params: AeifCondAlphaParameters) -> Result<(), ConfigurationError> {
        params.validate()?;
        self.params = params;
        self.vars = None;
        Ok(())
    }

    pub fn membrane_potential(&self) -> f64 {
        self.y[V_M]
    }

    pub fn adaptation(&self) -> f64 {
        self.y[W]
    }
}

impl NeuronModel for AeifCondAlpha {
    fn model_name(&self) -> &'static str {
        MODEL
    }

    fn calibrate(&mut self, clock: &dyn Clock) -> Result<(), ConfigurationError> {
        let h = clock.resolution();
        ConfigurationError::require_positive("resolution", h)?;
        let p = &self.params;
        let vars = Variables {
            h,
            spike: SpikeCurrent::select(&p.membrane),
            v_peak: p.membrane.effective_peak(),
            g0_ex: E / p.tau_syn_ex,
            g0_in: E / p.tau_syn_in,
            refractory_counts: refractory_steps(p.membrane.t_ref, h)?,
        };
        debug!(
            "{} calibrated: h={} ms, variant={:?}, V_peak={} mV, refractory_counts={}, tolerances={:?}",
            MODEL, h, vars.spike, vars.v_peak, vars.refractory_counts, self.tolerances
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
        let rule = SpikeRule {
            v_peak: vars.v_peak,
            v_reset: self.params.membrane.v_reset,
            b: self.params.membrane.b,
            refractory_counts: vars.refractory_counts,
            w_index: W,
            precise: self.params.precise_spike_times,
        };

        for lag in from..to {
            let step = ctx.step(lag);
            let mut work = self.y;
            let mut refractory = self.refractory;
            let params = &self.params;
            let i_stim = self.i_stim;

            let stats = integrate_with_threshold(
                &mut self.stepper,
                &mut work,
                &mut refractory,
                vars.h,
                &rule,
                &mut self.scratch,
                |in_refractory| AeifCondAlphaDynamics {
                    p: params,
                    spike: vars.spike,
                    v_peak: vars.v_peak,
                    i_stim,
                    refractory: in_refractory,
                },
            )?;
            trace!(
                "{} step {}: {} accepted, {} rejected",
                MODEL,
                step,
                stats.accepted,
                stats.rejected
            );

            refractory.tick();
            work[DG_EX] += vars.g0_ex * self.spikes_ex.get_value(step);
            work[DG_IN] += vars.g0_in * self.spikes_in.get_value(step);

            self.y = work;
            self.refractory = refractory;
            for offset in &self.scratch.spikes {
                ctx.emit(lag, *offset);
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
        if weight > 0.0 {
            self.spikes_ex.add_value(spike.delivery_step, weight);
        } else {
            self.spikes_in.add_value(spike.delivery_step, -weight);
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
        ["V_m", "dg_ex", "g_ex", "dg_in", "g_in", "w"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn is_precise(&self) -> bool {
        self.params.precise_spike_times
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
