// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # aeif_cond_alpha_multisynapse: AdEx with a configurable receptor set
//!
//! Every receptor `i` (port `i + 1`) has its own reversal potential and
//! alpha-conductance time constant:
//!
//! ```text
//! I_syn = Σ_i g_i (V - E_rev_i)
//! ```
//!
//! ## State layout
//!
//! ```text
//! [ V_m, w, dg_1, g_1, dg_2, g_2, ..., dg_n, g_n ]
//!   0    1  2     3    2+2i  3+2i
//! ```

use super::adex::{
    check_bounds, integrate_with_threshold, AdaptiveMembrane, SpikeCurrent, SpikeRule,
    StepScratch,
};
use super::traits::{assign_state, ModelParameters, NeuronModel};
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

const MODEL: &str = "aeif_cond_alpha_multisynapse";

const V_M: usize = 0;
const W: usize = 1;
/// Index of the first receptor block
const RECEPTOR_BASE: usize = 2;
/// Variables per receptor (dg, g)
const RECEPTOR_STRIDE: usize = 2;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AeifCondAlphaMultisynapseParameters {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub membrane: AdaptiveMembrane,
    /// Reversal potential per receptor (mV)
    #[cfg_attr(feature = "serde", serde(rename = "E_rev"))]
    pub e_rev: Vec<f64>,
    /// Conductance time constant per receptor (ms)
    pub tau_syn: Vec<f64>,
}

impl Default for AeifCondAlphaMultisynapseParameters {
    fn default() -> Self {
        Self {
            membrane: AdaptiveMembrane::default(),
            e_rev: vec![0.0],
            tau_syn: vec![2.0],
        }
    }
}

impl AeifCondAlphaMultisynapseParameters {
    pub fn n_receptors(&self) -> usize {
        self.tau_syn.len()
    }
}

impl ModelParameters for AeifCondAlphaMultisynapseParameters {
    fn validate(&self) -> Result<(), ConfigurationError> {
        self.membrane.validate()?;
        if self.e_rev.len() != self.tau_syn.len() {
            return Err(ConfigurationError::ReceptorMismatch {
                e_rev: self.e_rev.len(),
                tau_syn: self.tau_syn.len(),
            });
        }
        for (&e_rev, &tau) in self.e_rev.iter().zip(&self.tau_syn) {
            ConfigurationError::require_finite("E_rev", e_rev)?;
            ConfigurationError::require_positive("tau_syn", tau)?;
        }
        Ok(())
    }
}

#[inline]
fn dg_index(receptor: usize) -> usize {
    RECEPTOR_BASE + RECEPTOR_STRIDE * receptor
}

#[inline]
fn g_index(receptor: usize) -> usize {
    dg_index(receptor) + 1
}

#[inline]
fn dimension(n_receptors: usize) -> usize {
    RECEPTOR_BASE + RECEPTOR_STRIDE * n_receptors
}

struct MultisynapseDynamics<'a> {
    p: &'a AeifCondAlphaMultisynapseParameters,
    spike: SpikeCurrent,
    v_peak: f64,
    i_stim: f64,
    refractory: bool,
}

impl Dynamics for MultisynapseDynamics<'_> {
    fn model_name(&self) -> &'static str {
        MODEL
    }

    fn dimension(&self) -> usize {
        dimension(self.p.n_receptors())
    }

    fn derivative(&self, y: &[f64], dydt: &mut [f64]) {
        let p = self.p;
        let v = p
            .membrane
            .clamped_potential(y[V_M], self.refractory, self.v_peak);

        let mut i_syn = 0.0;
        for (i, (&e_rev, &tau)) in p.e_rev.iter().zip(&p.tau_syn).enumerate() {
            let (dg, g) = (dg_index(i), g_index(i));
            i_syn += y[g] * (v - e_rev);
            dydt[dg] = -y[dg] / tau;
            dydt[g] = y[dg] - y[g] / tau;
        }

        let (dv, dw) = p
            .membrane
            .derivatives(self.spike, v, y[W], i_syn, self.i_stim, self.refractory);
        dydt[V_M] = dv;
        dydt[W] = dw;
    }

    fn check_state(&self, y: &[f64]) -> Result<(), NumericalFault> {
        check_bounds(MODEL, y, W)
    }
}

#[derive(Debug, Clone)]
struct Variables {
    h: f64,
    spike: SpikeCurrent,
    v_peak: f64,
    /// e/τ_i per receptor
    g0: Vec<f64>,
    refractory_counts: u32,
}

/// Adaptive exponential IF neuron with `n` alpha-conductance receptors
#[derive(Debug, Clone)]
pub struct AeifCondAlphaMultisynapse {
    params: AeifCondAlphaMultisynapseParameters,
    tolerances: Tolerances,
    y: Vec<f64>,
    work: Vec<f64>,
    refractory: RefractoryState,
    i_stim: f64,
    /// One buffer per receptor
    spikes: Vec<RingBuffer>,
    currents: RingBuffer,
    stepper: DormandPrince,
    scratch: StepScratch,
    vars: Option<Variables>,
}

impl Default for AeifCondAlphaMultisynapse {
    fn default() -> Self {
        Self::new()
    }
}

impl AeifCondAlphaMultisynapse {
    pub fn new() -> Self {
        let params = AeifCondAlphaMultisynapseParameters::default();
        let tolerances = Tolerances::default();
        let dim = dimension(params.n_receptors());
        let mut y = vec![0.0; dim];
        y[V_M] = params.membrane.e_l;
        Self {
            spikes: vec![RingBuffer::default(); params.n_receptors()],
            params,
            tolerances,
            y,
            work: Vec::with_capacity(dim),
            refractory: RefractoryState::new(),
            i_stim: 0.0,
            currents: RingBuffer::default(),
            stepper: DormandPrince::new(dim, tolerances, 0.1),
            scratch: StepScratch::default(),
            vars: None,
        }
    }

    pub fn with_params(
        params: AeifCondAlphaMultisynapseParameters,
    ) -> Result<Self, ConfigurationError> {
        let mut neuron = Self::new();
        neuron.set_params(params)?;
        neuron.y[V_M] = neuron.params.membrane.e_l;
        Ok(neuron)
    }

    pub fn with_tolerances(mut self, tolerances: Tolerances) -> Result<Self, ConfigurationError> {
        self.set_tolerances(tolerances)?;
        Ok(self)
    }

    pub fn params(&self) -> &AeifCondAlphaMultisynapseParameters {
        &self.params
    }

    /// Replace all parameters. A changed receptor count resizes the state;
    /// surviving receptors keep their conductances and pending input.
    pub fn set_params(
        &mut self,
        params: AeifCondAlphaMultisynapseParameters,
    ) -> Result<(), ConfigurationError> {
        params.validate()?;
        let n = params.n_receptors();
        if n != self.params.n_receptors() {
            self.y.resize(dimension(n), 0.0);
            self.spikes.resize(n, RingBuffer::default());
        }
        self.params = params;
        self.vars = None;
        Ok(())
    }

    pub fn n_receptors(&self) -> usize {
        self.params.n_receptors()
    }

    /// Conductance `g` of receptor `port` (1-based)
    pub fn conductance(&self, port: Port) -> Option<f64> {
        self.receptor(port).map(|i| self.y[g_index(i)])
    }

    pub fn membrane_potential(&self) -> f64 {
        self.y[V_M]
    }

    /// Receptor index of a 1-based port
    fn receptor(&self, port: Port) -> Option<usize> {
        (1..=self.n_receptors())
            .contains(&port.0)
            .then(|| port.0 - 1)
    }
}

impl NeuronModel for AeifCondAlphaMultisynapse {
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
            g0: p.tau_syn.iter().map(|tau| E / tau).collect(),
            refractory_counts: refractory_steps(p.membrane.t_ref, h)?,
        };
        debug!(
            "{} calibrated: h={} ms, receptors={}, variant={:?}, refractory_counts={}",
            MODEL,
            h,
            p.n_receptors(),
            vars.spike,
            vars.refractory_counts
        );

        let dim = dimension(p.n_receptors());
        self.stepper.reset(dim, self.tolerances, h);
        let len = clock.buffer_len();
        for buffer in self.spikes.iter_mut() {
            buffer.ensure_len(len);
        }
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
        let vars = self
            .vars
            .as_ref()
            .ok_or(NumericalFault::Uncalibrated { model: MODEL })?;
        let rule = SpikeRule {
            v_peak: vars.v_peak,
            v_reset: self.params.membrane.v_reset,
            b: self.params.membrane.b,
            refractory_counts: vars.refractory_counts,
            w_index: W,
            precise: false,
        };

        for lag in from..to {
            let step = ctx.step(lag);
            self.work.clear();
            self.work.extend_from_slice(&self.y);
            let mut refractory = self.refractory;
            let params = &self.params;
            let i_stim = self.i_stim;

            let stats = integrate_with_threshold(
                &mut self.stepper,
                &mut self.work,
                &mut refractory,
                vars.h,
                &rule,
                &mut self.scratch,
                |in_refractory| MultisynapseDynamics {
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
            for (i, buffer) in self.spikes.iter_mut().enumerate() {
                self.work[dg_index(i)] += vars.g0[i] * buffer.get_value(step);
            }

            core::mem::swap(&mut self.y, &mut self.work);
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
        self.receptor(port)
            .map(|_| ())
            .ok_or_else(|| IllegalConnection::UnknownReceptor {
                model: MODEL,
                port: port.0,
                valid: format!("1..={}", self.n_receptors()),
            })
    }

    fn deliver_spike(&mut self, spike: &SpikeInput) -> Result<(), IllegalConnection> {
        self.handles_port(spike.port)?;
        if spike.weight < 0.0 {
            return Err(IllegalConnection::NegativeWeight {
                model: MODEL,
                weight: spike.weight,
            });
        }
        if let Some(i) = self.receptor(spike.port) {
            self.spikes[i].add_value(spike.delivery_step, spike.total_weight());
        }
        Ok(())
    }

    fn deliver_current(&mut self, current: &CurrentInput) -> Result<(), IllegalConnection> {
        if current.port != Port::DEFAULT {
            return Err(IllegalConnection::UnknownReceptor {
                model: MODEL,
                port: current.port.0,
                valid: "0 (currents)".to_string(),
            });
        }
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
        let mut labels = vec!["V_m".to_string(), "w".to_string()];
        for i in 1..=self.n_receptors() {
            labels.push(format!("dg_{}", i));
            labels.push(format!("g_{}", i));
        }
        labels
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
