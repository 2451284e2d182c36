// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # iaf_psc_exp_ps: LIF with exponential currents and off-grid spike times
//!
//! Same subthreshold dynamics as [`super::iaf_psc_exp`], but spikes are
//! received and emitted with a continuous offset inside the step.
//!
//! ## Step structure
//!
//! ```text
//! t = 0 ─────── e1 ─────── e2 ───────────── h
//!       ministep   ministep      remainder
//! ```
//!
//! Incoming events of the step (sorted earliest first) split it into
//! ministeps. Each ministep is propagated exactly with coefficients built for
//! its length. If the potential ends above threshold, the crossing is located
//! by bisection on the exact solution, the neuron is reset and the end of
//! the refractory period is scheduled as an event of its own. Events are
//! applied after the threshold check of the ministep they close.

use super::traits::{assign_state, single_port, ModelParameters, NeuronModel};
use crate::buffer::{RingBuffer, SliceRingBuffer};
use crate::context::{Clock, UpdateContext};
use crate::firing::{bisect_crossing, refractory_steps};
use crate::propagator::{ExpPropagator, MembranePropagator};
use crate::types::{
    ConfigurationError, CurrentInput, IllegalConnection, NumericalFault, Port, SpikeInput, Step,
};
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const MODEL: &str = "iaf_psc_exp_ps";

const V_M: usize = 0;
const I_EX: usize = 1;
const I_IN: usize = 2;

/// Width (ms) below which the crossing bracket stops shrinking
const CROSSING_TOLERANCE: f64 = 1.0e-12;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IafPscExpPsParameters {
    #[cfg_attr(feature = "serde", serde(rename = "C_m"))]
    pub c_m: f64,
    pub tau_m: f64,
    pub tau_syn_ex: f64,
    pub tau_syn_in: f64,
    /// Must span at least one step
    pub t_ref: f64,
    #[cfg_attr(feature = "serde", serde(rename = "E_L"))]
    pub e_l: f64,
    #[cfg_attr(feature = "serde", serde(rename = "V_th"))]
    pub v_th: f64,
    #[cfg_attr(feature = "serde", serde(rename = "V_reset"))]
    pub v_reset: f64,
    #[cfg_attr(feature = "serde", serde(rename = "V_min"))]
    pub v_min: Option<f64>,
    #[cfg_attr(feature = "serde", serde(rename = "I_e"))]
    pub i_e: f64,
}

impl Default for IafPscExpPsParameters {
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

impl ModelParameters for IafPscExpPsParameters {
    fn validate(&self) -> Result<(), ConfigurationError> {
        ConfigurationError::require_positive("C_m", self.c_m)?;
        ConfigurationError::require_positive("tau_m", self.tau_m)?;
        ConfigurationError::require_positive("tau_syn_ex", self.tau_syn_ex)?;
        ConfigurationError::require_positive("tau_syn_in", self.tau_syn_in)?;
        ConfigurationError::require_positive("t_ref", self.t_ref)?;
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
                    reason: format!(
                        "V_reset ({}) must not lie below V_min ({})",
                        self.v_reset, v_min
                    ),
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

/// Subthreshold state with the potential relative to `E_L`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Subthreshold {
    v: f64,
    i_ex: f64,
    i_in: f64,
}

impl Subthreshold {
    /// Exact solution after `dt` for constant drive `i_const`
    fn propagated(
        self,
        p: &IafPscExpPsParameters,
        vars: &Variables,
        i_const: f64,
        clamped: bool,
        dt: f64,
    ) -> Self {
        if dt <= 0.0 {
            return self;
        }
        let ex = ExpPropagator::compute(p.tau_syn_ex, p.tau_m, p.c_m, dt);
        let inh = ExpPropagator::compute(p.tau_syn_in, p.tau_m, p.c_m, dt);
        let v = if clamped {
            self.v
        } else {
            let membrane = MembranePropagator::compute(p.tau_m, p.c_m, dt);
            let v = membrane.advance(self.v, i_const)
                + ex.membrane_input(self.i_ex)
                + inh.membrane_input(self.i_in);
            v.max(vars.v_min)
        };
        Self {
            v,
            i_ex: ex.advance(self.i_ex),
            i_in: inh.advance(self.i_in),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Variables {
    h: f64,
    /// Thresholds relative to `E_L`
    v_th: f64,
    v_reset: f64,
    v_min: f64,
    refractory_counts: u32,
}

/// Last emitted spike: step and offset within it
#[derive(Debug, Clone, Copy, PartialEq)]
struct LastSpike {
    step: Step,
    offset: f64,
}

/// Precise-timing LIF neuron with exponential synaptic currents
#[derive(Debug, Clone)]
pub struct IafPscExpPs {
    params: IafPscExpPsParameters,
    /// [V_m, I_syn_ex, I_syn_in]
    y: [f64; 3],
    is_refractory: bool,
    last_spike: Option<LastSpike>,
    i_stim: f64,
    events: SliceRingBuffer,
    currents: RingBuffer,
    vars: Option<Variables>,
}

impl Default for IafPscExpPs {
    fn default() -> Self {
        Self::new()
    }
}

impl IafPscExpPs {
    pub fn new() -> Self {
        let params = IafPscExpPsParameters::default();
        Self {
            y: [params.e_l, 0.0, 0.0],
            params,
            is_refractory: false,
            last_spike: None,
            i_stim: 0.0,
            events: SliceRingBuffer::default(),
            currents: RingBuffer::default(),
            vars: None,
        }
    }

    pub fn with_params(params: IafPscExpPsParameters) -> Result<Self, ConfigurationError> {
        params.validate()?;
        let mut neuron = Self::new();
        neuron.y[V_M] = params.e_l;
        neuron.params = params;
        Ok(neuron)
    }

    pub fn params(&self) -> &IafPscExpPsParameters {
        &self.params
    }

    pub fn set_params(&mut self, params: IafPscExpPsParameters) -> Result<(), ConfigurationError> {
        params.validate()?;
        self.params = params;
        self.vars = None;
        Ok(())
    }

    pub fn membrane_potential(&self) -> f64 {
        self.y[V_M]
    }

    pub fn is_refractory(&self) -> bool {
        self.is_refractory
    }

    /// Absolute time (ms) of the last emitted spike
    pub fn last_spike_time(&self) -> Option<f64> {
        let h = self.vars?.h;
        self.last_spike.map(|s| (s.step + 1) as f64 * h - s.offset)
    }

    fn relative(&self) -> Subthreshold {
        Subthreshold {
            v: self.y[V_M] - self.params.e_l,
            i_ex: self.y[I_EX],
            i_in: self.y[I_IN],
        }
    }

    fn store(&mut self, s: Subthreshold) {
        self.y = [s.v + self.params.e_l, s.i_ex, s.i_in];
    }
}

impl NeuronModel for IafPscExpPs {
    fn model_name(&self) -> &'static str {
        MODEL
    }

    fn calibrate(&mut self, clock: &dyn Clock) -> Result<(), ConfigurationError> {
        let h = clock.resolution();
        ConfigurationError::require_positive("resolution", h)?;
        let p = &self.params;
        let refractory_counts = refractory_steps(p.t_ref, h)?;
        let vars = Variables {
            h,
            v_th: p.v_th - p.e_l,
            v_reset: p.v_reset - p.e_l,
            v_min: p.v_min.map_or(f64::NEG_INFINITY, |v| v - p.e_l),
            refractory_counts,
        };
        debug!(
            "{} calibrated: h={} ms, refractory_counts={}",
            MODEL, h, vars.refractory_counts
        );

        let len = clock.buffer_len();
        self.events.ensure_len(len);
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
        let h = vars.h;

        for lag in from..to {
            let step = ctx.step(lag);
            let i_const = self.params.i_e + self.i_stim;

            // The refractory period of a spike at (s, o) ends in step
            // s + counts at the same offset
            if self.is_refractory {
                if let Some(last) = self.last_spike {
                    if step == last.step + vars.refractory_counts as Step {
                        self.events.add_refractory(step, last.offset);
                    }
                }
            }

            let mut state = self.relative();
            // Offset of the start of the current ministep
            let mut last_offset = h;
            loop {
                let event = self.events.get_next_event(step);
                let end = event.map_or(0.0, |e| e.offset);
                let dt = last_offset - end;

                let before = state;
                let clamped = self.is_refractory;
                state = before.propagated(&self.params, &vars, i_const, clamped, dt);

                if !clamped && state.v >= vars.v_th {
                    let params = &self.params;
                    let t_cross = bisect_crossing(
                        |t| before.propagated(params, &vars, i_const, false, t).v,
                        0.0,
                        dt,
                        vars.v_th,
                        CROSSING_TOLERANCE,
                    );
                    let offset = (last_offset - t_cross).clamp(0.0, h);
                    state.v = vars.v_reset;
                    self.is_refractory = true;
                    self.last_spike = Some(LastSpike { step, offset });
                    ctx.emit(lag, Some(offset));
                }

                match event {
                    Some(e) if e.is_refractory_end => self.is_refractory = false,
                    Some(e) if e.weight >= 0.0 => state.i_ex += e.weight,
                    Some(e) => state.i_in += e.weight,
                    None => break,
                }
                last_offset = end;
            }
            self.store(state);

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
        let offset = spike.offset.unwrap_or(0.0);
        let below_step = self.vars.map_or(true, |vars| offset < vars.h);
        if !(offset >= 0.0 && below_step) {
            return Err(IllegalConnection::OffsetOutOfRange {
                model: MODEL,
                offset,
            });
        }
        self.events
            .add_spike(spike.delivery_step, offset, spike.total_weight());
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
        ["V_m", "I_syn_ex", "I_syn_in"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn is_precise(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ClockSnapshot;
    use crate::types::SpikeEvent;

    const H: f64 = 0.1;

    fn run(neuron: &mut IafPscExpPs, steps: usize) -> (Vec<SpikeEvent>, Vec<(Step, Vec<f64>)>) {
        let clock = ClockSnapshot::new(H).with_delays(steps, steps);
        neuron.calibrate(&clock).unwrap();
        let mut spikes = Vec::new();
        let mut data = Vec::new();
        let mut ctx = UpdateContext::new(&clock, &mut spikes, &mut data);
        neuron.update(&mut ctx, 0, steps).unwrap();
        (spikes, data)
    }

    #[test]
    fn test_constant_drive_matches_analytic_spike_times() {
        // V(t) - E_L = R I (1 - e^{-t/τ}) reaches 15 mV at t* = 10 ln 4
        let mut neuron = IafPscExpPs::with_params(IafPscExpPsParameters {
            i_e: 500.0,
            ..Default::default()
        })
        .unwrap();
        let (spikes, _) = run(&mut neuron, 400);
        assert_eq!(spikes.len(), 2);

        let t_star = 10.0 * 4.0_f64.ln();
        assert_eq!(spikes[0].step(), 138);
        assert!((spikes[0].offset.unwrap() - 0.037056388801094).abs() < 1e-9);
        assert!((spikes[0].time(H) - t_star).abs() < 1e-9);

        // Refractory end is off-grid too, so the second interval is t_ref + t*
        assert_eq!(spikes[1].step(), 297);
        assert!((spikes[1].time(H) - (2.0 * t_star + 2.0)).abs() < 1e-9);
        assert!((spikes[1].offset.unwrap() - 0.074112777602188).abs() < 1e-9);
    }

    #[test]
    fn test_potential_clamped_until_offgrid_refractory_end() {
        let mut neuron = IafPscExpPs::with_params(IafPscExpPsParameters {
            i_e: 500.0,
            ..Default::default()
        })
        .unwrap();
        let (spikes, data) = run(&mut neuron, 200);
        let s = spikes[0].step() as usize;
        for (_, y) in &data[s..s + 20] {
            assert_eq!(y[V_M], -70.0);
        }
        // Released part way through step s + 20
        assert!(data[s + 20].1[V_M] > -70.0);
        assert!(neuron.last_spike_time().is_some());
    }

    #[test]
    fn test_input_offset_shifts_response() {
        let response = |offset: f64| {
            let mut neuron = IafPscExpPs::new();
            neuron
                .deliver_spike(&SpikeInput::new(10, 100.0).with_offset(offset))
                .unwrap();
            let (_, data) = run(&mut neuron, 20);
            data[10].1[V_M]
        };
        // An earlier arrival (larger offset) has had longer to act at step end
        let early = response(0.09);
        let late = response(0.01);
        assert!(early > late);
        assert!(late > -70.0);
    }

    #[test]
    fn test_events_split_step_exactly() {
        // A spike at the very end of the step only changes the current
        let mut neuron = IafPscExpPs::new();
        neuron.deliver_spike(&SpikeInput::new(3, 40.0)).unwrap();
        neuron.deliver_spike(&SpikeInput::new(3, -15.0).with_offset(0.05)).unwrap();
        let (_, data) = run(&mut neuron, 5);
        let y = &data[3].1;
        assert!((y[I_EX] - 40.0).abs() < 1e-12);
        assert!((y[I_IN] + 15.0 * (-0.05_f64 / 2.0).exp()).abs() < 1e-12);
        assert!(y[V_M] < -70.0);
    }

    #[test]
    fn test_offsets_outside_the_step_are_refused() {
        let driven = || {
            IafPscExpPs::with_params(IafPscExpPsParameters {
                i_e: 300.0,
                ..Default::default()
            })
            .unwrap()
        };
        let mut plain = driven();
        let (_, baseline) = run(&mut plain, 1);

        let mut neuron = driven();
        neuron.calibrate(&ClockSnapshot::new(H)).unwrap();
        for offset in [0.5, H, -0.3, f64::NAN] {
            assert!(matches!(
                neuron.deliver_spike(&SpikeInput::new(0, 0.0).with_offset(offset)),
                Err(IllegalConnection::OffsetOutOfRange { .. })
            ));
        }
        // A valid zero-weight event leaves the trajectory untouched
        neuron
            .deliver_spike(&SpikeInput::new(0, 0.0).with_offset(0.05))
            .unwrap();
        let (_, data) = run(&mut neuron, 1);
        assert!((data[0].1[V_M] - baseline[0].1[V_M]).abs() < 1e-12);
    }

    #[test]
    fn test_sub_step_refractory_rejected() {
        let params = IafPscExpPsParameters {
            t_ref: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let mut neuron = IafPscExpPs::with_params(IafPscExpPsParameters {
            t_ref: 0.05,
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(
            neuron.calibrate(&ClockSnapshot::new(H)),
            Err(ConfigurationError::RefractoryBelowResolution { .. })
        ));
    }

    #[test]
    fn test_reports_precise_timing() {
        assert!(IafPscExpPs::new().is_precise());
    }
}
