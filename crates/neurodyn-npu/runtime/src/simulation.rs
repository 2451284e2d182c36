// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! Min-delay batch runner
//!
//! ```text
//! calibrate all ──► for each batch of min_delay steps:
//!                      update(neuron, ctx, 0, len) for every neuron
//!                      clock.advance(len)
//! ```
//!
//! A numerical fault stops the run at the failing batch. Neurons updated
//! before the fault keep their progress; the failing neuron keeps the state
//! of its last completed step.

use crate::clock::SimulationClock;
use crate::error::{Result, RuntimeError};
use crate::recorder::{Multimeter, SpikeRecorder};
use neurodyn_npu_neural::{
    Clock, CurrentInput, IllegalConnection, NeuronId, NeuronModel, Port, SpikeInput, Step,
    Tolerances, UpdateContext,
};
use tracing::{debug, error, info, warn};

/// Clock and integrator settings of a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationSettings {
    /// Step length h (ms)
    pub resolution_ms: f64,
    /// Batch length (steps)
    pub min_delay_steps: usize,
    /// Longest scheduling horizon (steps)
    pub max_delay_steps: usize,
    /// Default tolerances for adaptive models
    pub tolerances: Tolerances,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            resolution_ms: 0.1,
            min_delay_steps: 1,
            max_delay_steps: 100,
            tolerances: Tolerances::default(),
        }
    }
}

/// A population of independent neurons sharing one clock
pub struct Simulation {
    clock: SimulationClock,
    tolerances: Tolerances,
    neurons: Vec<Box<dyn NeuronModel>>,
    spikes: SpikeRecorder,
    multimeter: Multimeter,
    calibrated: bool,
    aborted: bool,
}

impl Simulation {
    /// Create an empty simulation at step 0
    pub fn new(settings: SimulationSettings) -> Result<Self> {
        settings
            .tolerances
            .validate()
            .map_err(|e| RuntimeError::InvalidSettings(e.to_string()))?;
        let clock = SimulationClock::new(
            settings.resolution_ms,
            settings.min_delay_steps,
            settings.max_delay_steps,
        )?;
        info!(
            "Simulation created: h={} ms, min_delay={} steps, max_delay={} steps",
            settings.resolution_ms, settings.min_delay_steps, settings.max_delay_steps
        );
        Ok(Self {
            clock,
            tolerances: settings.tolerances,
            neurons: Vec::new(),
            spikes: SpikeRecorder::new(),
            multimeter: Multimeter::new(),
            calibrated: false,
            aborted: false,
        })
    }

    /// Replace the multimeter, e.g. with [`Multimeter::only`]
    pub fn with_multimeter(mut self, multimeter: Multimeter) -> Self {
        self.multimeter = multimeter;
        self
    }

    /// Integrator tolerances of this run
    pub fn tolerances(&self) -> Tolerances {
        self.tolerances
    }

    /// Add one neuron; it is calibrated before the next batch.
    ///
    /// Adaptive models take the run's tolerances. Override them afterwards
    /// through [`Self::neuron_mut`].
    pub fn add_neuron(&mut self, mut neuron: Box<dyn NeuronModel>) -> NeuronId {
        let id = NeuronId(self.neurons.len() as u32);
        if let Err(e) = neuron.set_tolerances(self.tolerances) {
            warn!("{} kept its own tolerances: {}", neuron.model_name(), e);
        }
        debug!("Added {} as {}", neuron.model_name(), id);
        self.neurons.push(neuron);
        self.calibrated = false;
        id
    }

    /// Add `count` neurons built by `make`
    pub fn add_population<F>(&mut self, count: usize, mut make: F) -> Vec<NeuronId>
    where
        F: FnMut(usize) -> Box<dyn NeuronModel>,
    {
        (0..count).map(|i| self.add_neuron(make(i))).collect()
    }

    /// Number of neurons
    pub fn len(&self) -> usize {
        self.neurons.len()
    }

    /// True if no neuron was added
    pub fn is_empty(&self) -> bool {
        self.neurons.is_empty()
    }

    /// Borrow a neuron
    pub fn neuron(&self, id: NeuronId) -> Result<&dyn NeuronModel> {
        self.neurons
            .get(id.0 as usize)
            .map(|n| n.as_ref())
            .ok_or(RuntimeError::UnknownNeuron(id))
    }

    /// Borrow a neuron mutably; it is recalibrated before the next batch
    pub fn neuron_mut(&mut self, id: NeuronId) -> Result<&mut dyn NeuronModel> {
        self.calibrated = false;
        match self.neurons.get_mut(id.0 as usize) {
            Some(n) => Ok(n.as_mut()),
            None => Err(RuntimeError::UnknownNeuron(id)),
        }
    }

    /// Check that `id` accepts input on `port` before wiring anything to it
    pub fn validate_connection(&self, id: NeuronId, port: Port) -> Result<()> {
        self.neuron(id)?
            .handles_port(port)
            .map_err(|source| RuntimeError::Connection { neuron: id, source })
    }

    /// Schedule a spike; `delivery_step` must not have been simulated yet
    pub fn deliver_spike(&mut self, id: NeuronId, spike: SpikeInput) -> Result<()> {
        self.check_delivery(id, spike.delivery_step)?;
        let resolution = self.clock.resolution();
        let neuron = self.slot(id)?;
        if let Some(offset) = spike.offset {
            if !(0.0..resolution).contains(&offset) {
                return Err(RuntimeError::Connection {
                    neuron: id,
                    source: IllegalConnection::OffsetOutOfRange {
                        model: neuron.model_name(),
                        offset,
                    },
                });
            }
        }
        neuron
            .deliver_spike(&spike)
            .map_err(|source| RuntimeError::Connection { neuron: id, source })
    }

    /// Schedule a current step change; it acts from `delivery_step + 1`
    pub fn deliver_current(&mut self, id: NeuronId, current: CurrentInput) -> Result<()> {
        self.check_delivery(id, current.delivery_step)?;
        let neuron = self.slot(id)?;
        neuron
            .deliver_current(&current)
            .map_err(|source| RuntimeError::Connection { neuron: id, source })
    }

    /// Calibrate every neuron against the clock
    pub fn calibrate(&mut self) -> Result<()> {
        for (index, neuron) in self.neurons.iter_mut().enumerate() {
            neuron
                .calibrate(&self.clock)
                .map_err(|source| RuntimeError::Calibration {
                    neuron: NeuronId(index as u32),
                    source,
                })?;
        }
        self.calibrated = true;
        debug!("Calibrated {} neurons", self.neurons.len());
        Ok(())
    }

    /// Advance the run by `steps` steps in batches of `min_delay`
    pub fn simulate(&mut self, steps: usize) -> Result<()> {
        if self.aborted {
            return Err(RuntimeError::Aborted);
        }
        if !self.calibrated {
            self.calibrate()?;
        }

        let batch = self.clock.min_delay();
        let mut remaining = steps;
        while remaining > 0 {
            let len = batch.min(remaining);
            self.run_batch(len)?;
            self.clock.advance(len);
            remaining -= len;
        }
        debug!(
            "Simulated {} steps, now at step {} ({} ms), {} spikes recorded",
            steps,
            self.clock.origin(),
            self.clock.time_ms(),
            self.spikes.len()
        );
        Ok(())
    }

    fn run_batch(&mut self, len: usize) -> Result<()> {
        let origin = self.clock.origin();
        for (index, neuron) in self.neurons.iter_mut().enumerate() {
            let id = NeuronId(index as u32);
            let mut spikes = self.spikes.for_neuron(id);
            let mut trace = self.multimeter.for_neuron(id);
            let mut ctx = UpdateContext::new(&self.clock, &mut spikes, &mut trace);
            if let Err(fault) = neuron.update(&mut ctx, 0, len) {
                error!(
                    "{} ({}) aborted the run in batch starting at step {}: {}",
                    id,
                    neuron.model_name(),
                    origin,
                    fault
                );
                self.aborted = true;
                return Err(RuntimeError::Numerical {
                    neuron: id,
                    batch_origin: origin,
                    source: fault,
                });
            }
        }
        Ok(())
    }

    fn check_delivery(&self, id: NeuronId, step: Step) -> Result<()> {
        let current = self.clock.origin();
        if step < current {
            return Err(RuntimeError::LateDelivery {
                neuron: id,
                step,
                current,
            });
        }
        Ok(())
    }

    fn slot(&mut self, id: NeuronId) -> Result<&mut Box<dyn NeuronModel>> {
        self.neurons
            .get_mut(id.0 as usize)
            .ok_or(RuntimeError::UnknownNeuron(id))
    }

    /// The run's clock
    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// Current time (ms)
    pub fn time_ms(&self) -> f64 {
        self.clock.time_ms()
    }

    /// Recorded spikes
    pub fn spikes(&self) -> &SpikeRecorder {
        &self.spikes
    }

    /// Recorded state traces
    pub fn multimeter(&self) -> &Multimeter {
        &self.multimeter
    }

    /// True once a numerical fault has ended the run
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurodyn_npu_neural::models::{AeifCondAlphaParameters, IafPscExpParameters};
    use neurodyn_npu_neural::{AeifCondAlpha, IafPscExp};

    fn settings(min_delay: usize) -> SimulationSettings {
        SimulationSettings {
            min_delay_steps: min_delay,
            max_delay_steps: 20,
            ..Default::default()
        }
    }

    #[test]
    fn test_batches_cover_every_step_once() {
        let mut sim = Simulation::new(settings(4)).unwrap();
        let id = sim.add_neuron(Box::new(IafPscExp::new()));
        sim.simulate(10).unwrap();
        sim.simulate(3).unwrap();

        let steps: Vec<_> = sim
            .multimeter()
            .trace(id)
            .unwrap()
            .iter()
            .map(|(s, _)| *s)
            .collect();
        assert_eq!(steps, (0..13).collect::<Vec<_>>());
        assert_eq!(sim.clock().origin(), 13);
    }

    #[test]
    fn test_population_fires_independently() {
        let mut sim = Simulation::new(settings(5)).unwrap();
        let ids = sim.add_population(3, |i| {
            Box::new(
                IafPscExp::with_params(IafPscExpParameters {
                    i_e: 400.0 + 200.0 * i as f64,
                    ..Default::default()
                })
                .unwrap(),
            )
        });
        sim.simulate(1000).unwrap();

        let counts: Vec<usize> = ids
            .iter()
            .map(|id| sim.spikes().spikes_of(*id).count())
            .collect();
        assert!(counts[0] > 0);
        assert!(counts[0] < counts[1] && counts[1] < counts[2]);
    }

    #[test]
    fn test_late_and_misrouted_input_rejected() {
        let mut sim = Simulation::new(settings(2)).unwrap();
        let id = sim.add_neuron(Box::new(IafPscExp::new()));
        sim.simulate(10).unwrap();

        assert!(matches!(
            sim.deliver_spike(id, SpikeInput::new(5, 1.0)),
            Err(RuntimeError::LateDelivery { .. })
        ));
        assert!(matches!(
            sim.deliver_spike(id, SpikeInput::new(12, 1.0).at_port(Port(2))),
            Err(RuntimeError::Connection { .. })
        ));
        assert!(sim.validate_connection(id, Port(0)).is_ok());
        let h = sim.clock().resolution();
        for offset in [h, 1.5 * h, -0.01] {
            assert!(matches!(
                sim.deliver_spike(id, SpikeInput::new(12, 1.0).with_offset(offset)),
                Err(RuntimeError::Connection {
                    source: IllegalConnection::OffsetOutOfRange { .. },
                    ..
                })
            ));
        }
        assert!(sim
            .deliver_spike(id, SpikeInput::new(12, 1.0).with_offset(0.5 * h))
            .is_ok());
        assert!(matches!(
            sim.deliver_current(NeuronId(9), CurrentInput::new(12, 1.0)),
            Err(RuntimeError::UnknownNeuron(_))
        ));
    }

    #[test]
    fn test_numerical_fault_aborts_run() {
        let mut sim = Simulation::new(settings(10)).unwrap();
        let healthy = sim.add_neuron(Box::new(IafPscExp::new()));
        let mut params = AeifCondAlphaParameters::default();
        params.membrane.i_e = 5000.0;
        params.membrane.b = 5.0e6;
        let runaway = sim.add_neuron(Box::new(AeifCondAlpha::with_params(params).unwrap()));

        let err = sim.simulate(500).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, RuntimeError::Numerical { neuron, .. } if neuron == runaway));
        assert!(sim.is_aborted());
        assert!(sim.multimeter().trace(healthy).is_some());
        assert_eq!(sim.simulate(10), Err(RuntimeError::Aborted));
    }

    #[test]
    fn test_adaptive_models_take_run_tolerances() {
        let tolerances = Tolerances::new(1e-9, 1e-5);
        let mut sim = Simulation::new(SimulationSettings {
            tolerances,
            ..Default::default()
        })
        .unwrap();
        let adaptive = sim.add_neuron(Box::new(AeifCondAlpha::new()));
        let exact = sim.add_neuron(Box::new(IafPscExp::new()));
        assert_eq!(sim.neuron(adaptive).unwrap().tolerances(), Some(tolerances));
        assert_eq!(sim.neuron(exact).unwrap().tolerances(), None);

        // Per-neuron override after adding
        let loose = Tolerances::new(1e-6, 1e-3);
        sim.neuron_mut(adaptive).unwrap().set_tolerances(loose).unwrap();
        sim.simulate(10).unwrap();
        assert_eq!(sim.neuron(adaptive).unwrap().tolerances(), Some(loose));
    }

    #[test]
    fn test_invalid_tolerances_rejected() {
        let result = Simulation::new(SimulationSettings {
            tolerances: Tolerances::new(1e-10, 0.0),
            ..Default::default()
        });
        assert!(matches!(result, Err(RuntimeError::InvalidSettings(_))));
    }
}
