// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Update context
//!
//! The narrow interfaces a neuron sees of the surrounding simulator: a
//! read-only clock, a sink for emitted spikes and a sink for recorded state.
//! The scheduler builds an [`UpdateContext`] per neuron and batch; there is
//! no global kernel to reach into.

use crate::types::{SpikeEvent, Step};

/// Read-only view of the global simulation clock
pub trait Clock {
    /// Step length h (ms)
    fn resolution(&self) -> f64;

    /// First step of the current min-delay batch
    fn origin(&self) -> Step;

    /// Minimal connection delay (steps); also the batch length
    fn min_delay(&self) -> usize;

    /// Maximal connection delay (steps)
    fn max_delay(&self) -> usize;

    /// Ring length needed to hold every step an input can be scheduled for
    fn buffer_len(&self) -> usize {
        self.min_delay() + self.max_delay()
    }
}

/// Plain clock value, handy for calibration and tests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSnapshot {
    pub resolution: f64,
    pub origin: Step,
    pub min_delay: usize,
    pub max_delay: usize,
}

impl ClockSnapshot {
    pub fn new(resolution: f64) -> Self {
        Self {
            resolution,
            origin: 0,
            min_delay: 1,
            max_delay: 1,
        }
    }

    pub fn with_delays(mut self, min_delay: usize, max_delay: usize) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn at_origin(mut self, origin: Step) -> Self {
        self.origin = origin;
        self
    }
}

impl Clock for ClockSnapshot {
    fn resolution(&self) -> f64 {
        self.resolution
    }
    fn origin(&self) -> Step {
        self.origin
    }
    fn min_delay(&self) -> usize {
        self.min_delay
    }
    fn max_delay(&self) -> usize {
        self.max_delay
    }
}

/// Receives spikes emitted during an update call
pub trait SpikeSink {
    fn send_spike(&mut self, spike: SpikeEvent);
}

/// Receives the post-step state of a neuron
pub trait DataSink {
    fn record(&mut self, step: Step, state: &[f64]);
}

impl SpikeSink for Vec<SpikeEvent> {
    fn send_spike(&mut self, spike: SpikeEvent) {
        self.push(spike);
    }
}

impl DataSink for Vec<(Step, Vec<f64>)> {
    fn record(&mut self, step: Step, state: &[f64]) {
        self.push((step, state.to_vec()));
    }
}

/// Discards everything; for callers that do not record
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl SpikeSink for NullSink {
    fn send_spike(&mut self, _spike: SpikeEvent) {}
}

impl DataSink for NullSink {
    fn record(&mut self, _step: Step, _state: &[f64]) {}
}

/// Everything an update call may touch outside the neuron itself
pub struct UpdateContext<'a> {
    pub clock: &'a dyn Clock,
    pub spikes: &'a mut dyn SpikeSink,
    pub recorder: &'a mut dyn DataSink,
}

impl<'a> UpdateContext<'a> {
    pub fn new(
        clock: &'a dyn Clock,
        spikes: &'a mut dyn SpikeSink,
        recorder: &'a mut dyn DataSink,
    ) -> Self {
        Self {
            clock,
            spikes,
            recorder,
        }
    }

    #[inline]
    pub fn origin(&self) -> Step {
        self.clock.origin()
    }

    #[inline]
    pub fn resolution(&self) -> f64 {
        self.clock.resolution()
    }

    /// Absolute step of `lag` within the current batch
    #[inline]
    pub fn step(&self, lag: usize) -> Step {
        self.clock.origin() + lag as Step
    }

    /// Emit one spike at `lag`, with an optional sub-step offset
    pub fn emit(&mut self, lag: usize, offset: Option<f64>) {
        let spike = SpikeEvent::new(self.clock.origin(), lag, offset);
        tracing::trace!(
            target: "neurodyn_npu_neural",
            step = spike.step(),
            offset = ?offset,
            "spike emitted"
        );
        self.spikes.send_spike(spike);
    }

    /// Record the post-step state of `lag`
    pub fn record(&mut self, lag: usize, state: &[f64]) {
        let step = self.step(lag);
        self.recorder.record(step, state);
    }
}
