// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Event descriptors crossing the core boundary
//!
//! Outgoing spikes are handed to a [`crate::context::SpikeSink`]; incoming
//! spikes and currents are written into a neuron's buffers by the external
//! delivery manager.

use super::ids::{Port, Step};

/// Spike emitted by a neuron during an update call.
///
/// `offset` is only set by precise-timing models. It is measured backwards
/// from the right edge of the emitting step and lies in `[0, h)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpikeEvent {
    /// Origin step of the update batch
    pub origin: Step,
    /// Lag of the emitting step relative to `origin`
    pub lag: usize,
    /// Sub-step offset (precise models only)
    pub offset: Option<f64>,
    /// Number of spikes represented by this event
    pub multiplicity: u32,
}

impl SpikeEvent {
    pub fn new(origin: Step, lag: usize, offset: Option<f64>) -> Self {
        Self {
            origin,
            lag,
            offset,
            multiplicity: 1,
        }
    }

    /// Absolute step in which the spike happened
    #[inline]
    pub fn step(&self) -> Step {
        self.origin + self.lag as Step
    }

    /// Spike time in ms for a given resolution
    pub fn time(&self, resolution: f64) -> f64 {
        (self.step() + 1) as f64 * resolution - self.offset.unwrap_or(0.0)
    }
}

/// Spike arriving at a neuron, already delayed by the delivery manager.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpikeInput {
    /// Step in which the spike takes effect
    pub delivery_step: Step,
    /// Receptor the connection targets
    pub port: Port,
    /// Synaptic weight (pA for current-based, nS for conductance-based models)
    pub weight: f64,
    pub multiplicity: u32,
    /// Sub-step offset for precise models; `None` means the end of the step
    pub offset: Option<f64>,
}

impl SpikeInput {
    pub fn new(delivery_step: Step, weight: f64) -> Self {
        Self {
            delivery_step,
            port: Port::DEFAULT,
            weight,
            multiplicity: 1,
            offset: None,
        }
    }

    pub fn at_port(mut self, port: Port) -> Self {
        self.port = port;
        self
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_multiplicity(mut self, multiplicity: u32) -> Self {
        self.multiplicity = multiplicity;
        self
    }

    /// Weight scaled by multiplicity
    #[inline]
    pub fn total_weight(&self) -> f64 {
        self.weight * self.multiplicity as f64
    }
}

/// Current injection (pA) taking effect during the step after `delivery_step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentInput {
    pub delivery_step: Step,
    pub port: Port,
    pub amplitude: f64,
}

impl CurrentInput {
    pub fn new(delivery_step: Step, amplitude: f64) -> Self {
        Self {
            delivery_step,
            port: Port::DEFAULT,
            amplitude,
        }
    }
}
