// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! In-memory spike and state recorders
//!
//! Models only see the `SpikeSink` / `DataSink` traits. The recorders here
//! collect output for a whole population; [`SpikeRecorder::for_neuron`] and
//! [`Multimeter::for_neuron`] hand out sinks stamped with the neuron id.

use ahash::{AHashMap, AHashSet};
use neurodyn_npu_neural::{DataSink, NeuronId, SpikeEvent, SpikeSink, Step};

/// Spikes of every neuron, in emission order
#[derive(Debug, Clone, Default)]
pub struct SpikeRecorder {
    events: Vec<(NeuronId, SpikeEvent)>,
}

impl SpikeRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that stamps each spike with `neuron`
    pub fn for_neuron(&mut self, neuron: NeuronId) -> NeuronSpikes<'_> {
        NeuronSpikes {
            neuron,
            recorder: self,
        }
    }

    /// All recorded spikes
    pub fn events(&self) -> &[(NeuronId, SpikeEvent)] {
        &self.events
    }

    /// Spikes of one neuron
    pub fn spikes_of(&self, neuron: NeuronId) -> impl Iterator<Item = &SpikeEvent> + '_ {
        self.events
            .iter()
            .filter(move |(id, _)| *id == neuron)
            .map(|(_, spike)| spike)
    }

    /// Spike times (ms) of one neuron, offsets included
    pub fn times_of(&self, neuron: NeuronId, resolution: f64) -> Vec<f64> {
        self.spikes_of(neuron).map(|s| s.time(resolution)).collect()
    }

    /// Total number of recorded spikes
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if nothing fired
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Forget all spikes
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// [`SpikeSink`] for one neuron, borrowed from a [`SpikeRecorder`]
pub struct NeuronSpikes<'a> {
    neuron: NeuronId,
    recorder: &'a mut SpikeRecorder,
}

impl SpikeSink for NeuronSpikes<'_> {
    fn send_spike(&mut self, spike: SpikeEvent) {
        self.recorder.events.push((self.neuron, spike));
    }
}

/// Post-step state traces per neuron
#[derive(Debug, Clone, Default)]
pub struct Multimeter {
    traces: AHashMap<NeuronId, Vec<(Step, Vec<f64>)>>,
    /// Restrict recording to these neurons; `None` records everyone
    selection: Option<AHashSet<NeuronId>>,
}

impl Multimeter {
    /// Record every neuron
    pub fn new() -> Self {
        Self::default()
    }

    /// Record only the given neurons
    pub fn only<I: IntoIterator<Item = NeuronId>>(neurons: I) -> Self {
        Self {
            traces: AHashMap::new(),
            selection: Some(neurons.into_iter().collect()),
        }
    }

    /// Whether `neuron` is being recorded
    pub fn records(&self, neuron: NeuronId) -> bool {
        self.selection
            .as_ref()
            .map_or(true, |selected| selected.contains(&neuron))
    }

    /// Sink that files records under `neuron`
    pub fn for_neuron(&mut self, neuron: NeuronId) -> NeuronTrace<'_> {
        let enabled = self.records(neuron);
        NeuronTrace {
            neuron,
            enabled,
            multimeter: self,
        }
    }

    /// `(step, state)` samples of one neuron
    pub fn trace(&self, neuron: NeuronId) -> Option<&[(Step, Vec<f64>)]> {
        self.traces.get(&neuron).map(Vec::as_slice)
    }

    /// One state component of one neuron over time
    pub fn component(&self, neuron: NeuronId, index: usize) -> Vec<f64> {
        self.trace(neuron)
            .map(|t| t.iter().filter_map(|(_, y)| y.get(index).copied()).collect())
            .unwrap_or_default()
    }

    /// Drop all samples, keeping the selection
    pub fn clear(&mut self) {
        self.traces.clear();
    }
}

/// [`DataSink`] for one neuron, borrowed from a [`Multimeter`]
pub struct NeuronTrace<'a> {
    neuron: NeuronId,
    enabled: bool,
    multimeter: &'a mut Multimeter,
}

impl DataSink for NeuronTrace<'_> {
    fn record(&mut self, step: Step, state: &[f64]) {
        if self.enabled {
            self.multimeter
                .traces
                .entry(self.neuron)
                .or_default()
                .push((step, state.to_vec()));
        }
    }
}
