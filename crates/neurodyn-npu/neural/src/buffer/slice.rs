// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Offset-resolved event ring for precise-timing models

use super::DEFAULT_BUFFER_LEN;
use crate::types::Step;
use tracing::warn;

/// One buffered event inside a step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreciseEvent {
    pub step: Step,
    /// Measured back from the end of the step, in `[0, h)`
    pub offset: f64,
    pub weight: f64,
    /// Marks the end of the emitting neuron's own refractory period
    pub is_refractory_end: bool,
}

/// Events bucketed by `step mod len`, each tagged with its absolute step.
///
/// Draining a step sorts its events by time. [`Self::get_next_event`] then
/// yields them earliest first (largest offset first); at equal offsets a
/// refractory end comes before spikes.
#[derive(Debug, Clone)]
pub struct SliceRingBuffer {
    buckets: Vec<Vec<PreciseEvent>>,
    /// Events of `current_step`, latest first so `pop` yields the earliest
    current: Vec<PreciseEvent>,
    current_step: Option<Step>,
}

impl Default for SliceRingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_LEN)
    }
}

impl SliceRingBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            buckets: vec![Vec::new(); len.max(1)],
            current: Vec::new(),
            current_step: None,
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.buckets.iter().all(Vec::is_empty)
    }

    pub fn ensure_len(&mut self, len: usize) {
        if len <= self.buckets.len() {
            return;
        }
        let old = core::mem::replace(&mut self.buckets, vec![Vec::new(); len]);
        for event in old.into_iter().flatten() {
            let idx = self.index(event.step);
            self.buckets[idx].push(event);
        }
    }

    pub fn add_spike(&mut self, step: Step, offset: f64, weight: f64) {
        self.push(PreciseEvent {
            step,
            offset,
            weight,
            is_refractory_end: false,
        });
    }

    pub fn add_refractory(&mut self, step: Step, offset: f64) {
        self.push(PreciseEvent {
            step,
            offset,
            weight: 0.0,
            is_refractory_end: true,
        });
    }

    /// Earliest remaining event of `step`, if any.
    ///
    /// The first call for a step collects that step's events; events left
    /// over from earlier steps are discarded at that point.
    pub fn get_next_event(&mut self, step: Step) -> Option<PreciseEvent> {
        if self.current_step != Some(step) {
            self.prepare(step);
        }
        self.current.pop()
    }

    fn push(&mut self, event: PreciseEvent) {
        match self.current_step {
            Some(current) if event.step == current => {
                let pos = self.current.partition_point(|e| precedes(e, &event));
                self.current.insert(pos, event);
            }
            Some(current) if event.step < current => {
                warn!(
                    target: "neurodyn_npu_neural",
                    "dropping event for step {} delivered after step {} was drained",
                    event.step, current
                );
            }
            _ => {
                let idx = self.index(event.step);
                self.buckets[idx].push(event);
            }
        }
    }

    fn prepare(&mut self, step: Step) {
        if !self.current.is_empty() {
            warn!(
                target: "neurodyn_npu_neural",
                "{} unconsumed events discarded when moving to step {}",
                self.current.len(),
                step
            );
            self.current.clear();
        }

        let idx = self.index(step);
        let bucket = &mut self.buckets[idx];
        let mut i = 0;
        while i < bucket.len() {
            if bucket[i].step == step {
                self.current.push(bucket.swap_remove(i));
            } else if bucket[i].step < step {
                bucket.swap_remove(i);
            } else {
                i += 1;
            }
        }
        self.current
            .sort_by(|a, b| sort_key(a).partial_cmp(&sort_key(b)).unwrap_or(core::cmp::Ordering::Equal));
        self.current_step = Some(step);
    }

    #[inline]
    fn index(&self, step: Step) -> usize {
        step.rem_euclid(self.buckets.len() as Step) as usize
    }
}

/// Ascending in drain order reversed: smallest offset (latest) first,
/// refractory ends after spikes at the same offset.
#[inline]
fn sort_key(e: &PreciseEvent) -> (f64, u8) {
    (e.offset, e.is_refractory_end as u8)
}

#[inline]
fn precedes(a: &PreciseEvent, b: &PreciseEvent) -> bool {
    sort_key(a) <= sort_key(b)
}
