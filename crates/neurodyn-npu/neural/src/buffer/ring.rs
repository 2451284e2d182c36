// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Step-indexed accumulator ring

use super::DEFAULT_BUFFER_LEN;
use crate::types::Step;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Slot {
    step: Step,
    value: f64,
}

/// Sum of all contributions per delivery step.
///
/// Writing to a slot that still holds a pending, different step grows the
/// ring instead of overwriting; slots for steps that were already drained
/// are reused.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    slots: Vec<Option<Slot>>,
    /// Lowest step not yet drained
    horizon: Step,
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_LEN)
    }
}

impl RingBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len.max(1)],
            horizon: Step::MIN,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| !self.is_pending(slot))
    }

    /// Grow to at least `len` slots, keeping pending contributions
    pub fn ensure_len(&mut self, len: usize) {
        if len > self.slots.len() {
            self.rehash(len);
        }
    }

    /// Add `value` to the accumulator of `step`
    pub fn add_value(&mut self, step: Step, value: f64) {
        if step < self.horizon {
            warn!(
                target: "neurodyn_npu_neural",
                "dropping contribution {} for already drained step {} (next step {})",
                value, step, self.horizon
            );
            return;
        }

        loop {
            let idx = self.index(step);
            if let Some(slot) = self.slots[idx].as_mut() {
                if slot.step == step {
                    slot.value += value;
                    return;
                }
            }
            if !self.is_pending(&self.slots[idx]) {
                self.slots[idx] = Some(Slot { step, value });
                return;
            }
            let grown = self.slots.len() * 2;
            self.rehash(grown);
        }
    }

    /// Take the accumulated value for `step`, leaving the slot empty.
    ///
    /// Steps must be drained in non-decreasing order; anything pending for an
    /// earlier step is discarded.
    pub fn get_value(&mut self, step: Step) -> f64 {
        if step >= self.horizon {
            self.horizon = step + 1;
        }
        let idx = self.index(step);
        match self.slots[idx].take() {
            Some(slot) if slot.step == step => slot.value,
            Some(slot) if slot.step > step => {
                self.slots[idx] = Some(slot);
                0.0
            }
            _ => 0.0,
        }
    }

    /// Accumulated value for `step` without draining it
    pub fn peek(&self, step: Step) -> f64 {
        match self.slots[self.index(step)] {
            Some(slot) if slot.step == step => slot.value,
            _ => 0.0,
        }
    }

    #[inline]
    fn index(&self, step: Step) -> usize {
        step.rem_euclid(self.slots.len() as Step) as usize
    }

    #[inline]
    fn is_pending(&self, slot: &Option<Slot>) -> bool {
        matches!(slot, Some(s) if s.step >= self.horizon)
    }

    /// Move pending slots into a ring of at least `len` slots, doubling
    /// further until no two pending steps share a slot.
    fn rehash(&mut self, len: usize) {
        let pending: Vec<Slot> = self
            .slots
            .iter()
            .flatten()
            .filter(|slot| slot.step >= self.horizon)
            .copied()
            .collect();

        let mut len = len.max(1);
        'grow: loop {
            let mut slots = vec![None; len];
            for slot in &pending {
                let idx = slot.step.rem_euclid(len as Step) as usize;
                if slots[idx].is_some() {
                    len *= 2;
                    continue 'grow;
                }
                slots[idx] = Some(*slot);
            }
            self.slots = slots;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_accumulate_per_step() {
        let mut buf = RingBuffer::new(4);
        buf.add_value(5, 1.5);
        buf.add_value(5, 2.0);
        buf.add_value(6, -1.0);
        assert_eq!(buf.get_value(5), 3.5);
        assert_eq!(buf.get_value(5), 0.0);
        assert_eq!(buf.get_value(6), -1.0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_collision_grows_instead_of_aliasing() {
        let mut buf = RingBuffer::new(4);
        buf.add_value(1, 1.0);
        buf.add_value(5, 10.0);
        assert!(buf.len() >= 8);
        assert_eq!(buf.get_value(1), 1.0);
        assert_eq!(buf.get_value(2), 0.0);
        assert_eq!(buf.get_value(5), 10.0);
    }

    #[test]
    fn test_drained_slots_are_reused() {
        let mut buf = RingBuffer::new(4);
        for step in 0..20 {
            buf.add_value(step + 3, step as f64);
            let _ = buf.get_value(step);
        }
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_late_contribution_is_dropped() {
        let mut buf = RingBuffer::new(4);
        let _ = buf.get_value(10);
        buf.add_value(9, 5.0);
        assert_eq!(buf.peek(9), 0.0);
    }

    #[test]
    fn test_ensure_len_keeps_pending_values() {
        let mut buf = RingBuffer::default();
        buf.add_value(3, 2.0);
        buf.add_value(12, 4.0);
        buf.ensure_len(100);
        assert_eq!(buf.len(), 100);
        assert_eq!(buf.get_value(3), 2.0);
        assert_eq!(buf.get_value(12), 4.0);
    }
}
