// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Global simulation clock

use crate::error::{Result, RuntimeError};
use neurodyn_npu_neural::{Clock, Step};

/// Step counter shared by every neuron of a run.
///
/// `origin` is the first step of the batch about to be simulated; it only
/// moves forward, by whole batches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationClock {
    resolution: f64,
    origin: Step,
    min_delay: usize,
    max_delay: usize,
}

impl SimulationClock {
    /// Create a clock at step 0
    pub fn new(resolution: f64, min_delay: usize, max_delay: usize) -> Result<Self> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(RuntimeError::InvalidSettings(format!(
                "resolution must be positive, got {}",
                resolution
            )));
        }
        if min_delay == 0 {
            return Err(RuntimeError::InvalidSettings(
                "min_delay must be at least one step".to_string(),
            ));
        }
        if max_delay < min_delay {
            return Err(RuntimeError::InvalidSettings(format!(
                "max_delay ({}) is below min_delay ({})",
                max_delay, min_delay
            )));
        }
        Ok(Self {
            resolution,
            origin: 0,
            min_delay,
            max_delay,
        })
    }

    /// Move the origin past a finished batch of `steps` steps
    pub fn advance(&mut self, steps: usize) {
        self.origin += steps as Step;
    }

    /// Time (ms) at the start of the current origin step
    pub fn time_ms(&self) -> f64 {
        self.origin as f64 * self.resolution
    }

    /// Step containing time `t_ms` under the `(T·h, (T+1)·h]` convention
    pub fn step_of(&self, t_ms: f64) -> Step {
        ((t_ms / self.resolution).ceil() as Step - 1).max(0)
    }
}

impl Clock for SimulationClock {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_by_batches() {
        let mut clock = SimulationClock::new(0.1, 10, 20).unwrap();
        assert_eq!(clock.origin(), 0);
        clock.advance(10);
        clock.advance(10);
        assert_eq!(clock.origin(), 20);
        assert!((clock.time_ms() - 2.0).abs() < 1e-12);
        assert_eq!(clock.buffer_len(), 30);
    }

    #[test]
    fn test_step_of_uses_right_closed_intervals() {
        let clock = SimulationClock::new(0.5, 1, 1).unwrap();
        assert_eq!(clock.step_of(0.5), 0);
        assert_eq!(clock.step_of(0.6), 1);
        assert_eq!(clock.step_of(1.0), 1);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(SimulationClock::new(0.0, 1, 1).is_err());
        assert!(SimulationClock::new(0.1, 0, 1).is_err());
        assert!(SimulationClock::new(0.1, 5, 2).is_err());
        assert!(SimulationClock::new(f64::NAN, 1, 1).is_err());
    }
}
