// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Threshold / refractory state machine
//!
//! ```text
//! ACTIVE --(V >= V_th)--> SPIKING --(emit, V := V_reset, jumps)--> REFRACTORY
//!    ^                                                                 |
//!    +------------------- counter reaches zero ------------------------+
//! ```
//!
//! Grid models keep an integer step counter ([`RefractoryState`]). Precise
//! models keep the refractory end as a buffered event instead and only need
//! the crossing localisation helpers below.

use crate::types::ConfigurationError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Relative slack when testing whether `t_ref` is an integer number of steps
const STEP_MULTIPLE_TOLERANCE: f64 = 1.0e-9;

/// Convert a refractory duration into whole simulation steps.
///
/// `t_ref = 0` means no refractoriness. A positive duration shorter than half
/// a step, or one that is not a multiple of `h`, is a configuration error.
pub fn refractory_steps(t_ref: f64, h: f64) -> Result<u32, ConfigurationError> {
    ConfigurationError::require_non_negative("t_ref", t_ref)?;
    ConfigurationError::require_positive("resolution", h)?;
    if t_ref == 0.0 {
        return Ok(0);
    }

    if t_ref < h * (1.0 - STEP_MULTIPLE_TOLERANCE) {
        return Err(ConfigurationError::RefractoryBelowResolution {
            t_ref,
            resolution: h,
        });
    }

    let steps = (t_ref / h).round();
    if (steps * h - t_ref).abs() > h * STEP_MULTIPLE_TOLERANCE {
        return Err(ConfigurationError::RefractoryNotMultiple {
            t_ref,
            resolution: h,
        });
    }
    if steps > u32::MAX as f64 {
        return Err(ConfigurationError::InvalidValue {
            name: "t_ref",
            reason: format!("{} steps exceed the counter range", steps),
        });
    }
    Ok(steps as u32)
}

/// Steps-remaining counter of a grid-based model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RefractoryState {
    remaining: u32,
}

impl RefractoryState {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_refractory(&self) -> bool {
        self.remaining > 0
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Start a refractory period of `steps` steps after the current one
    #[inline]
    pub fn fire(&mut self, steps: u32) {
        self.remaining = steps;
    }

    /// Consume one step if refractory
    #[inline]
    pub fn tick(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    /// Called at the start of a step; true if the step is spent clamped.
    ///
    /// After `fire(r)` in step `s`, steps `s+1 ..= s+r` are clamped and the
    /// membrane is integrated again from step `s+r+1`.
    #[inline]
    pub fn enter_step(&mut self) -> bool {
        let clamped = self.is_refractory();
        self.tick();
        clamped
    }

    pub fn clear(&mut self) {
        self.remaining = 0;
    }
}

/// Time within `[t_old, t_new]` at which the chord through
/// `(t_old, v_old)` and `(t_new, v_new)` reaches `threshold`.
///
/// `t_cross = t_old + (threshold - v_old)(t_new - t_old)/(v_new - v_old)`,
/// clamped to the interval. A flat chord returns `t_new`.
pub fn linear_crossing(t_old: f64, v_old: f64, t_new: f64, v_new: f64, threshold: f64) -> f64 {
    let dv = v_new - v_old;
    if dv == 0.0 {
        return t_new;
    }
    let fraction = ((threshold - v_old) / dv).clamp(0.0, 1.0);
    t_old + fraction * (t_new - t_old)
}

/// Interpolate every component linearly: `out = old + fraction (new - old)`
pub fn interpolate_state(old: &[f64], new: &[f64], fraction: f64, out: &mut [f64]) {
    for ((o, a), b) in out.iter_mut().zip(old).zip(new) {
        *o = a + fraction * (b - a);
    }
}

/// Locate the first time in `(lo, hi]` where `v(t)` reaches `threshold`.
///
/// Requires `v(lo) < threshold <= v(hi)`. The bracket is halved until it is
/// narrower than `tolerance`; the upper end is returned so the reported
/// time is never before the true crossing.
pub fn bisect_crossing<F>(v: F, lo: f64, hi: f64, threshold: f64, tolerance: f64) -> f64
where
    F: Fn(f64) -> f64,
{
    let (mut lo, mut hi) = (lo, hi);
    while hi - lo > tolerance {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if v(mid) >= threshold {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    hi
}
