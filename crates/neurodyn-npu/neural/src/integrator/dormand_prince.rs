// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Dormand-Prince 5(4) stepper with first-component error control
//!
//! ## Scheme
//!
//! ```text
//! k1 = f(y)
//! k2..k6 = f(y + h Σ a_ij k_j)
//! y5 = y + h (b1 k1 + b3 k3 + b4 k4 + b5 k5 + b6 k6)      (accepted solution)
//! k7 = f(y5)
//! y4 = y + h (e1 k1 + e3 k3 + e4 k4 + e5 k5 + e6 k6 + e7 k7)
//!
//! err = |y5[0] - y4[0]| / MAXERR + ε
//! accept  if err <= 1 or h == HMIN
//! h_next = max(0.98 h err^(-1/5), HMIN)
//! ```
//!
//! Only component 0 (the membrane potential in every model) enters the error
//! estimate. Auxiliary variables such as adaptation or gating variables are
//! not error-controlled.
//!
//! `k1` is evaluated once per accepted step and reused by rejected attempts,
//! since `y` does not change until a step is accepted.

use super::{IntegrationStats, Tolerances};
use crate::dynamics::Dynamics;
use crate::types::NumericalFault;

// Butcher tableau
const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th-order weights
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// 4th-order weights
const E1: f64 = 5179.0 / 57600.0;
const E3: f64 = 7571.0 / 16695.0;
const E4: f64 = 393.0 / 640.0;
const E5: f64 = -92097.0 / 339200.0;
const E6: f64 = 187.0 / 2100.0;
const E7: f64 = 1.0 / 40.0;

/// Step-size safety factor
const SAFETY: f64 = 0.98;

/// Added to the normalised error so a vanishing estimate cannot blow up the
/// predicted step size (growth is capped at roughly 100x per attempt).
const ERROR_FLOOR: f64 = 1.0e-10;

/// Adaptive stepper with reusable scratch buffers.
///
/// One instance belongs to one neuron. The step size survives across calls,
/// so consecutive simulation steps start from the last prediction.
#[derive(Debug, Clone)]
pub struct DormandPrince {
    tolerances: Tolerances,
    step_size: f64,
    k: [Vec<f64>; 7],
    y_stage: Vec<f64>,
    y_new: Vec<f64>,
    y_ref: Vec<f64>,
}

impl DormandPrince {
    pub fn new(dimension: usize, tolerances: Tolerances, initial_step: f64) -> Self {
        Self {
            tolerances,
            step_size: initial_step,
            k: core::array::from_fn(|_| vec![0.0; dimension]),
            y_stage: vec![0.0; dimension],
            y_new: vec![0.0; dimension],
            y_ref: vec![0.0; dimension],
        }
    }

    /// Resize scratch space and restart step-size adaptation from `initial_step`.
    pub fn reset(&mut self, dimension: usize, tolerances: Tolerances, initial_step: f64) {
        for k in self.k.iter_mut() {
            k.clear();
            k.resize(dimension, 0.0);
        }
        for buf in [&mut self.y_stage, &mut self.y_new, &mut self.y_ref] {
            buf.clear();
            buf.resize(dimension, 0.0);
        }
        self.tolerances = tolerances;
        self.step_size = initial_step;
    }

    pub fn dimension(&self) -> usize {
        self.y_new.len()
    }

    pub fn tolerances(&self) -> Tolerances {
        self.tolerances
    }

    /// Step size the next call will start from
    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    /// Advance `y` from `t = 0` to `t_end`.
    pub fn integrate<D: Dynamics + ?Sized>(
        &mut self,
        f: &D,
        y: &mut [f64],
        t_end: f64,
    ) -> Result<IntegrationStats, NumericalFault> {
        let mut stats = IntegrationStats::default();
        let mut t = 0.0;
        while t < t_end {
            t = self.step(f, y, t, t_end, &mut stats)?;
        }
        Ok(stats)
    }

    /// Perform exactly one accepted step starting at `t`, never passing `t_end`.
    ///
    /// Returns the time reached. Rejected attempts are retried internally
    /// with a smaller step until the error test passes or the step has been
    /// floored at `HMIN`. When less than `HMIN` remains, the remainder is
    /// taken and accepted unconditionally.
    pub fn step<D: Dynamics + ?Sized>(
        &mut self,
        f: &D,
        y: &mut [f64],
        t: f64,
        t_end: f64,
        stats: &mut IntegrationStats,
    ) -> Result<f64, NumericalFault> {
        debug_assert_eq!(y.len(), self.dimension());
        let remaining = t_end - t;
        if remaining <= 0.0 {
            return Ok(t);
        }

        let Tolerances {
            max_error,
            min_step,
        } = self.tolerances;

        f.derivative(y, &mut self.k[0]);
        let mut h = self.step_size.min(remaining);

        loop {
            let mut done = false;
            if h <= min_step {
                h = min_step.min(remaining);
                done = true;
            }

            self.attempt(f, y, h);

            if let Some(component) = self
                .y_new
                .iter()
                .chain(self.y_ref.iter())
                .position(|v| !v.is_finite())
            {
                return Err(NumericalFault::NonConvergence {
                    model: f.model_name(),
                    reason: format!(
                        "non-finite trial value in component {} at h = {} ms",
                        component % y.len(),
                        h
                    ),
                });
            }

            let err = (self.y_new[0] - self.y_ref[0]).abs() / max_error + ERROR_FLOOR;
            let predicted = (h * SAFETY * err.powf(-0.2)).max(min_step);
            self.step_size = predicted;

            if err <= 1.0 || done {
                y.copy_from_slice(&self.y_new);
                stats.accepted += 1;
                f.check_state(y)?;
                return Ok(if h >= remaining { t_end } else { t + h });
            }

            stats.rejected += 1;
            h = predicted.min(remaining);
        }
    }

    /// Evaluate stages 2..7 for step `h`; `k[0]` must hold `f(y)`.
    fn attempt<D: Dynamics + ?Sized>(&mut self, f: &D, y: &[f64], h: f64) {
        combine(&mut self.y_stage, y, h, &[(A21, &self.k[0][..])]);
        f.derivative(&self.y_stage, &mut self.k[1]);

        combine(
            &mut self.y_stage,
            y,
            h,
            &[(A31, &self.k[0][..]), (A32, &self.k[1][..])],
        );
        f.derivative(&self.y_stage, &mut self.k[2]);

        combine(
            &mut self.y_stage,
            y,
            h,
            &[
                (A41, &self.k[0][..]),
                (A42, &self.k[1][..]),
                (A43, &self.k[2][..]),
            ],
        );
        f.derivative(&self.y_stage, &mut self.k[3]);

        combine(
            &mut self.y_stage,
            y,
            h,
            &[
                (A51, &self.k[0][..]),
                (A52, &self.k[1][..]),
                (A53, &self.k[2][..]),
                (A54, &self.k[3][..]),
            ],
        );
        f.derivative(&self.y_stage, &mut self.k[4]);

        combine(
            &mut self.y_stage,
            y,
            h,
            &[
                (A61, &self.k[0][..]),
                (A62, &self.k[1][..]),
                (A63, &self.k[2][..]),
                (A64, &self.k[3][..]),
                (A65, &self.k[4][..]),
            ],
        );
        f.derivative(&self.y_stage, &mut self.k[5]);

        combine(
            &mut self.y_new,
            y,
            h,
            &[
                (B1, &self.k[0][..]),
                (B3, &self.k[2][..]),
                (B4, &self.k[3][..]),
                (B5, &self.k[4][..]),
                (B6, &self.k[5][..]),
            ],
        );
        f.derivative(&self.y_new, &mut self.k[6]);

        combine(
            &mut self.y_ref,
            y,
            h,
            &[
                (E1, &self.k[0][..]),
                (E3, &self.k[2][..]),
                (E4, &self.k[3][..]),
                (E5, &self.k[4][..]),
                (E6, &self.k[5][..]),
                (E7, &self.k[6][..]),
            ],
        );
    }
}

/// `out = y + h Σ c_j k_j`
#[inline]
fn combine(out: &mut [f64], y: &[f64], h: f64, terms: &[(f64, &[f64])]) {
    for (i, out_i) in out.iter_mut().enumerate() {
        let mut acc = 0.0;
        for (c, k) in terms {
            acc += c * k[i];
        }
        *out_i = y[i] + h * acc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::within_bounds;

    struct Decay {
        rate: f64,
    }

    impl Dynamics for Decay {
        fn model_name(&self) -> &'static str {
            "decay"
        }
        fn dimension(&self) -> usize {
            1
        }
        fn derivative(&self, y: &[f64], dydt: &mut [f64]) {
            dydt[0] = -self.rate * y[0];
        }
    }

    /// Damped oscillator x'' + 2ζx' + x = 0 written as (x, x')
    struct Oscillator {
        zeta: f64,
    }

    impl Dynamics for Oscillator {
        fn model_name(&self) -> &'static str {
            "oscillator"
        }
        fn dimension(&self) -> usize {
            2
        }
        fn derivative(&self, y: &[f64], dydt: &mut [f64]) {
            dydt[0] = y[1];
            dydt[1] = -y[0] - 2.0 * self.zeta * y[1];
        }
    }

    /// Rough right-hand side used to provoke rejections
    struct Wiggle;

    impl Dynamics for Wiggle {
        fn model_name(&self) -> &'static str {
            "wiggle"
        }
        fn dimension(&self) -> usize {
            1
        }
        fn derivative(&self, y: &[f64], dydt: &mut [f64]) {
            dydt[0] = 100.0 * (50.0 * y[0]).cos();
        }
    }

    struct Bounded;

    impl Dynamics for Bounded {
        fn model_name(&self) -> &'static str {
            "bounded"
        }
        fn dimension(&self) -> usize {
            1
        }
        fn derivative(&self, _y: &[f64], dydt: &mut [f64]) {
            dydt[0] = 1.0;
        }
        fn check_state(&self, y: &[f64]) -> Result<(), NumericalFault> {
            within_bounds("bounded", "x", y[0], f64::NEG_INFINITY, 0.5)
        }
    }

    struct Explodes;

    impl Dynamics for Explodes {
        fn model_name(&self) -> &'static str {
            "explodes"
        }
        fn dimension(&self) -> usize {
            1
        }
        fn derivative(&self, y: &[f64], dydt: &mut [f64]) {
            dydt[0] = y[0] * y[0] * 1e300;
        }
    }

    #[test]
    fn test_exponential_decay_accuracy() {
        let mut stepper = DormandPrince::new(1, Tolerances::new(1e-10, 1e-6), 0.1);
        let mut y = [1.0];
        stepper.integrate(&Decay { rate: 1.0 }, &mut y, 1.0).unwrap();
        assert!((y[0] - (-1.0f64).exp()).abs() < 1e-8);
    }

    #[test]
    fn test_oscillator_matches_closed_form() {
        let zeta: f64 = 0.2;
        let mut stepper = DormandPrince::new(2, Tolerances::new(1e-9, 1e-6), 0.05);
        let mut y = [1.0, 0.0];
        stepper.integrate(&Oscillator { zeta }, &mut y, 3.0).unwrap();

        let wd = (1.0 - zeta * zeta).sqrt();
        let expected =
            (-zeta * 3.0).exp() * ((wd * 3.0).cos() + zeta / wd * (wd * 3.0).sin());
        assert!((y[0] - expected).abs() < 1e-6, "{} vs {}", y[0], expected);
    }

    #[test]
    fn test_interval_end_is_hit_exactly() {
        let mut stepper = DormandPrince::new(1, Tolerances::default(), 0.07);
        let mut y = [1.0];
        let mut stats = IntegrationStats::default();
        let mut t = 0.0;
        while t < 0.1 {
            t = stepper
                .step(&Decay { rate: 0.5 }, &mut y, t, 0.1, &mut stats)
                .unwrap();
        }
        assert_eq!(t, 0.1);
    }

    #[test]
    fn test_step_size_persists_between_calls() {
        let mut stepper = DormandPrince::new(1, Tolerances::new(1e-6, 1e-6), 1e-3);
        let mut y = [1.0];
        stepper.integrate(&Decay { rate: 0.1 }, &mut y, 0.1).unwrap();
        // Smooth dynamics let the prediction grow beyond the initial guess
        assert!(stepper.step_size() > 1e-3);

        let before = stepper.step_size();
        stepper.reset(1, Tolerances::new(1e-6, 1e-6), 0.01);
        assert_ne!(stepper.step_size(), before);
        assert_eq!(stepper.step_size(), 0.01);
    }

    #[test]
    fn test_floor_forces_progress() {
        // An unreachable tolerance keeps err > 1 forever
        let tolerances = Tolerances::new(f64::MIN_POSITIVE, 1e-3);
        let mut stepper = DormandPrince::new(1, tolerances, 0.1);
        let mut y = [0.0];
        let stats = stepper.integrate(&Wiggle, &mut y, 1.0).unwrap();

        assert!(y[0].is_finite());
        assert!(stats.accepted <= 1001, "accepted = {}", stats.accepted);
        assert!(stats.rejected <= stats.accepted + 1);
    }

    #[test]
    fn test_sanity_bound_raises_instability() {
        let mut stepper = DormandPrince::new(1, Tolerances::default(), 0.1);
        let mut y = [0.0];
        let err = stepper.integrate(&Bounded, &mut y, 1.0).unwrap_err();
        assert!(matches!(
            err,
            NumericalFault::Instability {
                model: "bounded",
                variable: "x",
                ..
            }
        ));
    }

    #[test]
    fn test_non_finite_trial_reports_non_convergence() {
        let mut stepper = DormandPrince::new(1, Tolerances::default(), 0.1);
        let mut y = [1e10];
        let err = stepper.integrate(&Explodes, &mut y, 1.0).unwrap_err();
        assert!(matches!(err, NumericalFault::NonConvergence { model: "explodes", .. }));
    }
}
