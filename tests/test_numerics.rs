// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Integration Test: numerical engines
//!
//! Exercises the adaptive stepper and the exact propagators through the
//! public API only, using small hand-written right-hand sides.

use neurodyn::neural::dynamics::{within_bounds, Dynamics};
use neurodyn::neural::firing::{bisect_crossing, refractory_steps};
use neurodyn::neural::{
    ConfigurationError, DormandPrince, ExpPropagator, MembranePropagator, NumericalFault,
    Tolerances,
};

/// dy/dt = -y
struct Decay;

impl Dynamics for Decay {
    fn model_name(&self) -> &'static str {
        "decay"
    }

    fn dimension(&self) -> usize {
        1
    }

    fn derivative(&self, y: &[f64], dydt: &mut [f64]) {
        dydt[0] = -y[0];
    }
}

/// Harmonic oscillator: y0' = y1, y1' = -y0
struct Oscillator;

impl Dynamics for Oscillator {
    fn model_name(&self) -> &'static str {
        "oscillator"
    }

    fn dimension(&self) -> usize {
        2
    }

    fn derivative(&self, y: &[f64], dydt: &mut [f64]) {
        dydt[0] = y[1];
        dydt[1] = -y[0];
    }
}

/// Leaky membrane (relative to rest) driven by one exponential current
struct ExpSynapseMembrane {
    tau_m: f64,
    tau_syn: f64,
    c_m: f64,
    bias: f64,
}

impl Dynamics for ExpSynapseMembrane {
    fn model_name(&self) -> &'static str {
        "membrane"
    }

    fn dimension(&self) -> usize {
        2
    }

    fn derivative(&self, y: &[f64], dydt: &mut [f64]) {
        dydt[0] = -y[0] / self.tau_m + (y[1] + self.bias) / self.c_m;
        dydt[1] = -y[1] / self.tau_syn;
    }
}

/// Constant drift with an upper bound on the state
struct BoundedRamp;

impl Dynamics for BoundedRamp {
    fn model_name(&self) -> &'static str {
        "ramp"
    }

    fn dimension(&self) -> usize {
        1
    }

    fn derivative(&self, _y: &[f64], dydt: &mut [f64]) {
        dydt[0] = 1.0;
    }

    fn check_state(&self, y: &[f64]) -> Result<(), NumericalFault> {
        within_bounds("ramp", "y", y[0], f64::NEG_INFINITY, 1.5)
    }
}

/// Produces NaN as soon as it is evaluated away from the origin
struct Singular;

impl Dynamics for Singular {
    fn model_name(&self) -> &'static str {
        "singular"
    }

    fn dimension(&self) -> usize {
        1
    }

    fn derivative(&self, y: &[f64], dydt: &mut [f64]) {
        dydt[0] = if y[0] == 0.0 { 1.0 } else { f64::NAN };
    }
}

// ============================================================================
// Adaptive stepper
// ============================================================================

#[test]
fn test_error_shrinks_with_tolerance() {
    let exact = (-1.0f64).exp();
    let mut previous = f64::INFINITY;
    let mut max_error = 1e-5;

    // Successive halvings, tight regime only
    for _ in 0..10 {
        let mut stepper = DormandPrince::new(1, Tolerances::new(max_error, 1e-9), 0.1);
        let mut y = [1.0];
        let stats = stepper.integrate(&Decay, &mut y, 1.0).unwrap();
        let error = (y[0] - exact).abs();

        // Global error stays within the accumulated per-step bound
        assert!(
            error <= 10.0 * stats.accepted as f64 * max_error,
            "max_error {}: error {} after {} steps",
            max_error,
            error,
            stats.accepted
        );
        assert!(
            error < previous,
            "max_error {}: error {} did not drop below {}",
            max_error,
            error,
            previous
        );
        previous = error;
        max_error /= 2.0;
    }
}

#[test]
fn test_step_size_persists_between_calls() {
    let mut stepper = DormandPrince::new(1, Tolerances::new(1e-10, 1e-6), 1.0);
    let mut y = [1.0];
    let first = stepper.integrate(&Decay, &mut y, 0.1).unwrap();
    assert!(first.rejected >= 1);
    let carried = stepper.step_size();
    assert!(carried >= 1e-6 && carried < 1.0);

    stepper.integrate(&Decay, &mut y, 0.1).unwrap();
    assert!((y[0] - (-0.2f64).exp()).abs() < 1e-9);
}

#[test]
fn test_min_step_floor_always_terminates() {
    let min_step = 0.01;
    // Unreachable error bound: every step is floored and force-accepted
    let mut stepper = DormandPrince::new(2, Tolerances::new(1e-30, min_step), 0.1);
    let mut y = [1.0, 0.0];
    let stats = stepper.integrate(&Oscillator, &mut y, 1.0).unwrap();

    assert!(
        (100..=101).contains(&stats.accepted),
        "{} accepted steps",
        stats.accepted
    );
    assert!(stats.rejected >= 1);
    assert!((y[0] - 1.0f64.cos()).abs() < 1e-8);
    assert!((y[1] + 1.0f64.sin()).abs() < 1e-8);
}

#[test]
fn test_bounds_violation_is_reported() {
    let mut stepper = DormandPrince::new(1, Tolerances::default(), 0.1);
    let mut y = [0.0];
    assert!(stepper.integrate(&BoundedRamp, &mut y, 1.0).is_ok());

    let err = stepper.integrate(&BoundedRamp, &mut y, 1.0).unwrap_err();
    assert!(matches!(
        err,
        NumericalFault::Instability { variable: "y", .. }
    ));
    assert_eq!(err.model(), "ramp");
}

#[test]
fn test_non_finite_trial_is_fatal() {
    let mut stepper = DormandPrince::new(1, Tolerances::default(), 0.1);
    let mut y = [0.0];
    let err = stepper.integrate(&Singular, &mut y, 0.1).unwrap_err();
    assert!(matches!(err, NumericalFault::NonConvergence { model: "singular", .. }));
    // Nothing committed
    assert_eq!(y[0], 0.0);
}

// ============================================================================
// Exact propagators vs. numerical integration
// ============================================================================

#[test]
fn test_propagators_agree_with_adaptive_integration() {
    let (tau_m, tau_syn, c_m, bias, h) = (10.0, 2.0, 250.0, 120.0, 0.1);
    let membrane = MembranePropagator::new(tau_m, c_m, h).unwrap();
    let synapse = ExpPropagator::new(tau_syn, tau_m, c_m, h).unwrap();
    let rhs = ExpSynapseMembrane {
        tau_m,
        tau_syn,
        c_m,
        bias,
    };

    let mut stepper = DormandPrince::new(2, Tolerances::new(1e-12, 1e-6), h);
    let mut numeric = [0.0, 80.0];
    let (mut v, mut i) = (0.0, 80.0);

    for step in 0..200 {
        v = membrane.advance(v, bias) + synapse.membrane_input(i);
        i = synapse.advance(i);
        stepper.integrate(&rhs, &mut numeric, h).unwrap();

        assert!(
            (numeric[0] - v).abs() < 1e-8,
            "step {}: V {} vs {}",
            step,
            numeric[0],
            v
        );
        assert!((numeric[1] - i).abs() < 1e-6);
    }
}

#[test]
fn test_degenerate_time_constants_rejected() {
    assert!(matches!(
        ExpPropagator::new(10.0, 10.0, 250.0, 0.1),
        Err(ConfigurationError::DegenerateTimeConstants { .. })
    ));
    assert!(MembranePropagator::new(10.0, 0.0, 0.1).is_err());
}

// ============================================================================
// Firing helpers
// ============================================================================

#[test]
fn test_crossing_and_refractory_helpers() {
    let t = bisect_crossing(|t| t * t, 0.0, 1.0, 0.25, 1e-12);
    assert!(t >= 0.5 && t - 0.5 < 1e-12);

    assert_eq!(refractory_steps(2.0, 0.1).unwrap(), 20);
    assert_eq!(refractory_steps(0.0, 0.1).unwrap(), 0);
    assert!(refractory_steps(0.15, 0.1).is_err());
}
