// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Integration Test: neuron models driven by the batch runner
//!
//! End-to-end scenarios through [`Simulation`]:
//! - resting and single-input responses of the current-based models
//! - refractory clamping and precise spike times
//! - receptor routing and numerical faults of the adaptive models

use neurodyn::prelude::*;

const H: f64 = 0.1;

fn simulation(min_delay: usize) -> Simulation {
    Simulation::new(SimulationSettings {
        resolution_ms: H,
        min_delay_steps: min_delay,
        max_delay_steps: 50,
        ..Default::default()
    })
    .unwrap()
}

// ============================================================================
// Current-based models
// ============================================================================

#[test]
fn test_leaky_integrator_rests_at_e_l() {
    let mut sim = simulation(10);
    let id = sim.add_neuron(Box::new(IafPscExp::new()));
    sim.simulate(100).unwrap();

    let v = sim.multimeter().component(id, 0);
    assert_eq!(v.len(), 100);
    assert!(v.iter().all(|&v| v == -70.0));
    assert!(sim.spikes().is_empty());
}

#[test]
fn test_single_spike_current_decays_with_tau_syn() {
    let mut sim = simulation(4);
    let id = sim.add_neuron(Box::new(IafPscExp::new()));
    sim.deliver_spike(id, SpikeInput::new(5, 50.0)).unwrap();
    sim.simulate(40).unwrap();

    let i_ex = sim.multimeter().component(id, 1);
    assert_eq!(i_ex[4], 0.0);
    assert_eq!(i_ex[5], 50.0);

    let expected = (-H / 2.0).exp();
    for k in 6..40 {
        let ratio = i_ex[k] / i_ex[k - 1];
        assert!(
            (ratio - expected).abs() < 1e-12,
            "step {}: ratio {} expected {}",
            k,
            ratio,
            expected
        );
    }

    // Sub-threshold response: depolarised, no spike
    let v = sim.multimeter().component(id, 0);
    assert!(v[39] > -70.0 && v[39] < -55.0);
    assert!(sim.spikes().is_empty());
}

#[test]
fn test_refractory_clamp_lasts_t_ref() {
    let mut sim = simulation(7);
    let params = IafPscAlphaParameters {
        t_ref: 0.3,
        i_e: 2.0e4,
        ..Default::default()
    };
    let v_reset = params.v_reset;
    let id = sim.add_neuron(Box::new(IafPscAlpha::with_params(params).unwrap()));
    sim.simulate(300).unwrap();

    let v = sim.multimeter().component(id, 0);
    let steps: Vec<usize> = sim
        .spikes()
        .spikes_of(id)
        .map(|s| s.step() as usize)
        .collect();
    assert!(steps.len() >= 3);

    for window in steps.windows(2) {
        // Reset step plus three clamped steps before the next spike
        assert!(window[1] - window[0] >= 4);
    }
    for &s in &steps {
        if s + 4 < v.len() {
            assert!(v[s..=s + 3].iter().all(|&x| x == v_reset));
            assert!(v[s + 4] > v_reset);
        }
    }
}

#[test]
fn test_inhibitory_input_hyperpolarises_every_model() {
    let models: Vec<Box<dyn NeuronModel>> = vec![
        Box::new(IafPscExp::new()),
        Box::new(IafPscAlpha::new()),
        Box::new(IafPscExpPs::new()),
        Box::new(HhPscAlpha::new()),
        Box::new(AeifCondAlpha::new()),
    ];
    let mut sim = simulation(5);
    let ids: Vec<NeuronId> = models.into_iter().map(|m| sim.add_neuron(m)).collect();
    sim.simulate(5).unwrap();
    let resting: Vec<f64> = ids
        .iter()
        .map(|id| sim.neuron(*id).unwrap().state_vector()[0])
        .collect();

    for id in &ids {
        sim.deliver_spike(*id, SpikeInput::new(5, -300.0)).unwrap();
    }
    sim.simulate(50).unwrap();

    for (id, v0) in ids.iter().zip(resting) {
        let v = sim.neuron(*id).unwrap().state_vector()[0];
        let name = sim.neuron(*id).unwrap().model_name();
        assert!(v < v0, "{}: {} should be below {}", name, v, v0);
    }
    assert!(sim.spikes().is_empty());
}

// ============================================================================
// Precise timing
// ============================================================================

#[test]
fn test_precise_spike_times_match_closed_form() {
    let mut sim = simulation(8);
    let id = sim.add_neuron(Box::new(
        IafPscExpPs::with_params(IafPscExpPsParameters {
            i_e: 500.0,
            ..Default::default()
        })
        .unwrap(),
    ));
    assert!(sim.neuron(id).unwrap().is_precise());
    sim.simulate(400).unwrap();

    // V(t) = 20 mV (1 - exp(-t/10)) reaches 15 mV after 10 ln 4 ms
    let first = 10.0 * 4.0_f64.ln();
    let times = sim.spikes().times_of(id, H);
    assert_eq!(times.len(), 2);
    assert!((times[0] - first).abs() < 1e-9, "first spike at {}", times[0]);
    // Second spike: 2 ms refractory, then the same trajectory from reset
    assert!((times[1] - (2.0 * first + 2.0)).abs() < 1e-9);

    for spike in sim.spikes().spikes_of(id) {
        let offset = spike.offset.unwrap();
        assert!((0.0..H).contains(&offset));
    }
}

#[test]
fn test_grid_models_emit_without_offset() {
    let mut sim = simulation(10);
    let id = sim.add_neuron(Box::new(
        IafPscExp::with_params(IafPscExpParameters {
            i_e: 800.0,
            ..Default::default()
        })
        .unwrap(),
    ));
    sim.simulate(500).unwrap();

    assert!(!sim.spikes().is_empty());
    assert!(sim.spikes().spikes_of(id).all(|s| s.offset.is_none()));
}

// ============================================================================
// Adaptive models
// ============================================================================

#[test]
fn test_hodgkin_huxley_fires_under_drive() {
    let mut sim = simulation(10);
    let id = sim.add_neuron(Box::new(
        HhPscAlpha::with_params(HhPscAlphaParameters {
            i_e: 1000.0,
            ..Default::default()
        })
        .unwrap(),
    ));
    sim.simulate(1000).unwrap();

    let steps: Vec<_> = sim.spikes().spikes_of(id).map(|s| s.step()).collect();
    assert!(steps.len() >= 2, "only {} spikes", steps.len());
    assert!(steps.windows(2).all(|w| w[1] - w[0] > 20));
}

#[test]
fn test_multisynapse_routes_by_receptor() {
    let mut sim = simulation(5);
    let params = AeifCondAlphaMultisynapseParameters {
        e_rev: vec![0.0, -85.0],
        tau_syn: vec![0.2, 2.0],
        ..Default::default()
    };
    let id = sim.add_neuron(Box::new(
        AeifCondAlphaMultisynapse::with_params(params).unwrap(),
    ));

    assert!(sim.validate_connection(id, Port(1)).is_ok());
    assert!(sim.validate_connection(id, Port(2)).is_ok());
    assert!(matches!(
        sim.validate_connection(id, Port(0)),
        Err(RuntimeError::Connection { .. })
    ));
    assert!(matches!(
        sim.deliver_spike(id, SpikeInput::new(3, 1.0).at_port(Port(3))),
        Err(RuntimeError::Connection { .. })
    ));
    assert!(matches!(
        sim.deliver_spike(id, SpikeInput::new(3, -1.0).at_port(Port(1))),
        Err(RuntimeError::Connection { .. })
    ));

    sim.deliver_spike(id, SpikeInput::new(3, 5.0).at_port(Port(2)))
        .unwrap();
    sim.simulate(60).unwrap();
    let v = sim.multimeter().component(id, 0);
    assert!(v[59] < -70.6, "inhibitory receptor must hyperpolarise, V = {}", v[59]);
}

#[test]
fn test_adaptation_runaway_is_fatal() {
    let mut sim = simulation(10);
    let mut params = AeifCondAlphaParameters::default();
    // Membrane held near E_L while w sits beyond its admissible range
    params.membrane.i_e = 2.0e6;
    let id = sim.add_neuron(Box::new(AeifCondAlpha::with_params(params).unwrap()));

    let mut state = sim.neuron(id).unwrap().state_vector().to_vec();
    let w_index = state.len() - 1;
    state[w_index] = 2.0e6;
    sim.neuron_mut(id).unwrap().set_state_vector(&state).unwrap();

    let err = sim.simulate(20).unwrap_err();
    assert!(err.is_fatal());
    match err {
        RuntimeError::Numerical {
            neuron,
            batch_origin,
            source: NumericalFault::Instability { variable, .. },
        } => {
            assert_eq!(neuron, id);
            assert_eq!(batch_origin, 0);
            assert_eq!(variable, "w");
        }
        other => panic!("unexpected error {:?}", other),
    }

    // The failing step was never committed
    assert_eq!(sim.neuron(id).unwrap().state_vector()[w_index], 2.0e6);
    assert!(sim.multimeter().trace(id).is_none());
    assert_eq!(sim.simulate(1), Err(RuntimeError::Aborted));
}
