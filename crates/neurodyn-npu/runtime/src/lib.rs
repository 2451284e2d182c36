// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! # Neurodyn Runtime
//!
//! The host side of the neuron models in `neurodyn-npu-neural`:
//! - **Clock**: [`SimulationClock`], the global step counter models read from
//! - **Recorders**: [`SpikeRecorder`] and [`Multimeter`], in-memory sinks
//! - **Runner**: [`Simulation`], driving a population through min-delay batches
//!
//! ## Usage
//!
//! ```rust
//! use neurodyn_npu_neural::{IafPscExp, SpikeInput};
//! use neurodyn_npu_runtime::{Simulation, SimulationSettings};
//!
//! let mut sim = Simulation::new(SimulationSettings::default()).unwrap();
//! let id = sim.add_neuron(Box::new(IafPscExp::new()));
//! sim.deliver_spike(id, SpikeInput::new(5, 100.0)).unwrap();
//! sim.simulate(100).unwrap();
//! assert_eq!(sim.multimeter().trace(id).map(|t| t.len()), Some(100));
//! ```
//!
//! Spikes are recorded but not routed between neurons; connectivity and
//! delivery belong to the caller.

#![warn(missing_docs)]

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod clock;
pub mod error;
pub mod recorder;
pub mod simulation;

pub use clock::SimulationClock;
pub use error::{Result, RuntimeError};
pub use recorder::{Multimeter, SpikeRecorder};
pub use simulation::{Simulation, SimulationSettings};
