// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Neural Types Module
//!
//! Core type definitions shared by the integrators, buffers and models.

pub mod error;
pub mod ids;
pub mod spike;

// Re-export commonly used types
pub use error::{ConfigurationError, IllegalConnection, NeuronError, NumericalFault, NeuronResult};
pub use ids::{NeuronId, Port, Step};
pub use spike::{CurrentInput, SpikeEvent, SpikeInput};
