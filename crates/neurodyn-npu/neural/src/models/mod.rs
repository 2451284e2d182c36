// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Neuron Model Architecture
//!
//! Every model owns its parameters, state vector, precomputed coefficients
//! and input buffers, and is driven through the object-safe [`NeuronModel`]
//! trait so a scheduler can hold heterogeneous populations.
//!
//! | Model | Subthreshold solver | Timing |
//! |-------|---------------------|--------|
//! | [`IafPscExp`] | exact propagator | grid |
//! | [`IafPscAlpha`] | exact propagator | grid |
//! | [`IafPscExpPs`] | exact propagator, variable dt | precise |
//! | [`AeifCondAlpha`] | Dormand-Prince 5(4) | grid, optional in-step interpolation |
//! | [`AeifCondAlphaMultisynapse`] | Dormand-Prince 5(4) | grid |
//! | [`HhPscAlpha`] | Dormand-Prince 5(4) | grid |
//!
//! ## Adding a New Neuron Model
//!
//! 1. Create `src/models/your_model.rs`
//! 2. Implement `ModelParameters` for its parameter record and `NeuronModel` for the model
//! 3. Add tests
//! 4. Export in `mod.rs`

pub mod adex;
pub mod aeif_cond_alpha;
pub mod aeif_cond_alpha_multisynapse;
pub mod hh_psc_alpha;
pub mod iaf_psc_alpha;
pub mod iaf_psc_exp;
pub mod iaf_psc_exp_ps;
pub mod traits;

// Re-export core types
pub use aeif_cond_alpha::{AeifCondAlpha, AeifCondAlphaParameters};
pub use aeif_cond_alpha_multisynapse::{
    AeifCondAlphaMultisynapse, AeifCondAlphaMultisynapseParameters,
};
pub use hh_psc_alpha::{HhPscAlpha, HhPscAlphaParameters};
pub use iaf_psc_alpha::{IafPscAlpha, IafPscAlphaParameters, IafPscAlphaUpdate};
pub use iaf_psc_exp::{IafPscExp, IafPscExpParameters, IafPscExpUpdate};
pub use iaf_psc_exp_ps::{IafPscExpPs, IafPscExpPsParameters};
pub use traits::{ModelParameters, NeuronModel};
