// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Identity types for neurons, simulation steps and receptor ports

use core::fmt;

/// Absolute simulation step: number of resolution intervals since `t = 0`.
///
/// Step `T` covers the half-open interval `(T·h, (T+1)·h]`.
pub type Step = i64;

/// Neuron ID (index of a neuron inside a population)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NeuronId(pub u32);

impl fmt::Display for NeuronId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Neuron({})", self.0)
    }
}

/// Receptor port of a neuron.
///
/// Single-receptor models accept port 0 only; multi-receptor models number
/// their receptors from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Port(pub usize);

impl Port {
    /// The default port every single-receptor model accepts
    pub const DEFAULT: Port = Port(0);
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Port({})", self.0)
    }
}
