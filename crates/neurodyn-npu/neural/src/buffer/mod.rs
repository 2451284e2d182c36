// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Per-neuron input buffers
//!
//! Incoming spikes and currents are written ahead of time by the delivery
//! manager and drained by the owning neuron, one step at a time, in
//! non-decreasing step order.
//!
//! - [`RingBuffer`]: one accumulator per step (grid-based models)
//! - [`SliceRingBuffer`]: individual events with sub-step offsets (precise models)
//!
//! Both index slots by `step mod len` and tag each entry with its absolute
//! step, so a slot is never confused with one a full ring earlier.

pub mod ring;
pub mod slice;

pub use ring::RingBuffer;
pub use slice::{PreciseEvent, SliceRingBuffer};

/// Slot count before calibration sizes the buffer from the clock
pub const DEFAULT_BUFFER_LEN: usize = 16;
