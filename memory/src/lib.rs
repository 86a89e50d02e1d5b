// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Simulated memory for Verilator testbenches.
//!
//! A [`Space`] is a named address space made of non-overlapping [`Region`]s.
//! Spaces are registered process-wide in [`SPACE_TABLE`] so that the DPI
//! entry points in [`ffi`] and Rust code share the same memory. Built as a
//! `cdylib`, this crate is the `libdpi_memory.so` that `dpi-sim` links into
//! the simulation.

pub mod ffi;
pub mod region;
pub mod space;

pub use region::{Region, RegionError, RegionInfo, Word};
pub use space::{Space, SpaceError, SpaceTable, SPACE_TABLE};
