// Copyright (C) 2024 Ethan Uppal.
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3 of the License only.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <https://www.gnu.org/licenses/>.

//! Builds and runs a Verilator simulation linked against `libdpi_memory`.
//!
//! A run is four subprocesses, each described by an
//! [`Invocation`](command::Invocation):
//!
//! 1. rebuild the DPI library,
//! 2. verilate the harness and design against it,
//! 3. compile the generated makefile,
//! 4. run the simulation binary,
//!
//! after which the binary and verilator's object directory are removed
//! whether or not the steps succeeded. See [`pipeline::run`].

pub mod artifacts;
pub mod command;
pub mod config;
pub mod pipeline;
pub mod plan;
