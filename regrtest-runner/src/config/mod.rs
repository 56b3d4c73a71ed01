// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for regrtest runs.
//!
//! A run is described by a [`RunConfig`], which is usually built from a profile loaded through
//! [`RegrtestConfig`] and then adjusted from the command line.

mod core;
mod run_config;
mod test_threads;

pub use self::core::*;
pub use run_config::*;
pub use test_threads::*;
