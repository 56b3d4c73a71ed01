// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for regrtest: running a set of independent test units in parallel, one
//! child process per unit, and aggregating their outcomes into a single verdict.
//!
//! The basic flow is:
//!
//! 1. Load a [`RunConfig`](config::RunConfig), usually through a
//!    [profile](config::RegrtestConfig::profile).
//! 2. Build a [`TestRunner`](runner::TestRunner) with a [`WorkerCommand`](test_command::WorkerCommand)
//!    describing how to launch a worker process.
//! 3. Call [`TestRunner::execute`](runner::TestRunner::execute) with the unit ids to run. Events
//!    are delivered to a callback, and the final [`RunResults`](results::RunResults) is returned.
//!
//! The child side of the protocol lives in [`unit_process`].

pub mod config;
pub mod errors;
pub mod events;
pub mod helpers;
pub mod job_queue;
pub mod protocol;
pub mod results;
pub mod runner;
pub mod signal;
pub mod test_command;
mod time;
pub mod unit_process;
