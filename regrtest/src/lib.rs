// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run regression test units in parallel, one worker process per unit.
//!
//! The worker program is given after `--`. It is run once per unit with a JSON job as its last
//! argument, and must implement the worker side of the protocol described in
//! [`regrtest_runner::protocol`].

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;
mod reporter;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputContext;

use clap::Parser;

/// Parses the command line, runs regrtest, and exits the process with the resulting code.
#[doc(hidden)]
pub fn main_impl() -> ! {
    let opts = RegrtestApp::parse();
    let output = opts.init_output();

    match opts.exec(output) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            error.display_to_stderr();
            std::process::exit(error.process_exit_code())
        }
    }
}
