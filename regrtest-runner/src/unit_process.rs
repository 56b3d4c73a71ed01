// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The worker process side of the protocol.
//!
//! A worker process receives a [`WorkerJob`] as its last command-line argument, runs the unit
//! through a [`UnitRunner`], and writes the [`UnitResult`] as the last line of its output. See
//! [`protocol`](crate::protocol) for the format.

use crate::{
    errors::UnitProcessError,
    protocol::{UnitResult, WorkerJob},
};
use std::io::Write;

/// Runs a single unit inside a worker process.
///
/// Implementations may write anything to stdout and stderr while running. That output is
/// captured by the runner and attached to the result.
pub trait UnitRunner {
    /// Runs the unit described by `job`.
    fn run_unit(&mut self, job: &WorkerJob) -> UnitResult;
}

impl<F> UnitRunner for F
where
    F: FnMut(&WorkerJob) -> UnitResult,
{
    fn run_unit(&mut self, job: &WorkerJob) -> UnitResult {
        self(job)
    }
}

/// Decodes `job_json`, runs the unit, and writes the result line to `out`.
///
/// Anything the runner writes to `out` before the result is diagnostic text. The result line is
/// always preceded by a newline so that it starts on a line of its own.
pub fn run_worker_job<R, W>(
    job_json: &str,
    runner: &mut R,
    out: &mut W,
) -> Result<UnitResult, UnitProcessError>
where
    R: UnitRunner + ?Sized,
    W: Write,
{
    let job = WorkerJob::from_json(job_json)?;

    if job.config.is_rerun {
        match job.sub_filter.as_ref().filter(|filter| !filter.is_empty()) {
            Some(filter) => writeln!(
                out,
                "Re-running {} in verbose mode (matching: {filter})",
                job.unit_id,
            ),
            None => writeln!(out, "Re-running {} in verbose mode", job.unit_id),
        }
        .map_err(UnitProcessError::Write)?;
        out.flush().map_err(UnitProcessError::Write)?;
    }

    let result = runner.run_unit(&job);

    let line = serde_json::to_string(&result).map_err(UnitProcessError::ResultEncode)?;
    writeln!(out).map_err(UnitProcessError::Write)?;
    writeln!(out, "{line}").map_err(UnitProcessError::Write)?;
    out.flush().map_err(UnitProcessError::Write)?;

    Ok(result)
}
