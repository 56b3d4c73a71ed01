// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events produced during a test run.
//!
//! Events are delivered, in order, to the callback passed to
//! [`TestRunner::execute`](crate::runner::TestRunner::execute). Formatting them for humans is up to
//! the caller.

use crate::{
    protocol::{UnitExecution, UnitId},
    signal::ShutdownEvent,
};
use chrono::{DateTime, Local};
use std::time::Duration;

/// Which pass of a run an event belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunPass {
    /// The initial pass over every submitted unit.
    Initial,

    /// The rerun pass over units that failed in the initial pass.
    Rerun,
}

/// A unit that a worker is currently running.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunningUnit {
    /// The worker slot running the unit, starting at 1.
    pub worker_id: usize,

    /// The unit being run.
    pub unit_id: UnitId,

    /// How long the unit has been running.
    pub elapsed: Duration,
}

/// Why a pass stopped before running every unit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StopReason {
    /// A unit failed and fail-fast is enabled.
    FailFast {
        /// The unit whose outcome triggered the stop.
        unit_id: UnitId,
    },

    /// A unit reported that it was interrupted.
    UnitInterrupted {
        /// The interrupted unit.
        unit_id: UnitId,
    },

    /// The runner received a shutdown signal.
    Signal(ShutdownEvent),
}

/// An event that occurred during a test run.
#[derive(Clone, Debug)]
pub enum RunEvent {
    /// A pass started.
    PassStarted {
        /// Which pass this is.
        pass: RunPass,

        /// When the pass started.
        start_time: DateTime<Local>,

        /// The units in this pass, in submission order.
        unit_ids: Vec<UnitId>,

        /// The number of workers.
        worker_count: usize,

        /// The per-unit timeout, if any.
        timeout: Option<Duration>,

        /// The deadline after which the runner kills a worker process, if any.
        worker_timeout: Option<Duration>,
    },

    /// A unit finished and its result was recorded.
    UnitFinished {
        /// Which pass this is.
        pass: RunPass,

        /// The number of units finished so far in this pass, including this one.
        index: usize,

        /// The number of units in this pass.
        total: usize,

        /// The number of failed or environment-changed units so far.
        failures: usize,

        /// What the worker reported.
        execution: UnitExecution,

        /// Units still running for longer than the progress threshold.
        running: Vec<RunningUnit>,
    },

    /// Periodic report of units that have been running for a long time.
    StillRunning {
        /// Units running for longer than the progress threshold.
        running: Vec<RunningUnit>,
    },

    /// The pass is stopping early. Units still running are killed and no new ones are started.
    Stopping {
        /// Why the pass is stopping.
        reason: StopReason,
    },

    /// A worker is slow to shut down.
    WaitingForWorker {
        /// The worker slot.
        worker_id: usize,

        /// How long the stop routine has been waiting.
        elapsed: Duration,
    },

    /// A pass finished.
    PassFinished {
        /// Which pass this is.
        pass: RunPass,

        /// How long the pass took.
        elapsed: Duration,
    },
}
