// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

/// Measures how long a pass or a unit has been running.
///
/// The start time comes from the realtime clock and is only used for display. Elapsed time comes
/// from the monotonic clock.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Stopwatch {
    started_at: DateTime<Local>,
    started: Instant,
}

impl Stopwatch {
    pub(crate) fn start() -> Self {
        Self {
            started_at: Local::now(),
            started: Instant::now(),
        }
    }

    pub(crate) fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
