// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared definitions for the `fake-unit` worker program.

use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;

/// Directory where `fake-unit` keeps markers and state between runs.
pub const STATE_DIR_ENV: &str = "REGRTEST_FAKE_STATE_DIR";

/// How long `slow` and `late` units take to finish.
pub const SLOW_UNIT_SECS: u64 = 2;

/// What `fake-unit` does for a unit, chosen by the unit id's prefix (the part before `_`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Behavior {
    /// Pass, reporting a few tests run.
    Pass,
    /// Fail, with a rerun hint naming one test case.
    Fail,
    /// Fail the first time, and pass when the state directory says it already ran.
    Flaky,
    /// Write a marker to the state directory, then pass after a couple of seconds.
    Slow,
    /// Fail after a couple of seconds.
    Late,
    /// Spawn a long-running child process, record its pid, and never finish.
    Hang,
    /// Print a line that isn't a valid result, then exit successfully.
    Garbage,
    /// Print some output and exit with code 3 without writing a result.
    Crash,
    /// Report that the environment was altered.
    Env,
    /// Report that the unit was skipped.
    Skip,
    /// Report that a required resource was unavailable.
    Denied,
    /// Report that no tests ran.
    NoRun,
    /// Report that the unit was interrupted.
    Interrupt,
}

impl Behavior {
    /// Parses the behavior out of a unit id.
    pub fn from_unit_id(unit_id: &str) -> Option<Self> {
        let prefix = unit_id.split_once('_').map_or(unit_id, |(prefix, _)| prefix);
        let behavior = match prefix {
            "pass" => Self::Pass,
            "fail" => Self::Fail,
            "flaky" => Self::Flaky,
            "slow" => Self::Slow,
            "late" => Self::Late,
            "hang" => Self::Hang,
            "garbage" => Self::Garbage,
            "crash" => Self::Crash,
            "env" => Self::Env,
            "skip" => Self::Skip,
            "denied" => Self::Denied,
            "norun" => Self::NoRun,
            "interrupt" => Self::Interrupt,
            _ => return None,
        };
        Some(behavior)
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Flaky => "flaky",
            Self::Slow => "slow",
            Self::Late => "late",
            Self::Hang => "hang",
            Self::Garbage => "garbage",
            Self::Crash => "crash",
            Self::Env => "env",
            Self::Skip => "skip",
            Self::Denied => "denied",
            Self::NoRun => "norun",
            Self::Interrupt => "interrupt",
        };
        f.write_str(s)
    }
}

/// Path of the marker a `slow` unit writes when it starts.
pub fn started_marker(state_dir: &Utf8Path, unit_id: &str) -> Utf8PathBuf {
    state_dir.join(format!("{unit_id}.started"))
}

/// Path of the file a `hang` unit writes its child's pid to.
pub fn child_pid_file(state_dir: &Utf8Path, unit_id: &str) -> Utf8PathBuf {
    state_dir.join(format!("{unit_id}.pid"))
}

/// Path of the file a `flaky` unit writes after its first attempt.
pub fn attempted_marker(state_dir: &Utf8Path, unit_id: &str) -> Utf8PathBuf {
    state_dir.join(format!("{unit_id}.attempted"))
}
