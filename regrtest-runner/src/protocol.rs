// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The wire protocol between the runner and worker processes.
//!
//! A worker process is launched with a single argument: a JSON-serialized [`WorkerJob`]. It runs
//! exactly one unit, writes whatever diagnostics it likes to its combined stdout and stderr, and
//! finishes by writing one JSON-serialized [`UnitResult`] as the very last line of output.
//!
//! The runner splits the captured output at the last newline with [`parse_worker_output`].

use crate::{
    config::RunConfig,
    errors::{JobDecodeError, ResultDecodeError},
    helpers::format_duration,
};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{fmt, time::Duration};

/// An opaque identifier for one test unit. Unique within a run.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(SmolStr);

impl UnitId {
    /// Creates a new unit id.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id))
    }

    /// Returns the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UnitId {
    fn from(id: String) -> Self {
        Self(SmolStr::from(id))
    }
}

/// A sub-filter selecting specific cases within a unit.
///
/// The runner never interprets the patterns: they are produced by one worker process as hints,
/// and handed back to a worker process during a rerun.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RerunFilter(Vec<String>);

impl RerunFilter {
    /// Creates a new filter from a list of patterns.
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(patterns.into_iter().map(Into::into).collect())
    }

    /// Returns the patterns in this filter.
    pub fn patterns(&self) -> &[String] {
        &self.0
    }

    /// Returns true if there are no patterns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RerunFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// The terminal classification of one attempt at running a unit.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// The unit passed.
    Passed,

    /// The unit failed.
    Failed,

    /// The unit was skipped.
    Skipped,

    /// The unit was skipped because a resource it needs wasn't available.
    ResourceDenied,

    /// The unit passed but altered the execution environment.
    EnvironmentChanged,

    /// The unit ran, but didn't run any tests.
    DidNotRun,

    /// The unit didn't finish within its timeout.
    Timeout,

    /// The unit was interrupted.
    Interrupted,

    /// Running the unit failed for reasons outside the unit: the worker process couldn't be
    /// launched, crashed, or didn't produce a valid result.
    OrchestrationError,
}

impl Outcome {
    /// Returns true if this outcome counts as a failure.
    ///
    /// An environment change only counts if `fail_env_changed` is set.
    pub fn is_failed(self, fail_env_changed: bool) -> bool {
        match self {
            Self::Failed | Self::Timeout | Self::OrchestrationError => true,
            Self::EnvironmentChanged => fail_env_changed,
            Self::Passed
            | Self::Skipped
            | Self::ResourceDenied
            | Self::DidNotRun
            | Self::Interrupted => false,
        }
    }

    /// Returns true if this outcome is in the failure category that is eligible for a rerun.
    pub fn needs_rerun(self) -> bool {
        self.is_failed(false)
    }

    /// Returns true if the run must stop after this outcome.
    pub fn must_stop(self, fail_fast: bool, fail_env_changed: bool) -> bool {
        match self {
            Self::Interrupted => true,
            _ => fail_fast && self.is_failed(fail_env_changed),
        }
    }

    /// Returns true if the duration of an attempt with this outcome is worth recording.
    pub fn has_meaningful_duration(self) -> bool {
        !matches!(
            self,
            Self::Skipped
                | Self::ResourceDenied
                | Self::Interrupted
                | Self::OrchestrationError
                | Self::DidNotRun
        )
    }
}

/// Numeric statistics reported by a unit about the test cases it ran.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestStats {
    /// The number of test cases run.
    #[serde(default)]
    pub tests_run: usize,

    /// The number of test cases that failed.
    #[serde(default)]
    pub failures: usize,

    /// The number of test cases that were skipped.
    #[serde(default)]
    pub skipped: usize,
}

impl TestStats {
    /// Adds `other` to these statistics.
    pub fn accumulate(&mut self, other: &TestStats) {
        self.tests_run += other.tests_run;
        self.failures += other.failures;
        self.skipped += other.skipped;
    }
}

/// The result of one attempt at running a unit.
///
/// Worker processes write this as the last line of their output.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnitResult {
    /// The unit this result is for.
    pub unit_id: UnitId,

    /// The outcome of the attempt.
    pub outcome: Outcome,

    /// How long the attempt took.
    ///
    /// The runner replaces this with its own measurement of the worker process.
    #[serde(default, with = "humantime_serde")]
    pub duration: Option<Duration>,

    /// Statistics about the test cases within the unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<TestStats>,

    /// Cases to select if this unit is rerun.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerun_hints: Option<RerunFilter>,

    /// Free-form diagnostic text.
    ///
    /// In the runner, this holds the output the worker process produced before its result line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl UnitResult {
    /// Creates a new result with no duration, statistics, hints or diagnostics.
    pub fn new(unit_id: UnitId, outcome: Outcome) -> Self {
        Self {
            unit_id,
            outcome,
            duration: None,
            stats: None,
            rerun_hints: None,
            diagnostic: None,
        }
    }

    /// Returns the rerun hints if there are any non-empty ones.
    pub fn rerun_filter(&self) -> Option<&RerunFilter> {
        self.rerun_hints.as_ref().filter(|hints| !hints.is_empty())
    }
}

impl fmt::Display for UnitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = &self.unit_id;
        match self.outcome {
            Outcome::Passed => write!(f, "{id} passed"),
            Outcome::Failed => write!(f, "{id} failed"),
            Outcome::Skipped => write!(f, "{id} skipped"),
            Outcome::ResourceDenied => write!(f, "{id} skipped (resource denied)"),
            Outcome::EnvironmentChanged => write!(f, "{id} failed (env changed)"),
            Outcome::DidNotRun => write!(f, "{id} ran no tests"),
            Outcome::Timeout => match self.duration {
                Some(duration) => write!(f, "{id} timed out ({})", format_duration(duration)),
                None => write!(f, "{id} timed out"),
            },
            Outcome::Interrupted => write!(f, "{id} interrupted"),
            Outcome::OrchestrationError => write!(f, "{id} process crashed"),
        }
    }
}

/// The unit of work handed to a worker process.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkerJob {
    /// The unit to run.
    pub unit_id: UnitId,

    /// The configuration of the pass this job belongs to.
    pub config: RunConfig,

    /// The cases to select within the unit, during a rerun.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_filter: Option<RerunFilter>,
}

impl WorkerJob {
    /// Creates the job for running `unit_id` under `config`.
    pub fn new(unit_id: UnitId, config: &RunConfig) -> Self {
        let sub_filter = config.sub_filter_for(&unit_id).cloned();
        Self {
            unit_id,
            config: config.clone(),
            sub_filter,
        }
    }

    /// Serializes this job for the worker command line.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes a job from the worker command line.
    pub fn from_json(json: &str) -> Result<Self, JobDecodeError> {
        serde_json::from_str(json).map_err(JobDecodeError::new)
    }
}

/// Splits worker output into its diagnostic text and its trailing result record.
///
/// Trailing whitespace is ignored. Everything before the last line is returned as-is, minus
/// trailing whitespace.
pub fn parse_worker_output(output: &str) -> Result<(&str, UnitResult), ResultDecodeError> {
    let output = output.trim_end();
    let (preceding, last_line) = match output.rsplit_once('\n') {
        Some((preceding, last_line)) => (preceding.trim_end(), last_line),
        None => ("", output),
    };

    if last_line.trim().is_empty() {
        return Err(ResultDecodeError::MissingResultLine);
    }

    let result = serde_json::from_str(last_line.trim())
        .map_err(|err| ResultDecodeError::InvalidResult { err })?;
    Ok((preceding, result))
}

/// What a worker publishes for each unit it runs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnitExecution {
    /// The result of the attempt.
    pub result: UnitResult,

    /// For orchestration errors, why the unit couldn't be run or its result couldn't be read.
    pub error_message: Option<String>,
}

impl UnitExecution {
    /// Creates an execution from a result decoded from a worker process.
    pub fn new(result: UnitResult) -> Self {
        Self {
            result,
            error_message: None,
        }
    }

    /// Creates an orchestration error, attaching the captured output as the diagnostic.
    pub fn orchestration_error(
        unit_id: UnitId,
        error_message: impl Into<String>,
        output: Option<String>,
    ) -> Self {
        let mut result = UnitResult::new(unit_id, Outcome::OrchestrationError);
        result.diagnostic = output.filter(|output| !output.is_empty());
        Self {
            result,
            error_message: Some(error_message.into()),
        }
    }

    /// Returns the unit id.
    pub fn unit_id(&self) -> &UnitId {
        &self.result.unit_id
    }
}

impl fmt::Display for UnitExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.result)?;
        if let Some(error_message) = &self.error_message {
            write!(f, " ({error_message})")?;
        }
        Ok(())
    }
}
