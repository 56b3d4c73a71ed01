// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestThreads;
use crate::protocol::{RerunFilter, UnitId};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};

/// The default interval between "still running" progress reports.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

/// The maximum extra time the parent grants a worker past the per-unit timeout.
///
/// Units are expected to enforce their own timeout and report it with diagnostics. The parent only
/// steps in when that fails.
pub const MAX_TIMEOUT_GRACE: Duration = Duration::from_secs(5 * 60);

/// The configuration for one pass of a test run.
///
/// This value is shared read-only by every worker, and is copied verbatim into each job sent to a
/// worker process.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    /// The number of worker processes to run at once.
    pub test_threads: TestThreads,

    /// The per-unit timeout, if any.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// Stop the run after the first failure.
    #[serde(default)]
    pub fail_fast: bool,

    /// Treat an environment-changed outcome as a failure.
    #[serde(default)]
    pub fail_env_changed: bool,

    /// Exit with a dedicated code if any unit needed to be rerun, even if it then passed.
    #[serde(default)]
    pub fail_rerun: bool,

    /// Verbose output in worker processes.
    #[serde(default)]
    pub verbose: bool,

    /// Quiet output in worker processes.
    #[serde(default)]
    pub quiet: bool,

    /// Rerun failed units in a second pass after the initial one.
    #[serde(default)]
    pub rerun_failed: bool,

    /// Whether this pass is itself a rerun pass.
    #[serde(default)]
    pub is_rerun: bool,

    /// Sub-filters to apply per unit. Only used during a rerun pass.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rerun_filters: BTreeMap<UnitId, RerunFilter>,

    /// How often to report units that have been running for a long time. Zero disables these
    /// reports.
    #[serde(default = "default_progress_interval", with = "humantime_serde")]
    pub progress_interval: Duration,
}

fn default_progress_interval() -> Duration {
    DEFAULT_PROGRESS_INTERVAL
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            test_threads: TestThreads::NumCpus,
            timeout: None,
            fail_fast: false,
            fail_env_changed: false,
            fail_rerun: false,
            verbose: false,
            quiet: false,
            rerun_failed: false,
            is_rerun: false,
            rerun_filters: BTreeMap::new(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl RunConfig {
    /// Returns the deadline after which the parent forcibly kills a worker process.
    ///
    /// This is `min(timeout * 1.5, timeout + 5 min)`, or `None` if there's no timeout.
    pub fn worker_timeout(&self) -> Option<Duration> {
        self.timeout
            .map(|timeout| timeout.mul_f64(1.5).min(timeout + MAX_TIMEOUT_GRACE))
    }

    /// Returns the sub-filter for this unit, if this is a rerun pass and one is set.
    pub fn sub_filter_for(&self, unit_id: &UnitId) -> Option<&RerunFilter> {
        if self.is_rerun {
            self.rerun_filters.get(unit_id)
        } else {
            None
        }
    }

    /// Returns the configuration for a rerun pass derived from this one.
    ///
    /// Verbosity is forced on, fail-fast is disabled, and parallelism is left as configured.
    pub fn for_rerun(&self, rerun_filters: BTreeMap<UnitId, RerunFilter>) -> Self {
        Self {
            is_rerun: true,
            verbose: true,
            quiet: false,
            fail_fast: false,
            rerun_filters,
            ..self.clone()
        }
    }
}
