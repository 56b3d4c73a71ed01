// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The aggregated outcome of a test run.
//!
//! [`RunResults`] is owned and written by a single orchestrator loop. Callers get it back from
//! [`TestRunner::execute`](crate::runner::TestRunner::execute) once the run is over.

use crate::protocol::{Outcome, RerunFilter, TestStats, UnitExecution, UnitId};
use indexmap::{IndexMap, IndexSet};
use std::{collections::BTreeMap, fmt, time::Duration};
use tracing::warn;

/// Documented exit codes for a regrtest run.
///
/// When several apply, the first one listed in [`RunResults::exit_code`] wins.
pub enum RegrtestExitCode {}

impl RegrtestExitCode {
    /// No errors occurred and regrtest exited normally.
    pub const OK: i32 = 0;

    /// One or more units failed, timed out or crashed.
    pub const BAD_TEST: i32 = 2;

    /// One or more units altered the environment, and `fail-env-changed` is set.
    pub const ENV_CHANGED: i32 = 3;

    /// No units ran any tests.
    pub const NO_TESTS_RAN: i32 = 4;

    /// One or more units needed a rerun, and `fail-rerun` is set.
    pub const RERUN_FAIL: i32 = 5;

    /// An error was encountered while setting up the run.
    pub const SETUP_ERROR: i32 = 96;

    /// The run was interrupted.
    pub const INTERRUPTED: i32 = 130;
}

/// The overall verdict of one pass, not counting interruption.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// At least one unit failed.
    Failure,

    /// At least one unit altered the environment, and that counts as a failure.
    EnvChanged,

    /// No tests ran at all.
    NoTestsRan,
}

/// The state of a run at the end of one pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PassState {
    /// The verdict, or `None` for success.
    pub verdict: Option<Verdict>,

    /// Whether the run was interrupted.
    pub interrupted: bool,
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = self.verdict.map(|verdict| match verdict {
            Verdict::Failure => "FAILURE",
            Verdict::EnvChanged => "ENV CHANGED",
            Verdict::NoTestsRan => "NO TESTS RAN",
        });
        match (verdict, self.interrupted) {
            (Some(verdict), true) => write!(f, "{verdict}, INTERRUPTED"),
            (Some(verdict), false) => f.write_str(verdict),
            (None, true) => f.write_str("INTERRUPTED"),
            (None, false) => f.write_str("SUCCESS"),
        }
    }
}

/// The state of a run: the current pass state, and the state before the rerun pass if any.
///
/// Displayed as for example `FAILURE then SUCCESS`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RunState {
    /// The state at the end of the initial pass, if a rerun pass happened.
    pub first: Option<PassState>,

    /// The current state.
    pub last: PassState,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.first {
            Some(first) => write!(f, "{first} then {}", self.last),
            None => write!(f, "{}", self.last),
        }
    }
}

/// The units and sub-filters for a rerun pass, returned by [`RunResults::begin_rerun`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RerunPlan {
    /// The units to rerun, in the order they failed.
    pub unit_ids: Vec<UnitId>,

    /// Sub-filters derived from the hints of the failed results.
    pub filters: BTreeMap<UnitId, RerunFilter>,
}

/// Process-wide accumulator of categorized outcomes and statistics.
///
/// Each bucket preserves arrival order, which is completion order rather than submission order.
/// A unit is in at most one bucket at a time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunResults {
    fail_env_changed: bool,
    fail_rerun: bool,
    selected: IndexSet<UnitId>,

    passed: IndexSet<UnitId>,
    failed: IndexSet<UnitId>,
    timed_out: IndexSet<UnitId>,
    orchestration_errors: IndexSet<UnitId>,
    skipped: IndexSet<UnitId>,
    resource_denied: IndexSet<UnitId>,
    env_changed: IndexSet<UnitId>,
    did_not_run: IndexSet<UnitId>,
    interrupted_units: IndexSet<UnitId>,

    needs_rerun: IndexMap<UnitId, Option<RerunFilter>>,
    rerun: IndexSet<UnitId>,
    first_pass_failures: IndexSet<UnitId>,
    first_state: Option<PassState>,
    interrupted: bool,

    total_stats: TestStats,
    test_times: Vec<(UnitId, Duration)>,
    executions: IndexMap<UnitId, UnitExecution>,

    in_rerun: bool,
    recorded_this_pass: IndexSet<UnitId>,
}

impl RunResults {
    /// Creates empty results for a run over `selected`.
    pub fn new(
        selected: impl IntoIterator<Item = UnitId>,
        fail_env_changed: bool,
        fail_rerun: bool,
    ) -> Self {
        Self {
            fail_env_changed,
            fail_rerun,
            selected: selected.into_iter().collect(),
            passed: IndexSet::new(),
            failed: IndexSet::new(),
            timed_out: IndexSet::new(),
            orchestration_errors: IndexSet::new(),
            skipped: IndexSet::new(),
            resource_denied: IndexSet::new(),
            env_changed: IndexSet::new(),
            did_not_run: IndexSet::new(),
            interrupted_units: IndexSet::new(),
            needs_rerun: IndexMap::new(),
            rerun: IndexSet::new(),
            first_pass_failures: IndexSet::new(),
            first_state: None,
            interrupted: false,
            total_stats: TestStats::default(),
            test_times: Vec::new(),
            executions: IndexMap::new(),
            in_rerun: false,
            recorded_this_pass: IndexSet::new(),
        }
    }

    /// Records the result of one unit.
    ///
    /// Returns false, and logs a warning, if the unit wasn't submitted or already has a result in
    /// the current pass. Such results are ignored.
    pub fn record(&mut self, execution: UnitExecution) -> bool {
        let unit_id = execution.unit_id().clone();
        if !self.selected.contains(&unit_id) {
            warn!("ignoring result for unit `{unit_id}` that was not submitted");
            return false;
        }
        if !self.recorded_this_pass.insert(unit_id.clone()) {
            warn!("ignoring duplicate result for unit `{unit_id}`");
            return false;
        }

        let result = &execution.result;
        let bucket = match result.outcome {
            Outcome::Passed => &mut self.passed,
            Outcome::Failed => &mut self.failed,
            Outcome::Timeout => &mut self.timed_out,
            Outcome::OrchestrationError => &mut self.orchestration_errors,
            Outcome::Skipped => &mut self.skipped,
            Outcome::ResourceDenied => &mut self.resource_denied,
            Outcome::EnvironmentChanged => &mut self.env_changed,
            Outcome::DidNotRun => &mut self.did_not_run,
            Outcome::Interrupted => {
                self.interrupted = true;
                &mut self.interrupted_units
            }
        };
        bucket.insert(unit_id.clone());

        if result.outcome.needs_rerun() {
            self.needs_rerun
                .insert(unit_id.clone(), result.rerun_filter().cloned());
        }
        if !self.in_rerun && result.outcome.has_meaningful_duration() {
            if let Some(duration) = result.duration {
                self.test_times.push((unit_id.clone(), duration));
            }
        }
        if let Some(stats) = &result.stats {
            self.total_stats.accumulate(stats);
        }
        if self.in_rerun {
            self.rerun.insert(unit_id.clone());
        }

        self.executions.insert(unit_id, execution);
        true
    }

    /// Marks the run as interrupted by an external signal.
    pub fn set_interrupted(&mut self) {
        self.interrupted = true;
    }

    /// Prepares for a rerun pass over the units that need one.
    ///
    /// Returns `None` without changing anything if no unit needs a rerun. Otherwise, records the
    /// current state as the first-pass state, moves failures out of the failure buckets, and
    /// returns the units to rerun along with their sub-filters.
    pub fn begin_rerun(&mut self) -> Option<RerunPlan> {
        if self.needs_rerun.is_empty() {
            return None;
        }

        self.first_state = Some(self.pass_state());

        let needs_rerun = std::mem::take(&mut self.needs_rerun);
        let mut unit_ids = Vec::with_capacity(needs_rerun.len());
        let mut filters = BTreeMap::new();
        for (unit_id, filter) in needs_rerun {
            if let Some(filter) = filter {
                filters.insert(unit_id.clone(), filter);
            }
            unit_ids.push(unit_id);
        }

        for bucket in [
            &mut self.failed,
            &mut self.timed_out,
            &mut self.orchestration_errors,
        ] {
            self.first_pass_failures.extend(bucket.drain(..));
        }

        self.in_rerun = true;
        self.recorded_this_pass.clear();

        Some(RerunPlan { unit_ids, filters })
    }

    /// Closes the rerun pass started by [`begin_rerun`](Self::begin_rerun).
    ///
    /// A rerun pass that stopped early leaves some units without a new result. Those go back to
    /// the failure bucket of their first-pass result, so every executed unit stays in a bucket.
    pub fn end_rerun(&mut self) {
        if !self.in_rerun {
            return;
        }
        for unit_id in &self.first_pass_failures {
            if self.recorded_this_pass.contains(unit_id) {
                continue;
            }
            let Some(execution) = self.executions.get(unit_id) else {
                continue;
            };
            let bucket = match execution.result.outcome {
                Outcome::Failed => &mut self.failed,
                Outcome::Timeout => &mut self.timed_out,
                Outcome::OrchestrationError => &mut self.orchestration_errors,
                _ => continue,
            };
            bucket.insert(unit_id.clone());
        }
        self.in_rerun = false;
    }

    // ---
    // Queries
    // ---

    /// Returns the submitted units, in submission order.
    pub fn selected(&self) -> &IndexSet<UnitId> {
        &self.selected
    }

    /// Returns units that passed.
    pub fn passed(&self) -> &IndexSet<UnitId> {
        &self.passed
    }

    /// Returns units that failed.
    pub fn failed(&self) -> &IndexSet<UnitId> {
        &self.failed
    }

    /// Returns units that timed out.
    pub fn timed_out(&self) -> &IndexSet<UnitId> {
        &self.timed_out
    }

    /// Returns units whose worker process crashed or produced no valid result.
    pub fn orchestration_errors(&self) -> &IndexSet<UnitId> {
        &self.orchestration_errors
    }

    /// Returns units that were skipped.
    pub fn skipped(&self) -> &IndexSet<UnitId> {
        &self.skipped
    }

    /// Returns units skipped because a resource was denied.
    pub fn resource_denied(&self) -> &IndexSet<UnitId> {
        &self.resource_denied
    }

    /// Returns units that altered the execution environment.
    pub fn env_changed(&self) -> &IndexSet<UnitId> {
        &self.env_changed
    }

    /// Returns units that ran no tests.
    pub fn did_not_run(&self) -> &IndexSet<UnitId> {
        &self.did_not_run
    }

    /// Returns units that reported being interrupted.
    pub fn interrupted_units(&self) -> &IndexSet<UnitId> {
        &self.interrupted_units
    }

    /// Returns units in the failure category: failed, timed out, or orchestration errors.
    pub fn failed_units(&self) -> impl Iterator<Item = &UnitId> {
        self.failed
            .iter()
            .chain(&self.timed_out)
            .chain(&self.orchestration_errors)
    }

    /// Returns the number of failed or environment-changed units.
    pub fn failure_count(&self) -> usize {
        self.failed.len()
            + self.timed_out.len()
            + self.orchestration_errors.len()
            + self.env_changed.len()
    }

    /// Returns units that still need a rerun, with their hints.
    pub fn needs_rerun(&self) -> &IndexMap<UnitId, Option<RerunFilter>> {
        &self.needs_rerun
    }

    /// Returns units that were run again in the rerun pass.
    pub fn rerun(&self) -> &IndexSet<UnitId> {
        &self.rerun
    }

    /// Returns units that were in the failure category before the rerun pass.
    pub fn first_pass_failures(&self) -> &IndexSet<UnitId> {
        &self.first_pass_failures
    }

    /// Returns true if the run was interrupted.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Returns the accumulated statistics of every unit.
    pub fn total_stats(&self) -> &TestStats {
        &self.total_stats
    }

    /// Returns the last execution recorded for a unit.
    pub fn execution(&self, unit_id: &UnitId) -> Option<&UnitExecution> {
        self.executions.get(unit_id)
    }

    /// Returns the last execution recorded for every unit, in arrival order.
    pub fn executions(&self) -> impl Iterator<Item = &UnitExecution> {
        self.executions.values()
    }

    /// Returns every unit with a result.
    pub fn executed(&self) -> IndexSet<&UnitId> {
        self.executions.keys().collect()
    }

    /// Returns submitted units that never produced a result, in submission order.
    ///
    /// This happens when a pass stops early. It's distinct from units that ran no tests.
    pub fn omitted(&self) -> Vec<&UnitId> {
        self.selected
            .iter()
            .filter(|unit_id| !self.executions.contains_key(*unit_id))
            .collect()
    }

    /// Returns the `n` slowest units of the initial pass, slowest first.
    pub fn slowest(&self, n: usize) -> Vec<(&UnitId, Duration)> {
        let mut times: Vec<_> = self
            .test_times
            .iter()
            .map(|(unit_id, duration)| (unit_id, *duration))
            .collect();
        times.sort_by(|a, b| b.1.cmp(&a.1));
        times.truncate(n);
        times
    }

    /// Returns true if no tests ran at all.
    pub fn no_tests_run(&self) -> bool {
        self.passed.is_empty()
            && self.failed_units().next().is_none()
            && self.skipped.is_empty()
            && !self.interrupted
            && self.env_changed.is_empty()
    }

    /// Returns the state of the run.
    pub fn state(&self) -> RunState {
        RunState {
            first: self.first_state,
            last: self.pass_state(),
        }
    }

    /// Returns the process exit code for this run. See [`RegrtestExitCode`].
    pub fn exit_code(&self) -> i32 {
        if self.failed_units().next().is_some() {
            RegrtestExitCode::BAD_TEST
        } else if self.interrupted {
            RegrtestExitCode::INTERRUPTED
        } else if self.fail_env_changed && !self.env_changed.is_empty() {
            RegrtestExitCode::ENV_CHANGED
        } else if self.no_tests_run() {
            RegrtestExitCode::NO_TESTS_RAN
        } else if self.fail_rerun && !self.rerun.is_empty() {
            RegrtestExitCode::RERUN_FAIL
        } else {
            RegrtestExitCode::OK
        }
    }

    fn pass_state(&self) -> PassState {
        let verdict = if self.failed_units().next().is_some() {
            Some(Verdict::Failure)
        } else if self.fail_env_changed && !self.env_changed.is_empty() {
            Some(Verdict::EnvChanged)
        } else if self.no_tests_run() {
            Some(Verdict::NoTestsRan)
        } else {
            None
        };
        PassState {
            verdict,
            interrupted: self.interrupted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::UnitResult;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_case::test_case;
    use test_strategy::proptest;

    fn execution(id: &str, outcome: Outcome) -> UnitExecution {
        let mut result = UnitResult::new(UnitId::new(id), outcome);
        result.duration = Some(Duration::from_millis(10));
        UnitExecution::new(result)
    }

    fn ids<'a>(set: impl IntoIterator<Item = &'a UnitId>) -> Vec<&'a str> {
        set.into_iter().map(|id| id.as_str()).collect()
    }

    fn results(selected: &[&str]) -> RunResults {
        RunResults::new(selected.iter().copied().map(UnitId::new), false, false)
    }

    #[test]
    fn buckets_in_arrival_order() {
        let mut results = results(&["a", "b", "c", "d", "e", "f"]);
        for (id, outcome) in [
            ("c", Outcome::Passed),
            ("a", Outcome::Passed),
            ("b", Outcome::Timeout),
            ("e", Outcome::ResourceDenied),
            ("d", Outcome::EnvironmentChanged),
        ] {
            assert!(results.record(execution(id, outcome)));
        }

        assert_eq!(ids(results.passed()), ["c", "a"]);
        assert_eq!(ids(results.timed_out()), ["b"]);
        assert_eq!(ids(results.resource_denied()), ["e"]);
        assert_eq!(ids(results.env_changed()), ["d"]);
        assert_eq!(ids(results.omitted()), ["f"]);
        assert_eq!(ids(results.needs_rerun().keys()), ["b"]);
        assert_eq!(results.failure_count(), 2);
    }

    #[test]
    fn unknown_and_duplicate_results_are_ignored() {
        let mut results = results(&["a"]);
        assert!(!results.record(execution("zzz", Outcome::Passed)));
        assert!(results.record(execution("a", Outcome::Failed)));
        assert!(!results.record(execution("a", Outcome::Passed)));

        assert_eq!(ids(results.failed()), ["a"]);
        assert!(results.passed().is_empty());
        assert_eq!(results.executed().len(), 1);
    }

    #[test]
    fn stats_and_times() {
        let mut results = results(&["a", "b", "c"]);

        let mut a = execution("a", Outcome::Passed);
        a.result.duration = Some(Duration::from_secs(3));
        a.result.stats = Some(TestStats {
            tests_run: 10,
            failures: 0,
            skipped: 2,
        });
        let mut b = execution("b", Outcome::Failed);
        b.result.duration = Some(Duration::from_secs(5));
        b.result.stats = Some(TestStats {
            tests_run: 4,
            failures: 1,
            skipped: 0,
        });
        let mut c = execution("c", Outcome::Skipped);
        c.result.duration = Some(Duration::from_secs(60));

        for execution in [a, b, c] {
            results.record(execution);
        }

        assert_eq!(
            results.total_stats(),
            &TestStats {
                tests_run: 14,
                failures: 1,
                skipped: 2,
            }
        );
        let slowest: Vec<_> = results
            .slowest(10)
            .into_iter()
            .map(|(id, duration)| (id.as_str(), duration))
            .collect();
        assert_eq!(
            slowest,
            [("b", Duration::from_secs(5)), ("a", Duration::from_secs(3))],
            "skipped units have no meaningful duration"
        );
    }

    #[test_case(&[("a", Outcome::Passed)], false, false, "SUCCESS", RegrtestExitCode::OK; "success")]
    #[test_case(&[("a", Outcome::Passed), ("b", Outcome::Failed)], false, false, "FAILURE", RegrtestExitCode::BAD_TEST; "failure")]
    #[test_case(&[("a", Outcome::OrchestrationError)], false, false, "FAILURE", RegrtestExitCode::BAD_TEST; "crash")]
    #[test_case(&[("a", Outcome::EnvironmentChanged)], false, false, "SUCCESS", RegrtestExitCode::OK; "env changed tolerated")]
    #[test_case(&[("a", Outcome::EnvironmentChanged)], true, false, "ENV CHANGED", RegrtestExitCode::ENV_CHANGED; "env changed fails")]
    #[test_case(&[("a", Outcome::DidNotRun)], false, false, "NO TESTS RAN", RegrtestExitCode::NO_TESTS_RAN; "no tests")]
    #[test_case(&[("a", Outcome::ResourceDenied)], false, false, "NO TESTS RAN", RegrtestExitCode::NO_TESTS_RAN; "only resource denied")]
    #[test_case(&[("a", Outcome::Passed), ("b", Outcome::Interrupted)], false, false, "INTERRUPTED", RegrtestExitCode::INTERRUPTED; "interrupted")]
    #[test_case(&[("a", Outcome::Failed), ("b", Outcome::Interrupted)], false, false, "FAILURE, INTERRUPTED", RegrtestExitCode::BAD_TEST; "failure wins")]
    fn state_and_exit_code(
        outcomes: &[(&str, Outcome)],
        fail_env_changed: bool,
        fail_rerun: bool,
        state: &str,
        exit_code: i32,
    ) {
        let mut results = RunResults::new(
            outcomes.iter().map(|(id, _)| UnitId::new(id)),
            fail_env_changed,
            fail_rerun,
        );
        for (id, outcome) in outcomes {
            results.record(execution(id, *outcome));
        }

        assert_eq!(results.state().to_string(), state);
        assert_eq!(results.exit_code(), exit_code);
    }

    #[test]
    fn signal_interrupt() {
        let mut results = results(&["a", "b"]);
        results.record(execution("a", Outcome::Passed));
        results.set_interrupted();

        assert_eq!(results.state().to_string(), "INTERRUPTED");
        assert_eq!(results.exit_code(), RegrtestExitCode::INTERRUPTED);
        assert_eq!(ids(results.omitted()), ["b"]);
    }

    #[test]
    fn empty_rerun_is_a_no_op() {
        let mut results = results(&["a", "b"]);
        results.record(execution("a", Outcome::Passed));
        results.record(execution("b", Outcome::Skipped));

        let before = results.clone();
        assert_eq!(results.begin_rerun(), None);
        assert_eq!(results, before);
    }

    #[test]
    fn rerun_moves_failures() {
        let mut results = RunResults::new(["a", "b", "c", "d"].map(UnitId::new), false, true);
        let mut b = execution("b", Outcome::Failed);
        b.result.rerun_hints = Some(RerunFilter::new(["test_x"]));
        results.record(execution("a", Outcome::Passed));
        results.record(b);
        results.record(execution("c", Outcome::Timeout));
        let mut d = execution("d", Outcome::Failed);
        d.result.rerun_hints = Some(RerunFilter::default());
        results.record(d);

        let plan = results.begin_rerun().unwrap();
        assert_eq!(ids(&plan.unit_ids), ["b", "c", "d"]);
        assert_eq!(
            plan.filters,
            maplit::btreemap! {
                UnitId::new("b") => RerunFilter::new(["test_x"]),
            },
            "empty hints are dropped"
        );
        assert!(results.failed_units().next().is_none());
        assert!(results.needs_rerun().is_empty());
        assert_eq!(ids(results.first_pass_failures()), ["b", "c", "d"]);

        results.record(execution("b", Outcome::Passed));
        results.record(execution("c", Outcome::Failed));
        results.record(execution("d", Outcome::Passed));

        assert_eq!(ids(results.passed()), ["a", "b", "d"]);
        assert_eq!(ids(results.failed()), ["c"]);
        assert_eq!(ids(results.rerun()), ["b", "c", "d"]);
        assert_eq!(results.state().to_string(), "FAILURE then FAILURE");
        assert_eq!(results.exit_code(), RegrtestExitCode::BAD_TEST);
    }

    #[test]
    fn rerun_all_pass() {
        let mut results = RunResults::new(["a", "b"].map(UnitId::new), false, false);
        results.record(execution("a", Outcome::Passed));
        results.record(execution("b", Outcome::OrchestrationError));
        results.begin_rerun().unwrap();
        results.record(execution("b", Outcome::Passed));

        assert_eq!(results.state().to_string(), "FAILURE then SUCCESS");
        assert_eq!(results.exit_code(), RegrtestExitCode::OK);
        assert!(results.omitted().is_empty());

        let mut strict = results.clone();
        strict.fail_rerun = true;
        assert_eq!(strict.exit_code(), RegrtestExitCode::RERUN_FAIL);
    }

    #[test]
    fn interrupted_rerun_keeps_unreported_failures() {
        let mut results = results(&["a", "b", "c"]);
        results.record(execution("a", Outcome::Failed));
        results.record(execution("b", Outcome::Failed));
        results.record(execution("c", Outcome::Timeout));
        results.begin_rerun().unwrap();

        results.record(execution("a", Outcome::Interrupted));
        results.end_rerun();
        results.end_rerun();

        assert_eq!(ids(results.interrupted_units()), ["a"]);
        assert_eq!(ids(results.failed()), ["b"]);
        assert_eq!(ids(results.timed_out()), ["c"]);
        assert_eq!(ids(results.rerun()), ["a"]);
        assert!(results.omitted().is_empty());
        assert_eq!(all_buckets(&results).len(), 3, "no unit vanishes");
        assert_eq!(results.state().to_string(), "FAILURE then FAILURE, INTERRUPTED");
        assert_eq!(results.exit_code(), RegrtestExitCode::BAD_TEST);
    }

    #[test]
    fn end_rerun_without_rerun_is_a_no_op() {
        let mut results = results(&["a"]);
        results.record(execution("a", Outcome::Failed));
        let before = results.clone();
        results.end_rerun();
        assert_eq!(results, before);
    }

    fn arb_outcome() -> impl Strategy<Value = Outcome> {
        prop_oneof![
            Just(Outcome::Passed),
            Just(Outcome::Failed),
            Just(Outcome::Skipped),
            Just(Outcome::ResourceDenied),
            Just(Outcome::EnvironmentChanged),
            Just(Outcome::DidNotRun),
            Just(Outcome::Timeout),
            Just(Outcome::OrchestrationError),
        ]
    }

    fn all_buckets(results: &RunResults) -> Vec<&UnitId> {
        results
            .passed()
            .iter()
            .chain(results.failed_units())
            .chain(results.skipped())
            .chain(results.resource_denied())
            .chain(results.env_changed())
            .chain(results.did_not_run())
            .chain(results.interrupted_units())
            .collect()
    }

    // Without interruption, every submitted unit that reports ends up in exactly one bucket, and
    // the rest are omitted.
    #[proptest]
    fn buckets_partition_selected(
        #[strategy(prop::collection::vec(arb_outcome(), 0..40))] outcomes: Vec<Outcome>,
        #[strategy(0..=#outcomes.len())] reported: usize,
        shuffle_seed: u64,
    ) {
        let ids: Vec<_> = (0..outcomes.len())
            .map(|i| UnitId::new(format!("unit_{i}")))
            .collect();
        let mut results = RunResults::new(ids.iter().cloned(), false, false);

        // Report a subset, in an order that differs from submission order.
        let mut order: Vec<usize> = (0..outcomes.len()).collect();
        let len = order.len().max(1);
        order.rotate_left((shuffle_seed as usize) % len);
        for &i in order.iter().take(reported) {
            let mut result = UnitResult::new(ids[i].clone(), outcomes[i]);
            result.duration = Some(Duration::from_millis(i as u64));
            prop_assert!(results.record(UnitExecution::new(result)));
        }

        let buckets = all_buckets(&results);
        let unique: IndexSet<_> = buckets.iter().copied().collect();
        prop_assert_eq!(unique.len(), buckets.len(), "buckets are disjoint");
        prop_assert_eq!(buckets.len(), reported);
        prop_assert_eq!(buckets.len() + results.omitted().len(), ids.len());
        for unit_id in results.needs_rerun().keys() {
            prop_assert!(results.failed_units().any(|failed| failed == unit_id));
        }

        if results.begin_rerun().is_some() {
            prop_assert!(results.failed_units().next().is_none());
            let buckets = all_buckets(&results);
            prop_assert_eq!(
                buckets.len() + results.first_pass_failures().len(),
                reported,
            );
        }
    }
}
