// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests
//!
//! These tests run real worker processes, using the `fake-unit` helper binary as the worker
//! program. The unit id's prefix decides what `fake-unit` does: see
//! `integration_tests::fake_unit::Behavior`.
//!
//! CLI tests go through `regrtest-dup`, a copy of the `regrtest` binary built by this package.

use integration_tests::fake_unit::started_marker;
use pretty_assertions::assert_eq;
use regrtest_runner::{
    events::{RunEvent, RunPass, StopReason},
    protocol::{Outcome, UnitId},
    results::RegrtestExitCode,
};
use std::time::Duration;

mod cli;
mod fixtures;

use fixtures::*;

#[test]
fn test_timeout_kills_unit() {
    let mut run = FakeRun::new(2);
    run.config.timeout = Some(Duration::from_secs(1));

    let (results, events) = run.execute(&["pass_1", "pass_2", "hang_3", "pass_4", "pass_5"]);

    assert_eq!(ids(results.passed()), ["pass_1", "pass_2", "pass_4", "pass_5"]);
    assert_eq!(ids(results.timed_out()), ["hang_3"]);
    assert!(results.omitted().is_empty(), "every unit was run");
    assert_eq!(results.exit_code(), RegrtestExitCode::BAD_TEST);
    assert_eq!(results.state().to_string(), "FAILURE");

    let hang = results
        .execution(&UnitId::new("hang_3"))
        .expect("hang_3 has a result");
    let duration = hang.result.duration.expect("timed out unit has a duration");
    assert!(
        duration >= Duration::from_millis(1500),
        "worker was killed after the worker timeout, not before ({duration:?})"
    );

    let finished: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            RunEvent::UnitFinished { index, total, .. } => Some((*index, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(finished, [(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);

    // The hanging unit's own child process is killed along with it.
    #[cfg(unix)]
    assert_hang_child_dead(run.state_dir(), "hang_3");
}

#[test]
fn test_invalid_result_line() {
    let run = FakeRun::new(1);
    let (results, _) = run.execute(&["garbage_1"]);

    assert_eq!(ids(results.orchestration_errors()), ["garbage_1"]);
    let execution = results
        .execution(&UnitId::new("garbage_1"))
        .expect("garbage_1 has a result");
    assert_eq!(execution.result.outcome, Outcome::OrchestrationError);
    let error_message = execution.error_message.as_deref().unwrap_or_default();
    assert!(
        error_message.starts_with("failed to parse worker result: "),
        "unexpected error message: {error_message}"
    );
    let diagnostic = execution.result.diagnostic.as_deref().unwrap_or_default();
    assert!(
        diagnostic.contains("this is not a result"),
        "raw output is kept: {diagnostic}"
    );
}

#[test]
fn test_worker_crash() {
    let run = FakeRun::new(1);
    let (results, _) = run.execute(&["crash_1", "pass_2"]);

    assert_eq!(ids(results.orchestration_errors()), ["crash_1"]);
    assert_eq!(ids(results.passed()), ["pass_2"]);
    let execution = results
        .execution(&UnitId::new("crash_1"))
        .expect("crash_1 has a result");
    assert_eq!(execution.error_message.as_deref(), Some("exit code 3"));
    assert!(
        execution
            .result
            .diagnostic
            .as_deref()
            .unwrap_or_default()
            .contains("fatal error in crash_1"),
        "{execution:?}"
    );
    assert_eq!(results.exit_code(), RegrtestExitCode::BAD_TEST);
}

#[test]
fn test_fail_fast() {
    let mut run = FakeRun::new(2);
    run.config.fail_fast = true;

    let (results, events) = run.execute(&["slow_a", "fail_b", "slow_c"]);

    assert_eq!(ids(results.failed()), ["fail_b"]);
    assert!(
        results.omitted().contains(&&UnitId::new("slow_c")),
        "slow_c is omitted: {:?}",
        results.omitted()
    );
    assert!(!results.did_not_run().contains(&UnitId::new("slow_c")));
    assert!(
        !started_marker(run.state_dir(), "slow_c").exists(),
        "slow_c was never started"
    );
    assert!(
        events.iter().any(|event| matches!(
            event,
            RunEvent::Stopping {
                reason: StopReason::FailFast { unit_id },
            } if unit_id.as_str() == "fail_b"
        )),
        "a fail-fast stop was reported"
    );
    assert_eq!(results.exit_code(), RegrtestExitCode::BAD_TEST);
}

#[test]
fn test_fail_fast_kills_units_in_flight() {
    let hangs: Vec<_> = (1..=7).map(|i| format!("hang_{i}")).collect();
    let mut units: Vec<&str> = hangs.iter().map(String::as_str).collect();
    units.push("late_8");

    // Killed units racing with the stop must never be classified by their exit status.
    for _ in 0..3 {
        let mut run = FakeRun::new(8);
        run.config.fail_fast = true;

        let (results, _) = run.execute(&units);

        assert_eq!(ids(results.failed()), ["late_8"]);
        assert!(
            results.orchestration_errors().is_empty(),
            "killed units are not crashes: {:?}",
            results.orchestration_errors()
        );
        let omitted = ids(results.omitted());
        assert_eq!(omitted, hangs.iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(results.exit_code(), RegrtestExitCode::BAD_TEST);

        #[cfg(unix)]
        for unit_id in &hangs {
            assert_hang_child_dead(run.state_dir(), unit_id);
        }
    }
}

#[cfg(unix)]
#[test]
fn test_signal_stops_run() {
    use regrtest_runner::signal::{ShutdownEvent, SignalHandlerKind};

    let mut run = FakeRun::new(2);
    run.config.rerun_failed = true;
    let state_dir = run.state_dir().to_owned();

    // Interrupt once both hanging units are running.
    let interrupter = std::thread::spawn(move || {
        let started = wait_until(Duration::from_secs(30), || {
            ["hang_1", "hang_2"].iter().all(|unit_id| {
                integration_tests::fake_unit::child_pid_file(&state_dir, unit_id).exists()
            })
        });
        // SAFETY: raise has no memory safety requirements.
        unsafe { libc::raise(libc::SIGTERM) };
        started
    });

    let (results, events) =
        run.execute_with(&["hang_1", "hang_2", "pass_3"], SignalHandlerKind::Standard);
    assert!(
        interrupter.join().expect("interrupter thread"),
        "hanging units started before the signal"
    );

    assert!(results.is_interrupted());
    assert_eq!(ids(results.omitted()), ["hang_1", "hang_2", "pass_3"]);
    assert!(results.orchestration_errors().is_empty());
    assert!(results.rerun().is_empty(), "no rerun after a signal");
    assert_eq!(results.state().to_string(), "INTERRUPTED");
    assert_eq!(results.exit_code(), RegrtestExitCode::INTERRUPTED);
    assert!(
        events.iter().any(|event| matches!(
            event,
            RunEvent::Stopping {
                reason: StopReason::Signal(ShutdownEvent::Term),
            }
        )),
        "a signal stop was reported"
    );

    for unit_id in ["hang_1", "hang_2"] {
        assert_hang_child_dead(run.state_dir(), unit_id);
    }
}

#[test]
fn test_progress_reports_disabled() {
    let mut run = FakeRun::new(1);
    run.config.progress_interval = Duration::ZERO;

    let (results, events) = run.execute(&["pass_1", "slow_2"]);

    assert_eq!(ids(results.passed()), ["pass_1", "slow_2"]);
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, RunEvent::StillRunning { .. })),
        "no progress reports"
    );
}

#[test]
fn test_rerun_flaky() {
    let mut run = FakeRun::new(2);
    run.config.rerun_failed = true;

    let (results, events) = run.execute(&["pass_1", "flaky_2"]);

    assert_eq!(results.state().to_string(), "FAILURE then SUCCESS");
    assert_eq!(results.exit_code(), RegrtestExitCode::OK);
    assert_eq!(ids(results.rerun()), ["flaky_2"]);
    assert_eq!(ids(results.first_pass_failures()), ["flaky_2"]);
    assert_eq!(ids(results.passed()), ["flaky_2", "pass_1"]);
    assert!(results.failed().is_empty());

    let rerun_units: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            RunEvent::PassStarted {
                pass: RunPass::Rerun,
                unit_ids,
                ..
            } => Some(unit_ids.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(rerun_units, [vec![UnitId::new("flaky_2")]]);

    // The rerun is told which test cases failed.
    let diagnostic = results
        .execution(&UnitId::new("flaky_2"))
        .and_then(|execution| execution.result.diagnostic.clone())
        .unwrap_or_default();
    assert!(
        diagnostic.contains("Re-running flaky_2 in verbose mode (matching: test_case_2)"),
        "{diagnostic}"
    );
    assert!(diagnostic.contains("sub-filter: test_case_2"), "{diagnostic}");
}

#[test]
fn test_rerun_fail_flag() {
    let mut run = FakeRun::new(1);
    run.config.rerun_failed = true;
    run.config.fail_rerun = true;

    let (results, _) = run.execute(&["flaky_1"]);
    assert_eq!(results.state().to_string(), "FAILURE then SUCCESS");
    assert_eq!(results.exit_code(), RegrtestExitCode::RERUN_FAIL);
}

#[test]
fn test_rerun_still_failing() {
    let mut run = FakeRun::new(1);
    run.config.rerun_failed = true;

    let (results, _) = run.execute(&["fail_1"]);
    assert_eq!(results.state().to_string(), "FAILURE then FAILURE");
    assert_eq!(ids(results.failed()), ["fail_1"]);
    assert_eq!(results.exit_code(), RegrtestExitCode::BAD_TEST);
}

#[test]
fn test_outcome_buckets() {
    let mut run = FakeRun::new(3);
    run.config.fail_env_changed = true;

    let (results, _) = run.execute(&["pass_1", "env_2", "skip_3", "denied_4", "norun_5"]);

    assert_eq!(ids(results.passed()), ["pass_1"]);
    assert_eq!(ids(results.env_changed()), ["env_2"]);
    assert_eq!(ids(results.skipped()), ["skip_3"]);
    assert_eq!(ids(results.resource_denied()), ["denied_4"]);
    assert_eq!(ids(results.did_not_run()), ["norun_5"]);
    assert_eq!(results.state().to_string(), "ENV CHANGED");
    assert_eq!(results.exit_code(), RegrtestExitCode::ENV_CHANGED);

    // Each unit reports three tests run.
    assert_eq!(results.total_stats().tests_run, 15);
}

#[test]
fn test_unit_interrupted() {
    let mut run = FakeRun::new(1);
    run.config.rerun_failed = true;

    let (results, _) = run.execute(&["interrupt_1", "fail_2"]);

    assert!(results.is_interrupted());
    assert_eq!(ids(results.interrupted_units()), ["interrupt_1"]);
    assert_eq!(ids(results.omitted()), ["fail_2"]);
    assert!(results.rerun().is_empty(), "no rerun after an interruption");
    assert_eq!(results.state().to_string(), "INTERRUPTED");
    assert_eq!(results.exit_code(), RegrtestExitCode::INTERRUPTED);
}
