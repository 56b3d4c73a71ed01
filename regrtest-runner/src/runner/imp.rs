// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::dispatcher::DispatcherContext;
use crate::{
    config::{RunConfig, TestThreads},
    errors::TestRunnerBuildError,
    events::{RunEvent, RunPass},
    helpers::plural,
    protocol::UnitId,
    results::RunResults,
    signal::{SignalHandler, SignalHandlerKind},
    test_command::WorkerCommand,
};
use indexmap::IndexSet;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

/// How long the stop routine waits for each worker to exit before abandoning it.
///
/// The same bound applies to reaping a killed worker process.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Units running for at least this long are listed in progress events.
pub const PROGRESS_MIN_TIME: Duration = Duration::from_secs(30);

/// How often the stop routine reports on a worker that hasn't exited yet.
pub(super) const JOIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestRunnerBuilder {
    test_threads: Option<TestThreads>,
    timeout: Option<Option<Duration>>,
    fail_fast: Option<bool>,
    rerun_failed: Option<bool>,
}

impl TestRunnerBuilder {
    /// Sets the number of units to run simultaneously.
    pub fn set_test_threads(&mut self, test_threads: TestThreads) -> &mut Self {
        self.test_threads = Some(test_threads);
        self
    }

    /// Sets the per-unit timeout. `None` disables the timeout.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets whether to stop the run after the first failure.
    pub fn set_fail_fast(&mut self, fail_fast: bool) -> &mut Self {
        self.fail_fast = Some(fail_fast);
        self
    }

    /// Sets whether to rerun failed units in a second pass.
    pub fn set_rerun_failed(&mut self, rerun_failed: bool) -> &mut Self {
        self.rerun_failed = Some(rerun_failed);
        self
    }

    /// Creates a new test runner.
    ///
    /// Options set on this builder override the corresponding fields of `config`.
    pub fn build(
        self,
        mut config: RunConfig,
        command: WorkerCommand,
        signal_handler: SignalHandlerKind,
    ) -> Result<TestRunner, TestRunnerBuildError> {
        if let Some(test_threads) = self.test_threads {
            config.test_threads = test_threads;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(fail_fast) = self.fail_fast {
            config.fail_fast = fail_fast;
        }
        if let Some(rerun_failed) = self.rerun_failed {
            config.rerun_failed = rerun_failed;
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("regrtest-runner-worker")
            .build()
            .map_err(TestRunnerBuildError::TokioRuntimeCreate)?;
        let _guard = runtime.enter();

        // signal_handler.build() must be called from within the guard.
        let signal_handler = signal_handler.build()?;

        Ok(TestRunner {
            inner: TestRunnerInner {
                config,
                command,
                runtime,
            },
            signal_handler,
        })
    }
}

/// Context for running units.
///
/// Created using [`TestRunnerBuilder::build`].
#[derive(Debug)]
pub struct TestRunner {
    inner: TestRunnerInner,
    signal_handler: SignalHandler,
}

impl TestRunner {
    /// Returns the configuration of the initial pass.
    pub fn config(&self) -> &RunConfig {
        &self.inner.config
    }

    /// Runs the given units, each one in its own worker process.
    ///
    /// Events are delivered to the callback in order, from a single task. Duplicate unit ids are
    /// dropped with a warning. Returns the aggregated results of the run, including the rerun
    /// pass if there was one.
    pub fn execute<F>(
        mut self,
        unit_ids: impl IntoIterator<Item = UnitId>,
        mut callback: F,
    ) -> RunResults
    where
        F: FnMut(RunEvent) + Send,
    {
        let mut seen = IndexSet::new();
        for unit_id in unit_ids {
            if seen.contains(&unit_id) {
                warn!("unit `{unit_id}` was specified more than once, ignoring duplicates");
            } else {
                seen.insert(unit_id);
            }
        }
        let unit_ids: Vec<_> = seen.into_iter().collect();

        let results = self
            .inner
            .execute(unit_ids, &mut self.signal_handler, &mut callback);

        // Worker processes are reaped by now, but a worker that failed to join may still hold
        // resources. Shut the runtime down without waiting for it.
        self.inner.runtime.shutdown_background();

        results
    }
}

#[derive(Debug)]
struct TestRunnerInner {
    config: RunConfig,
    command: WorkerCommand,
    runtime: Runtime,
}

impl TestRunnerInner {
    fn execute<F>(
        &self,
        unit_ids: Vec<UnitId>,
        signal_handler: &mut SignalHandler,
        callback: &mut F,
    ) -> RunResults
    where
        F: FnMut(RunEvent) + Send,
    {
        let mut results = RunResults::new(
            unit_ids.iter().cloned(),
            self.config.fail_env_changed,
            self.config.fail_rerun,
        );

        self.runtime.block_on(async {
            DispatcherContext::new(&mut *callback, RunPass::Initial)
                .run_pass(
                    &self.command,
                    self.config.clone(),
                    unit_ids,
                    &mut results,
                    signal_handler,
                )
                .await;

            if !self.config.rerun_failed {
                return;
            }
            if results.is_interrupted() {
                debug!("run was interrupted, not rerunning failed units");
                return;
            }
            let Some(plan) = results.begin_rerun() else {
                return;
            };

            debug!(
                "re-running {} failed {} in verbose mode",
                plan.unit_ids.len(),
                plural::units_str(plan.unit_ids.len()),
            );
            let config = self.config.for_rerun(plan.filters);
            DispatcherContext::new(&mut *callback, RunPass::Rerun)
                .run_pass(
                    &self.command,
                    config,
                    plan.unit_ids,
                    &mut results,
                    signal_handler,
                )
                .await;
            results.end_rerun();
        });

        results
    }
}
