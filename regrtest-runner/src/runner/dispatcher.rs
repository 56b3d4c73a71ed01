// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dispatcher: the single loop that drains worker results for one pass.

use super::{
    JOIN_POLL_INTERVAL, JOIN_TIMEOUT, PROGRESS_MIN_TIME,
    worker::{WorkerContext, WorkerHandle, WorkerResponse, run_worker},
};
use crate::{
    config::RunConfig,
    events::{RunEvent, RunPass, RunningUnit, StopReason},
    helpers::{format_duration, plural},
    job_queue::JobQueue,
    protocol::{Outcome, UnitId},
    results::RunResults,
    signal::{ShutdownEvent, SignalHandler},
    test_command::WorkerCommand,
    time::Stopwatch,
};
use debug_ignore::DebugIgnore;
use std::sync::Arc;
use tokio::{
    sync::mpsc::{UnboundedReceiver, unbounded_channel},
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, warn};

/// Context for the dispatcher of one pass.
#[derive(Debug)]
pub(super) struct DispatcherContext<'a, F> {
    callback: DebugIgnore<&'a mut F>,
    pass: RunPass,
    total: usize,
    finished: usize,
    fail_fast: bool,
    fail_env_changed: bool,
    handles: Vec<Arc<WorkerHandle>>,
}

impl<'a, F> DispatcherContext<'a, F>
where
    F: FnMut(RunEvent) + Send,
{
    pub(super) fn new(callback: &'a mut F, pass: RunPass) -> Self {
        Self {
            callback: DebugIgnore(callback),
            pass,
            total: 0,
            finished: 0,
            fail_fast: false,
            fail_env_changed: false,
            handles: Vec::new(),
        }
    }

    /// Runs one pass over `unit_ids` to completion, recording results into `results`.
    ///
    /// This returns once every worker has exited, either because the queue was exhausted or
    /// because the pass was stopped early.
    pub(super) async fn run_pass(
        &mut self,
        command: &WorkerCommand,
        config: RunConfig,
        unit_ids: Vec<UnitId>,
        results: &mut RunResults,
        signal_handler: &mut SignalHandler,
    ) {
        let stopwatch = Stopwatch::start();
        let worker_count = config.test_threads.compute().min(unit_ids.len());
        let progress_interval = config.progress_interval;

        self.total = unit_ids.len();
        self.finished = 0;
        self.fail_fast = config.fail_fast;
        self.fail_env_changed = config.fail_env_changed;

        self.emit(RunEvent::PassStarted {
            pass: self.pass,
            start_time: stopwatch.started_at(),
            unit_ids: unit_ids.clone(),
            worker_count,
            timeout: config.timeout,
            worker_timeout: config.worker_timeout(),
        });
        debug!(
            "starting {} {} on {worker_count} {}",
            self.total,
            plural::units_str(self.total),
            plural::worker_processes_str(worker_count),
        );

        let cx = Arc::new(WorkerContext {
            command: command.clone(),
            config,
            queue: JobQueue::new(unit_ids),
        });
        let (resp_tx, mut resp_rx) = unbounded_channel();
        self.handles = (1..=worker_count)
            .map(|worker_id| Arc::new(WorkerHandle::new(worker_id)))
            .collect();
        let join_handles: Vec<_> = self
            .handles
            .iter()
            .map(|handle| tokio::spawn(run_worker(cx.clone(), handle.clone(), resp_tx.clone())))
            .collect();
        // Only workers hold senders now, so the channel closes once they all exit.
        drop(resp_tx);

        let stop_reason = self
            .drain_until_stop(&mut resp_rx, results, signal_handler, progress_interval)
            .await;
        if let Some(reason) = stop_reason {
            debug!("stopping pass early: {reason:?}");
            self.emit(RunEvent::Stopping { reason });
        }

        self.stop_workers(&cx.queue, join_handles).await;

        // Units that finished while the workers were being stopped still count.
        while let Ok(response) = resp_rx.try_recv() {
            self.handle_response(response, results);
        }

        self.emit(RunEvent::PassFinished {
            pass: self.pass,
            elapsed: stopwatch.elapsed(),
        });
    }

    async fn drain_until_stop(
        &mut self,
        resp_rx: &mut UnboundedReceiver<WorkerResponse>,
        results: &mut RunResults,
        signal_handler: &mut SignalHandler,
        progress_interval: std::time::Duration,
    ) -> Option<StopReason> {
        let mut progress = (!progress_interval.is_zero()).then(|| {
            let mut progress =
                tokio::time::interval_at(Instant::now() + progress_interval, progress_interval);
            progress.set_missed_tick_behavior(MissedTickBehavior::Delay);
            progress
        });
        let mut signals_done = false;

        loop {
            let internal_event = tokio::select! {
                response = resp_rx.recv() => InternalEvent::Response(response),
                event = signal_handler.recv(), if !signals_done => InternalEvent::Signal(event),
                () = next_progress_tick(&mut progress) => InternalEvent::ProgressTick,
            };

            match internal_event {
                InternalEvent::Response(Some(response)) => {
                    if let Some(reason) = self.handle_response(response, results) {
                        return Some(reason);
                    }
                }
                InternalEvent::Response(None) => {
                    // Every worker has exited.
                    return None;
                }
                InternalEvent::Signal(Some(event)) => {
                    results.set_interrupted();
                    return Some(StopReason::Signal(event));
                }
                InternalEvent::Signal(None) => {
                    signals_done = true;
                }
                InternalEvent::ProgressTick => {
                    let running = self.long_running();
                    if !running.is_empty() {
                        self.emit(RunEvent::StillRunning { running });
                    }
                }
            }
        }
    }

    /// Records one response, and returns a reason to stop if its outcome calls for one.
    fn handle_response(
        &mut self,
        response: WorkerResponse,
        results: &mut RunResults,
    ) -> Option<StopReason> {
        let WorkerResponse {
            worker_id,
            execution,
        } = response;
        let unit_id = execution.unit_id().clone();
        let outcome = execution.result.outcome;
        debug!("[worker {worker_id}] {execution}");

        if !results.record(execution.clone()) {
            return None;
        }
        self.finished += 1;

        let running = self.long_running();
        self.emit(RunEvent::UnitFinished {
            pass: self.pass,
            index: self.finished,
            total: self.total,
            failures: results.failure_count(),
            execution,
            running,
        });

        if outcome == Outcome::Interrupted {
            Some(StopReason::UnitInterrupted { unit_id })
        } else if outcome.must_stop(self.fail_fast, self.fail_env_changed) {
            Some(StopReason::FailFast { unit_id })
        } else {
            None
        }
    }

    /// Stops the queue and every worker, then waits for the workers to exit.
    ///
    /// Workers that don't exit within [`JOIN_TIMEOUT`] are abandoned with a warning.
    async fn stop_workers(&mut self, queue: &JobQueue, join_handles: Vec<JoinHandle<()>>) {
        queue.stop();
        for handle in &self.handles {
            handle.stop();
        }

        let stopwatch = Stopwatch::start();
        let handles = std::mem::take(&mut self.handles);
        for (handle, mut join_handle) in handles.iter().zip(join_handles) {
            loop {
                match tokio::time::timeout(JOIN_POLL_INTERVAL, &mut join_handle).await {
                    Ok(Ok(())) => break,
                    Ok(Err(join_error)) => {
                        warn!("[worker {}] worker task failed: {join_error}", handle.worker_id());
                        break;
                    }
                    Err(_) => {
                        let elapsed = stopwatch.elapsed();
                        if elapsed >= JOIN_TIMEOUT {
                            warn!(
                                "[worker {}] failed to join worker in {}",
                                handle.worker_id(),
                                format_duration(elapsed),
                            );
                            join_handle.abort();
                            break;
                        }
                        self.emit(RunEvent::WaitingForWorker {
                            worker_id: handle.worker_id(),
                            elapsed,
                        });
                    }
                }
            }
        }
    }

    /// Returns units that have been running for at least [`PROGRESS_MIN_TIME`], longest first.
    fn long_running(&self) -> Vec<RunningUnit> {
        let mut running: Vec<_> = self
            .handles
            .iter()
            .filter_map(|handle| handle.snapshot())
            .filter(|unit| unit.elapsed >= PROGRESS_MIN_TIME)
            .collect();
        running.sort_by(|a, b| b.elapsed.cmp(&a.elapsed));
        running
    }

    fn emit(&mut self, event: RunEvent) {
        (self.callback)(event);
    }
}

/// Waits for the next progress tick. Never resolves if progress reports are disabled.
async fn next_progress_tick(progress: &mut Option<Interval>) {
    match progress {
        Some(progress) => {
            progress.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[derive(Debug)]
enum InternalEvent {
    Response(Option<WorkerResponse>),
    Signal(Option<ShutdownEvent>),
    ProgressTick,
}
