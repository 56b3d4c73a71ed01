// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workers: each one pulls unit ids from the shared queue and supervises one worker process at a
//! time.

use super::{JOIN_TIMEOUT, KillStatus, os};
use crate::{
    config::RunConfig,
    errors::WorkerError,
    events::RunningUnit,
    helpers::display_exited_with,
    job_queue::JobQueue,
    protocol::{Outcome, UnitExecution, UnitId, UnitResult, WorkerJob, parse_worker_output},
    test_command::WorkerCommand,
    time::Stopwatch,
};
use futures::FutureExt;
use std::{
    any::Any,
    fs::File,
    io::SeekFrom,
    panic::AssertUnwindSafe,
    process::{ExitStatus, Stdio},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncSeekExt},
    process::Child,
    sync::{Notify, mpsc::UnboundedSender},
};
use tracing::{debug, warn};

/// State shared read-only by every worker in a pass.
#[derive(Debug)]
pub(super) struct WorkerContext {
    pub(super) command: WorkerCommand,
    pub(super) config: RunConfig,
    pub(super) queue: JobQueue,
}

/// A result published by a worker.
#[derive(Debug)]
pub(super) struct WorkerResponse {
    pub(super) worker_id: usize,
    pub(super) execution: UnitExecution,
}

/// The observable state of one worker.
///
/// The worker owns the unit it runs. The dispatcher reads the handle for progress display, and
/// the stop routine uses it to kill the running process.
#[derive(Debug)]
pub(super) struct WorkerHandle {
    worker_id: usize,
    stopped: AtomicBool,
    slot: Mutex<Option<RunningSlot>>,
    stop_notify: Notify,
}

#[derive(Debug)]
struct RunningSlot {
    unit_id: UnitId,
    stopwatch: Stopwatch,
    pid: Option<u32>,
    killed: bool,
}

impl WorkerHandle {
    pub(super) fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            stopped: AtomicBool::new(false),
            slot: Mutex::new(None),
            stop_notify: Notify::new(),
        }
    }

    pub(super) fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub(super) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Returns the unit being run, if any.
    pub(super) fn snapshot(&self) -> Option<RunningUnit> {
        self.lock_slot().as_ref().map(|slot| RunningUnit {
            worker_id: self.worker_id,
            unit_id: slot.unit_id.clone(),
            elapsed: slot.stopwatch.elapsed(),
        })
    }

    /// Asks the worker to stop: it finishes no further units, and the running process is killed.
    pub(super) fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.kill();
        self.stop_notify.notify_one();
    }

    /// Kills the running process group, if there is one. Calling this more than once is a no-op.
    fn kill(&self) {
        let mut slot = self.lock_slot();
        let Some(slot) = slot.as_mut() else {
            return;
        };
        let Some(pid) = slot.pid else {
            return;
        };
        if slot.killed {
            return;
        }
        slot.killed = true;

        match os::kill_process_group(pid) {
            Ok(KillStatus::Killed) => {
                debug!(
                    "[worker {}] killed process {pid} running `{}`",
                    self.worker_id, slot.unit_id,
                );
            }
            Ok(KillStatus::AlreadyExited) => {
                debug!(
                    "[worker {}] process {pid} running `{}` already exited",
                    self.worker_id, slot.unit_id,
                );
            }
            Err(error) => {
                warn!(
                    "[worker {}] failed to kill process {pid} running `{}`: {error}",
                    self.worker_id, slot.unit_id,
                );
            }
        }
    }

    fn begin(&self, unit_id: UnitId) {
        *self.lock_slot() = Some(RunningSlot {
            unit_id,
            stopwatch: Stopwatch::start(),
            pid: None,
            killed: false,
        });
    }

    fn set_pid(&self, pid: Option<u32>) {
        if let Some(slot) = self.lock_slot().as_mut() {
            slot.pid = pid;
        }
    }

    fn finish(&self) {
        *self.lock_slot() = None;
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<RunningSlot>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The worker loop: runs units until the queue is exhausted or the worker is stopped.
pub(super) async fn run_worker(
    cx: Arc<WorkerContext>,
    handle: Arc<WorkerHandle>,
    resp_tx: UnboundedSender<WorkerResponse>,
) {
    let (cx, handle) = (&*cx, &*handle);
    run_units(cx, handle, &resp_tx, move |unit_id| supervise(cx, handle, unit_id)).await;
}

/// Pulls units off the queue and hands each one to `run_unit`, publishing what it returns.
///
/// A panic while running a unit becomes an orchestration error for that unit, and the loop moves
/// on to the next one.
async fn run_units<F, Fut>(
    cx: &WorkerContext,
    handle: &WorkerHandle,
    resp_tx: &UnboundedSender<WorkerResponse>,
    mut run_unit: F,
) where
    F: FnMut(UnitId) -> Fut,
    Fut: Future<Output = Option<UnitExecution>>,
{
    let worker_id = handle.worker_id();
    loop {
        if handle.is_stopped() {
            break;
        }
        let Some(unit_id) = cx.queue.next() else {
            break;
        };

        handle.begin(unit_id.clone());
        let supervised = AssertUnwindSafe(run_unit(unit_id.clone()))
            .catch_unwind()
            .await;
        handle.finish();

        let execution = match supervised {
            Ok(Some(execution)) => execution,
            Ok(None) => {
                debug!("[worker {worker_id}] stopped while running `{unit_id}`");
                break;
            }
            Err(panic) => {
                let message = format!("worker panicked: {}", panic_message(&*panic));
                warn!("[worker {worker_id}] {message} while running `{unit_id}`");
                UnitExecution::orchestration_error(unit_id, message, None)
            }
        };

        let must_stop = execution
            .result
            .outcome
            .must_stop(cx.config.fail_fast, cx.config.fail_env_changed);
        if resp_tx
            .send(WorkerResponse {
                worker_id,
                execution,
            })
            .is_err()
        {
            // The dispatcher is gone.
            break;
        }
        if must_stop {
            break;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "(non-string payload)"
    }
}

/// How a worker process ended.
enum ProcessEnd {
    Exited { status: ExitStatus, output: String },
    TimedOut { output: String },
    Stopped,
}

/// Runs one unit in a worker process. Returns `None` if the worker was stopped meanwhile.
async fn supervise(
    cx: &WorkerContext,
    handle: &WorkerHandle,
    unit_id: UnitId,
) -> Option<UnitExecution> {
    let stopwatch = Stopwatch::start();
    let mut execution = match run_process(cx, handle, &unit_id).await {
        Ok(ProcessEnd::Exited { status, output }) => classify_exit(unit_id, status, output),
        Ok(ProcessEnd::TimedOut { output }) => {
            let mut result = UnitResult::new(unit_id, Outcome::Timeout);
            result.diagnostic = (!output.is_empty()).then_some(output);
            UnitExecution::new(result)
        }
        Ok(ProcessEnd::Stopped) => return None,
        Err(error) => UnitExecution::orchestration_error(unit_id, error.to_string(), None),
    };

    execution.result.duration = Some(stopwatch.elapsed());
    Some(execution)
}

async fn run_process(
    cx: &WorkerContext,
    handle: &WorkerHandle,
    unit_id: &UnitId,
) -> Result<ProcessEnd, WorkerError> {
    let job = WorkerJob::new(unit_id.clone(), &cx.config);
    let job_json = job.to_json().map_err(WorkerError::JobEncode)?;

    // Removed when dropped, after the process has exited.
    let tmp_dir = camino_tempfile::Builder::new()
        .prefix("regrtest_")
        .tempdir()
        .map_err(WorkerError::TempDirCreate)?;

    // stdout and stderr share one file, so their ordering is preserved.
    let output_file = camino_tempfile::tempfile().map_err(WorkerError::OutputCapture)?;
    let stdout = output_file.try_clone().map_err(WorkerError::OutputCapture)?;
    let stderr = output_file.try_clone().map_err(WorkerError::OutputCapture)?;

    let mut cmd = cx
        .command
        .to_command(&job_json, handle.worker_id(), tmp_dir.path());
    cmd.stdin(Stdio::null()).stdout(stdout).stderr(stderr);
    os::set_process_group(&mut cmd);

    let mut cmd = tokio::process::Command::from(cmd);
    cmd.kill_on_drop(true);
    let mut child = cmd.spawn().map_err(WorkerError::Spawn)?;
    // Release the parent's copies of the output handles.
    drop(cmd);

    handle.set_pid(child.id());
    debug!(
        "[worker {}] started `{unit_id}` (pid {:?})",
        handle.worker_id(),
        child.id(),
    );

    // stop() may have run before the pid was set.
    if handle.is_stopped() {
        handle.kill();
        reap(handle, &mut child).await;
        return Ok(ProcessEnd::Stopped);
    }

    let deadline = async {
        match cx.config.worker_timeout() {
            Some(worker_timeout) => tokio::time::sleep(worker_timeout).await,
            None => std::future::pending().await,
        }
    };

    enum Wake {
        Exited(std::io::Result<ExitStatus>),
        TimedOut,
        Stopped,
    }

    let wake = tokio::select! {
        res = child.wait() => Wake::Exited(res),
        () = deadline => Wake::TimedOut,
        () = handle.stop_notify.notified() => Wake::Stopped,
    };

    match wake {
        // A stop can kill the process before the notification is seen. Either way the unit was
        // stopped, not finished.
        Wake::Exited(_) if handle.is_stopped() => {
            reap(handle, &mut child).await;
            Ok(ProcessEnd::Stopped)
        }
        Wake::Exited(res) => {
            let status = res.map_err(WorkerError::Wait)?;
            let output = read_output(output_file).await?;
            Ok(ProcessEnd::Exited { status, output })
        }
        Wake::TimedOut => {
            debug!(
                "[worker {}] `{unit_id}` exceeded its deadline, killing it",
                handle.worker_id(),
            );
            handle.kill();
            reap(handle, &mut child).await;
            let output = best_effort_output(handle, unit_id, read_output(output_file).await);
            Ok(ProcessEnd::TimedOut { output })
        }
        Wake::Stopped => {
            handle.kill();
            reap(handle, &mut child).await;
            Ok(ProcessEnd::Stopped)
        }
    }
}

/// Waits for a killed child, for a bounded amount of time.
async fn reap(handle: &WorkerHandle, child: &mut Child) {
    match tokio::time::timeout(JOIN_TIMEOUT, child.wait()).await {
        Ok(Ok(_)) => {}
        Ok(Err(error)) => {
            warn!(
                "[worker {}] failed to wait for killed process: {error}",
                handle.worker_id(),
            );
        }
        Err(_) => {
            warn!(
                "[worker {}] killed process did not exit within {:?}",
                handle.worker_id(),
                JOIN_TIMEOUT,
            );
        }
    }
}

async fn read_output(file: File) -> Result<String, WorkerError> {
    let mut file = tokio::fs::File::from_std(file);
    file.seek(SeekFrom::Start(0))
        .await
        .map_err(WorkerError::ReadOutput)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .await
        .map_err(WorkerError::ReadOutput)?;
    Ok(String::from_utf8_lossy(&buf).trim().to_owned())
}

/// The output of a killed process is best-effort: failing to read it leaves it empty.
fn best_effort_output(
    handle: &WorkerHandle,
    unit_id: &UnitId,
    output: Result<String, WorkerError>,
) -> String {
    output.unwrap_or_else(|error| {
        warn!(
            "[worker {}] discarding output of killed `{unit_id}`: {error}",
            handle.worker_id(),
        );
        String::new()
    })
}

fn classify_exit(unit_id: UnitId, status: ExitStatus, output: String) -> UnitExecution {
    if !status.success() {
        return UnitExecution::orchestration_error(unit_id, display_exited_with(status), Some(output));
    }

    match parse_worker_output(&output) {
        Ok((_, result)) if result.unit_id != unit_id => UnitExecution::orchestration_error(
            unit_id,
            format!("worker reported a result for unit `{}`", result.unit_id),
            Some(output),
        ),
        Ok((preceding, mut result)) => {
            if !preceding.is_empty() {
                result.diagnostic = Some(preceding.to_owned());
            }
            UnitExecution::new(result)
        }
        Err(error) => UnitExecution::orchestration_error(unit_id, error.to_string(), Some(output)),
    }
}
