// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use integration_tests::fake_unit::STATE_DIR_ENV;
use regrtest_runner::{
    config::{RunConfig, TestThreads},
    events::RunEvent,
    protocol::UnitId,
    results::RunResults,
    runner::TestRunnerBuilder,
    signal::SignalHandlerKind,
    test_command::WorkerCommand,
};
use std::time::Duration;

pub const FAKE_UNIT_BIN: &str = env!("CARGO_BIN_EXE_fake-unit");

/// A run of `fake-unit` with its own state directory.
pub struct FakeRun {
    pub state_dir: Utf8TempDir,
    pub config: RunConfig,
}

impl FakeRun {
    pub fn new(test_threads: usize) -> Self {
        Self {
            state_dir: camino_tempfile::Builder::new()
                .prefix("regrtest-it-")
                .tempdir()
                .expect("created state dir"),
            config: RunConfig {
                test_threads: TestThreads::Count(test_threads),
                timeout: Some(Duration::from_secs(60)),
                ..RunConfig::default()
            },
        }
    }

    pub fn state_dir(&self) -> &Utf8Path {
        self.state_dir.path()
    }

    pub fn command(&self) -> WorkerCommand {
        let mut command = WorkerCommand::new(FAKE_UNIT_BIN);
        command.env(STATE_DIR_ENV, self.state_dir().as_str());
        command
    }

    /// Runs `units` to completion, returning the results and every event produced.
    #[track_caller]
    pub fn execute(&self, units: &[&str]) -> (RunResults, Vec<RunEvent>) {
        self.execute_with(units, SignalHandlerKind::Noop)
    }

    /// Like [`execute`](Self::execute), with the given signal handler.
    #[track_caller]
    pub fn execute_with(
        &self,
        units: &[&str],
        signal_handler: SignalHandlerKind,
    ) -> (RunResults, Vec<RunEvent>) {
        let runner = TestRunnerBuilder::default()
            .build(self.config.clone(), self.command(), signal_handler)
            .expect("built test runner");

        let mut events = Vec::new();
        let results = runner.execute(units.iter().map(UnitId::new), |event| events.push(event));
        (results, events)
    }
}

pub fn ids<'a>(set: impl IntoIterator<Item = &'a UnitId>) -> Vec<&'a str> {
    let mut ids: Vec<_> = set.into_iter().map(UnitId::as_str).collect();
    ids.sort_unstable();
    ids
}

/// Returns true if a process with this pid exists and hasn't exited.
#[cfg(unix)]
pub fn process_is_alive(pid: i32) -> bool {
    if Utf8Path::new("/proc/self").exists() {
        // A killed process whose parent is gone may linger as a zombie until it is reaped.
        return match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => {
                let state = stat
                    .rsplit_once(')')
                    .and_then(|(_, rest)| rest.trim_start().chars().next());
                state != Some('Z')
            }
            Err(_) => false,
        };
    }

    // SAFETY: signal 0 only checks whether the process exists.
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Reads the pid of the child process a `hang` unit spawned.
#[cfg(unix)]
#[track_caller]
pub fn hang_child_pid(state_dir: &Utf8Path, unit_id: &str) -> i32 {
    let pid_file = integration_tests::fake_unit::child_pid_file(state_dir, unit_id);
    std::fs::read_to_string(&pid_file)
        .unwrap_or_else(|error| panic!("{unit_id} wrote its child's pid to {pid_file}: {error}"))
        .trim()
        .parse()
        .expect("pid is valid")
}

/// Asserts that the child process a `hang` unit spawned is gone.
#[cfg(unix)]
#[track_caller]
pub fn assert_hang_child_dead(state_dir: &Utf8Path, unit_id: &str) {
    let pid = hang_child_pid(state_dir, unit_id);
    assert!(
        wait_until(Duration::from_secs(10), || !process_is_alive(pid)),
        "child process {pid} of {unit_id} is still alive"
    );
}

/// Polls until `f` returns true, for up to `timeout`.
pub fn wait_until(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    f()
}
