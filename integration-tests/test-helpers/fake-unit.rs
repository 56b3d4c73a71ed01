// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A fake worker program for integration tests.
//!
//! It receives a job as its last argument, like any worker, and behaves according to the unit
//! id's prefix. See [`Behavior`] for the list. Units that keep state between invocations use the
//! directory named by `REGRTEST_FAKE_STATE_DIR`.

use camino::Utf8PathBuf;
use color_eyre::{
    Result,
    eyre::{Context, bail, eyre},
};
use integration_tests::fake_unit::{
    Behavior, SLOW_UNIT_SECS, STATE_DIR_ENV, attempted_marker, child_pid_file, started_marker,
};
use regrtest_runner::{
    protocol::{Outcome, RerunFilter, TestStats, UnitResult, WorkerJob},
    unit_process::run_worker_job,
};
use std::{
    io::Write,
    process::{Command, Stdio},
    time::{Duration, Instant},
};

fn main() -> Result<()> {
    color_eyre::install()?;

    let job_json = std::env::args()
        .last()
        .ok_or_else(|| eyre!("expected a job as the last argument"))?;
    let job = WorkerJob::from_json(&job_json)?;
    let behavior = Behavior::from_unit_id(job.unit_id.as_str())
        .ok_or_else(|| eyre!("unknown behavior for unit `{}`", job.unit_id))?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "fake-unit: running {} ({behavior})", job.unit_id)?;

    match behavior {
        Behavior::Garbage => {
            writeln!(stdout, "this is not a result")?;
            Ok(())
        }
        Behavior::Crash => {
            writeln!(stdout, "fatal error in {}", job.unit_id)?;
            stdout.flush()?;
            std::process::exit(3)
        }
        Behavior::Hang => hang(&job),
        _ => {
            let state_dir = state_dir();
            let mut runner = |job: &WorkerJob| run_unit(behavior, job, state_dir.as_ref());
            run_worker_job(&job_json, &mut runner, &mut stdout)?;
            Ok(())
        }
    }
}

fn state_dir() -> Option<Utf8PathBuf> {
    std::env::var(STATE_DIR_ENV).ok().map(Utf8PathBuf::from)
}

fn run_unit(behavior: Behavior, job: &WorkerJob, state_dir: Option<&Utf8PathBuf>) -> UnitResult {
    let start = Instant::now();
    let unit_id = job.unit_id.clone();

    let (outcome, failures) = match behavior {
        Behavior::Pass => (Outcome::Passed, 0),
        Behavior::Fail => (Outcome::Failed, 1),
        Behavior::Flaky => {
            let marker = state_dir.map(|dir| attempted_marker(dir, unit_id.as_str()));
            match marker {
                Some(marker) if !marker.exists() => {
                    std::fs::write(&marker, "").expect("wrote attempted marker");
                    (Outcome::Failed, 1)
                }
                _ => (Outcome::Passed, 0),
            }
        }
        Behavior::Slow => {
            if let Some(dir) = state_dir {
                std::fs::write(started_marker(dir, unit_id.as_str()), "")
                    .expect("wrote started marker");
            }
            std::thread::sleep(Duration::from_secs(SLOW_UNIT_SECS));
            (Outcome::Passed, 0)
        }
        Behavior::Late => {
            std::thread::sleep(Duration::from_secs(SLOW_UNIT_SECS));
            (Outcome::Failed, 1)
        }
        Behavior::Env => (Outcome::EnvironmentChanged, 0),
        Behavior::Skip => (Outcome::Skipped, 0),
        Behavior::Denied => (Outcome::ResourceDenied, 0),
        Behavior::NoRun => (Outcome::DidNotRun, 0),
        Behavior::Interrupt => (Outcome::Interrupted, 0),
        Behavior::Garbage | Behavior::Crash | Behavior::Hang => {
            unreachable!("{behavior} doesn't produce a result")
        }
    };

    if let Some(filter) = &job.sub_filter {
        println!("sub-filter: {filter}");
    }

    let mut result = UnitResult::new(unit_id, outcome);
    result.duration = Some(start.elapsed());
    result.stats = Some(TestStats {
        tests_run: 3,
        failures,
        skipped: 0,
    });
    if outcome == Outcome::Failed {
        result.rerun_hints = Some(RerunFilter::new(["test_case_2"]));
    }
    result
}

fn hang(job: &WorkerJob) -> Result<()> {
    let child = spawn_sleeper().wrap_err("failed to spawn child process")?;
    if let Some(dir) = state_dir() {
        std::fs::write(
            child_pid_file(&dir, job.unit_id.as_str()),
            child.id().to_string(),
        )
        .wrap_err("failed to write child pid")?;
    }

    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}

fn spawn_sleeper() -> Result<std::process::Child> {
    let mut command = if cfg!(windows) {
        let mut command = Command::new("ping");
        command.args(["-n", "3600", "127.0.0.1"]);
        command
    } else {
        let mut command = Command::new("sleep");
        command.arg("3600");
        command
    };
    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    if child.id() == 0 {
        bail!("child process has no pid");
    }
    Ok(child)
}
