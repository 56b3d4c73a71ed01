// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The command used to launch worker processes.

use camino::{Utf8Path, Utf8PathBuf};
use std::{ffi::OsString, process::Command};

/// Environment variable set to `1` in every worker process.
pub const REGRTEST_ENV: &str = "REGRTEST";

/// Environment variable holding the id of the worker slot that launched the process.
pub const REGRTEST_WORKER_ID_ENV: &str = "REGRTEST_WORKER_ID";

/// Describes how to launch a worker process.
///
/// The serialized job is appended as the final argument, so the full command line is
/// `program args... <job>`.
#[derive(Clone, Debug)]
pub struct WorkerCommand {
    program: OsString,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
    cwd: Option<Utf8PathBuf>,
}

impl WorkerCommand {
    /// Creates a new command that runs `program`.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    /// Adds an argument that comes before the job.
    pub fn arg(&mut self, arg: impl Into<OsString>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Adds several arguments that come before the job.
    pub fn args(&mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> &mut Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for every worker process.
    pub fn env(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> &mut Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets the working directory for worker processes.
    ///
    /// By default, worker processes inherit the runner's working directory.
    pub fn current_dir(&mut self, cwd: impl Into<Utf8PathBuf>) -> &mut Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Returns the program.
    pub fn program(&self) -> &OsString {
        &self.program
    }

    /// Returns the arguments that come before the job.
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Builds the command for one launch.
    ///
    /// `tmp_dir` is a directory unique to this launch, exposed to the process as its temporary
    /// directory.
    pub(crate) fn to_command(&self, job_json: &str, worker_id: usize, tmp_dir: &Utf8Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(job_json);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd.env(REGRTEST_ENV, "1")
            .env(REGRTEST_WORKER_ID_ENV, worker_id.to_string())
            .env("TMPDIR", tmp_dir)
            .env("TEMP", tmp_dir)
            .env("TMP", tmp_dir);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}
