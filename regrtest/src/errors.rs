// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::NO_HEADING_TARGET;
use camino::Utf8PathBuf;
use regrtest_runner::{
    errors::{ConfigParseError, ProfileNotFound, TestRunnerBuildError},
    results::RegrtestExitCode,
};
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholders. Errors are printed with display_to_stderr, which also
// prints the source chain.

/// An error that regrtest knows how to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine current directory")]
    CurrentDirFailed { err: std::io::Error },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 { err: camino::FromPathBufError },
    #[error("config parse error")]
    ConfigParseError { err: ConfigParseError },
    #[error("profile not found")]
    ProfileNotFound { err: ProfileNotFound },
    #[error("failed to read unit list")]
    FromfileReadError { path: Utf8PathBuf, err: std::io::Error },
    #[error("no units specified")]
    NoUnitsSpecified,
    #[error("worker program missing")]
    WorkerProgramMissing,
    #[error("failed to build test runner")]
    TestRunnerBuildError { err: TestRunnerBuildError },
    #[error("failed to write output")]
    WriteOutputError { err: std::io::Error },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::ProfileNotFound { .. }
            | Self::FromfileReadError { .. }
            | Self::NoUnitsSpecified
            | Self::WorkerProgramMissing
            | Self::TestRunnerBuildError { .. }
            | Self::WriteOutputError { .. } => RegrtestExitCode::SETUP_ERROR,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self) {
        let mut next_error = match &self {
            Self::CurrentDirFailed { err } => {
                error!("could not determine current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { err } => {
                error!("current directory is not valid UTF-8");
                Some(err as &dyn Error)
            }
            Self::ConfigParseError { err } => {
                error!("failed to parse regrtest config at `{}`", err.config_file());
                Some(err.kind() as &dyn Error)
            }
            Self::ProfileNotFound { err } => {
                error!("{err}");
                None
            }
            Self::FromfileReadError { path, err } => {
                error!("failed to read unit list from `{path}`");
                Some(err as &dyn Error)
            }
            Self::NoUnitsSpecified => {
                error!("no units specified (pass unit names, or use --fromfile)");
                None
            }
            Self::WorkerProgramMissing => {
                error!("no worker program specified (pass it after `--`)");
                None
            }
            Self::TestRunnerBuildError { err } => {
                error!("failed to build test runner");
                Some(err as &dyn Error)
            }
            Self::WriteOutputError { err } => {
                error!("failed to write output");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
