// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by regrtest-runner.

use camino::Utf8PathBuf;
use config::ConfigError;
use std::io;
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse regrtest config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// The default profile is missing a key that every profile inherits.
    #[error("`profile.default` is missing required key `{0}`")]
    MissingDefaultKey(&'static str),
}

/// An error which indicates that a profile was requested but not known to regrtest.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }
}

/// Error returned while parsing a [`TestThreads`](crate::config::TestThreads) value.
#[derive(Clone, Debug, Error)]
#[error("unrecognized value for test-threads: {input}")]
pub struct TestThreadsParseError {
    /// The input that failed to parse.
    pub input: String,
}

impl TestThreadsParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurred while setting up the signal handler.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct SignalHandlerSetupError(#[from] io::Error);

/// An error that occurred while building the test runner.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestRunnerBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] io::Error),

    /// An error occurred while setting up signals.
    #[error("error setting up signals")]
    SignalHandlerSetupError(#[from] SignalHandlerSetupError),
}

/// An error decoding a [`WorkerJob`](crate::protocol::WorkerJob) in a worker process.
#[derive(Debug, Error)]
#[error("failed to decode worker job")]
pub struct JobDecodeError {
    #[source]
    err: serde_json::Error,
}

impl JobDecodeError {
    pub(crate) fn new(err: serde_json::Error) -> Self {
        Self { err }
    }
}

/// An error decoding the trailing result line written by a worker process.
///
/// The messages are used verbatim as the reason attached to an orchestration error, so the
/// underlying JSON error is part of the message rather than a separate source.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResultDecodeError {
    /// The worker output was empty, or its last line was blank.
    #[error("failed to parse worker output: no result line")]
    MissingResultLine,

    /// The last line of the worker output was not a valid result record.
    #[error("failed to parse worker result: {err}")]
    InvalidResult {
        /// The JSON error.
        err: serde_json::Error,
    },
}

/// An error that occurred on the worker process side of the protocol.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UnitProcessError {
    /// The job passed on the command line could not be decoded.
    #[error(transparent)]
    JobDecode(#[from] JobDecodeError),

    /// The result record could not be serialized.
    #[error("failed to encode unit result")]
    ResultEncode(#[source] serde_json::Error),

    /// Writing to the output stream failed.
    #[error("failed to write unit output")]
    Write(#[source] io::Error),
}

/// An error that occurred while a worker was supervising one unit.
///
/// These never escape a worker: each one is turned into a single orchestration error result for
/// the unit being run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkerError {
    /// The job could not be serialized.
    #[error("failed to encode worker job: {0}")]
    JobEncode(#[source] serde_json::Error),

    /// The per-launch temporary directory could not be created.
    #[error("failed to create temporary directory: {0}")]
    TempDirCreate(#[source] io::Error),

    /// The file capturing the worker output could not be created.
    #[error("failed to create output capture file: {0}")]
    OutputCapture(#[source] io::Error),

    /// The worker process could not be spawned.
    #[error("failed to spawn worker process: {0}")]
    Spawn(#[source] io::Error),

    /// Waiting for the worker process failed.
    #[error("failed to wait for worker process: {0}")]
    Wait(#[source] io::Error),

    /// The captured output could not be read back.
    #[error("cannot read process output: {0}")]
    ReadOutput(#[source] io::Error),
}
