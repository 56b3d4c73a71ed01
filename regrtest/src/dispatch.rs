// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{ExpectedError, Result},
    output::{OutputContext, OutputOpts, clap_styles},
    reporter::{Reporter, ReporterOpts},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use regrtest_runner::{
    config::{DefaultConfigWarnings, RegrtestConfig, RunConfig, TestThreads},
    protocol::UnitId,
    runner::TestRunnerBuilder,
    signal::SignalHandlerKind,
    test_command::WorkerCommand,
};
use tracing::debug;

/// Run regression test units in parallel, each one in its own worker process.
#[derive(Debug, Parser)]
#[command(
    name = "regrtest",
    version,
    styles = clap_styles::style(),
    max_term_width = 100
)]
pub struct RegrtestApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(subcommand)]
    command: Command,
}

impl RegrtestApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        match self.command {
            Command::Run(opts) => opts.exec(output),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run units, each one in its own worker process
    ///
    /// The worker program is given after `--`. For each unit, it is run with a JSON job as its
    /// last argument, and must print a JSON result as the last line of its output.
    Run(RunOpts),
}

#[derive(Debug, Args)]
struct RunOpts {
    /// Units to run
    #[arg(value_name = "UNITS")]
    units: Vec<String>,

    /// Read units to run from a file, one per line
    ///
    /// Blank lines and `#` comments are ignored. Only the first word of each line is used.
    #[arg(long, value_name = "PATH")]
    fromfile: Option<Utf8PathBuf>,

    /// Print the 10 slowest units
    #[arg(long)]
    slowest: bool,

    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(flatten)]
    runner_opts: RunnerOpts,

    /// Worker program and its arguments
    #[arg(last = true, required = true, value_name = "WORKER")]
    worker: Vec<String>,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Config options")]
struct ConfigOpts {
    /// Config file [default: .config/regrtest.toml in the current directory]
    #[arg(long, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// Configuration profile to use
    #[arg(long, short = 'P', env = "REGRTEST_PROFILE", value_name = "PROFILE")]
    profile: Option<String>,
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "Runner options")]
struct RunnerOpts {
    /// Number of units to run simultaneously [possible values: integer or "num-cpus"]
    #[arg(
        long,
        short = 'j',
        visible_alias = "jobs",
        value_name = "N",
        env = "REGRTEST_TEST_THREADS",
        allow_negative_numbers = true
    )]
    test_threads: Option<TestThreads>,

    /// Per-unit timeout, for example "15m"; 0 disables the timeout
    #[arg(long, value_name = "DURATION")]
    timeout: Option<humantime::Duration>,

    /// Stop the run after the first failure
    #[arg(long)]
    fail_fast: bool,

    /// Treat units that alter the execution environment as failures
    #[arg(long)]
    fail_env_changed: bool,

    /// Exit with a dedicated code if any unit had to be rerun, even if it then passed
    #[arg(long)]
    fail_rerun: bool,

    /// Rerun failed units in verbose mode after the initial pass
    #[arg(long, short = 'w', visible_alias = "verbose2")]
    rerun: bool,

    /// Working directory for worker processes
    #[arg(long, value_name = "DIR")]
    worker_cwd: Option<Utf8PathBuf>,
}

impl RunnerOpts {
    /// Applies command-line overrides on top of the profile.
    fn apply(&self, config: &mut RunConfig) {
        if let Some(test_threads) = self.test_threads {
            config.test_threads = test_threads;
        }
        if let Some(timeout) = self.timeout {
            let timeout: std::time::Duration = timeout.into();
            config.timeout = (!timeout.is_zero()).then_some(timeout);
        }
        config.fail_fast |= self.fail_fast;
        config.fail_env_changed |= self.fail_env_changed;
        config.fail_rerun |= self.fail_rerun;
        config.rerun_failed |= self.rerun;
    }
}

impl RunOpts {
    fn exec(self, output: OutputContext) -> Result<i32> {
        let mut unit_ids: Vec<_> = self.units.iter().map(UnitId::new).collect();
        if let Some(path) = &self.fromfile {
            unit_ids.extend(read_fromfile(path)?);
        }
        if unit_ids.is_empty() {
            return Err(ExpectedError::NoUnitsSpecified);
        }

        let cwd = std::env::current_dir().map_err(|err| ExpectedError::CurrentDirFailed { err })?;
        let root = Utf8PathBuf::try_from(cwd)
            .map_err(|err| ExpectedError::CurrentDirInvalidUtf8 { err })?;
        let config = RegrtestConfig::from_sources(
            root,
            self.config_opts.config_file.as_deref(),
            &mut DefaultConfigWarnings,
        )
        .map_err(|err| ExpectedError::ConfigParseError { err })?;
        let profile = config
            .profile(
                self.config_opts
                    .profile
                    .as_deref()
                    .unwrap_or(RegrtestConfig::DEFAULT_PROFILE),
            )
            .map_err(|err| ExpectedError::ProfileNotFound { err })?;

        let mut run_config = profile.to_run_config();
        self.runner_opts.apply(&mut run_config);
        run_config.verbose = output.verbose;
        run_config.quiet = output.quiet;
        debug!("using profile `{}`: {run_config:?}", profile.name());

        let Some((program, args)) = self.worker.split_first() else {
            return Err(ExpectedError::WorkerProgramMissing);
        };
        let mut command = WorkerCommand::new(program);
        command.args(args);
        if let Some(cwd) = &self.runner_opts.worker_cwd {
            command.current_dir(cwd);
        }
        debug!("worker command: {}", shell_words::join(&self.worker));

        let runner = TestRunnerBuilder::default()
            .build(run_config, command, SignalHandlerKind::Standard)
            .map_err(|err| ExpectedError::TestRunnerBuildError { err })?;

        let mut reporter = Reporter::new(
            std::io::stdout(),
            output.stdout_styles(),
            ReporterOpts {
                quiet: output.quiet,
                slowest: self.slowest,
            },
        );
        let mut write_error = None;
        let results = runner.execute(unit_ids, |event| {
            if write_error.is_none()
                && let Err(err) = reporter.report_event(&event)
            {
                write_error = Some(err);
            }
        });
        if let Some(err) = write_error {
            return Err(ExpectedError::WriteOutputError { err });
        }
        reporter
            .report_summary(&results)
            .map_err(|err| ExpectedError::WriteOutputError { err })?;

        Ok(results.exit_code())
    }
}

fn read_fromfile(path: &Utf8Path) -> Result<Vec<UnitId>> {
    let contents = std::fs::read_to_string(path).map_err(|err| ExpectedError::FromfileReadError {
        path: path.to_owned(),
        err,
    })?;
    Ok(parse_unit_list(&contents))
}

/// Parses a unit list: one unit per line, taking the first word, ignoring `#` comments.
fn parse_unit_list(contents: &str) -> Vec<UnitId> {
    contents
        .lines()
        .filter_map(|line| {
            let line = line.split_once('#').map_or(line, |(before, _)| before);
            line.split_whitespace().next().map(UnitId::new)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn verify_app() {
        <RegrtestApp as clap::CommandFactory>::command().debug_assert();
    }

    #[test]
    fn parse_args() {
        let app = RegrtestApp::try_parse_from([
            "regrtest",
            "run",
            "test_os",
            "test_sys",
            "-j",
            "4",
            "--timeout",
            "15m",
            "--fail-fast",
            "-w",
            "--",
            "python3",
            "-m",
            "worker",
        ])
        .unwrap();
        let Command::Run(opts) = app.command;
        assert_eq!(opts.units, ["test_os", "test_sys"]);
        assert_eq!(opts.worker, ["python3", "-m", "worker"]);

        let mut config = RunConfig::default();
        opts.runner_opts.apply(&mut config);
        assert_eq!(config.test_threads, TestThreads::Count(4));
        assert_eq!(config.timeout, Some(Duration::from_secs(15 * 60)));
        assert!(config.fail_fast);
        assert!(config.rerun_failed);
        assert!(!config.fail_env_changed);
    }

    #[test]
    fn zero_timeout_disables() {
        let app = RegrtestApp::try_parse_from([
            "regrtest",
            "run",
            "test_os",
            "--timeout",
            "0s",
            "--",
            "worker",
        ])
        .unwrap();
        let Command::Run(opts) = app.command;
        let mut config = RunConfig {
            timeout: Some(Duration::from_secs(60)),
            ..RunConfig::default()
        };
        opts.runner_opts.apply(&mut config);
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn worker_required() {
        RegrtestApp::try_parse_from(["regrtest", "run", "test_os"])
            .expect_err("worker program is required");
    }

    #[test]
    fn unit_list() {
        let contents = indoc! {"
            # Tests to run
            test_os
              test_sys   # flaky on CI

            test_json passed
        "};
        assert_eq!(
            parse_unit_list(contents),
            ["test_os", "test_sys", "test_json"].map(UnitId::new)
        );
    }

    #[test]
    fn fromfile() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("units.txt");
        std::fs::write(&path, "test_a\ntest_b\n").unwrap();
        assert_eq!(
            read_fromfile(&path).unwrap(),
            ["test_a", "test_b"].map(UnitId::new)
        );

        let err = read_fromfile(&dir.path().join("missing.txt")).unwrap_err();
        assert!(
            matches!(err, ExpectedError::FromfileReadError { .. }),
            "{err:?}"
        );
    }
}
