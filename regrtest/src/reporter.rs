// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable output for a run: one progress line per finished unit, and a summary at the
//! end.

use crate::output::ReportStyles;
use itertools::Itertools;
use owo_colors::{OwoColorize, Style};
use regrtest_runner::{
    events::{RunEvent, RunPass, RunningUnit, StopReason},
    helpers::format_duration,
    protocol::{Outcome, UnitExecution, UnitId},
    results::RunResults,
    runner::PROGRESS_MIN_TIME,
};
use std::{
    fmt::Write as _,
    io::{self, Write},
    time::{Duration, Instant},
};

const LIST_WIDTH: usize = 70;
const LIST_INDENT: usize = 4;
const SLOWEST_COUNT: usize = 10;

/// Options for the reporter.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ReporterOpts {
    /// Hide progress lines and the lists of passed and skipped units.
    pub(crate) quiet: bool,

    /// Print the slowest units in the summary.
    pub(crate) slowest: bool,
}

/// Writes run events and the final summary to `writer`.
pub(crate) struct Reporter<W> {
    writer: W,
    styles: ReportStyles,
    opts: ReporterOpts,
    start: Instant,
    total: usize,
    signal_name: Option<&'static str>,
}

impl<W: Write> Reporter<W> {
    pub(crate) fn new(writer: W, styles: ReportStyles, opts: ReporterOpts) -> Self {
        Self {
            writer,
            styles,
            opts,
            start: Instant::now(),
            total: 0,
            signal_name: None,
        }
    }

    pub(crate) fn report_event(&mut self, event: &RunEvent) -> io::Result<()> {
        match event {
            RunEvent::PassStarted {
                pass: RunPass::Initial,
                unit_ids,
                worker_count,
                timeout,
                worker_timeout,
                ..
            } => {
                self.total = unit_ids.len();
                let mut line = format!(
                    "Run {} in parallel using {worker_count} worker {}",
                    count(unit_ids.len(), "unit"),
                    if *worker_count == 1 {
                        "process"
                    } else {
                        "processes"
                    },
                );
                if let (Some(timeout), Some(worker_timeout)) = (timeout, worker_timeout) {
                    let _ = write!(
                        line,
                        " (timeout: {}, worker timeout: {})",
                        format_duration(*timeout),
                        format_duration(*worker_timeout),
                    );
                }
                self.log(&line)?;
            }
            RunEvent::PassStarted {
                pass: RunPass::Rerun,
                unit_ids,
                ..
            } => {
                self.total = unit_ids.len();
                writeln!(self.writer)?;
                self.log(&format!(
                    "Re-running {} in verbose mode in worker processes",
                    count(unit_ids.len(), "failed unit"),
                ))?;
            }
            RunEvent::UnitFinished {
                index,
                failures,
                execution,
                running,
                ..
            } => {
                if !self.opts.quiet {
                    let text = self.unit_text(execution, running);
                    self.progress(*index, *failures, &text)?;
                }
                if let Some(diagnostic) = &execution.result.diagnostic {
                    writeln!(self.writer, "{diagnostic}")?;
                }
            }
            RunEvent::StillRunning { running } => {
                if let Some(running) = running_text(running) {
                    self.log(&running)?;
                }
            }
            RunEvent::Stopping { reason } => match reason {
                StopReason::FailFast { unit_id } => {
                    self.log(&format!("Stopping after failure of {unit_id} (fail-fast)"))?;
                }
                StopReason::UnitInterrupted { unit_id } => {
                    self.log(&format!("Stopping: {unit_id} was interrupted"))?;
                }
                StopReason::Signal(event) => {
                    self.signal_name = Some(event.signal_name());
                    writeln!(self.writer)?;
                    self.log(&format!("Received {}, stopping", event.signal_name()))?;
                }
            },
            RunEvent::WaitingForWorker { worker_id, elapsed } => {
                self.log(&format!(
                    "Waiting for worker {worker_id} for {}",
                    format_duration(*elapsed),
                ))?;
            }
            RunEvent::PassFinished { .. } => {}
        }

        self.writer.flush()
    }

    pub(crate) fn report_summary(&mut self, results: &RunResults) -> io::Result<()> {
        self.write_result(results)?;
        self.write_totals(results)?;
        self.writer.flush()
    }

    fn unit_text(&self, execution: &UnitExecution, running: &[RunningUnit]) -> String {
        let result = &execution.result;
        let mut text = execution.to_string();
        if execution.error_message.is_none()
            && result.outcome != Outcome::Timeout
            && let Some(duration) = result.duration
            && duration >= PROGRESS_MIN_TIME
        {
            let _ = write!(text, " ({})", format_duration(duration));
        }
        if let Some(running) = running_text(running) {
            let _ = write!(text, " -- {running}");
        }

        let style = match result.outcome {
            Outcome::Passed => Style::new(),
            Outcome::Failed
            | Outcome::Timeout
            | Outcome::OrchestrationError
            | Outcome::EnvironmentChanged => self.styles.fail,
            Outcome::Skipped
            | Outcome::ResourceDenied
            | Outcome::DidNotRun
            | Outcome::Interrupted => self.styles.skip,
        };
        text.style(style).to_string()
    }

    /// Writes "[ index/total/failures] text".
    fn progress(&mut self, index: usize, failures: usize, text: &str) -> io::Result<()> {
        let width = self.total.to_string().len();
        let mut counter = format!("{index:>width$}/{}", self.total);
        if failures > 0 {
            let _ = write!(counter, "/{failures}");
        }
        self.log(&format!("[{counter}] {text}"))
    }

    /// Writes a line prefixed with the time elapsed since the start of the run.
    fn log(&mut self, line: &str) -> io::Result<()> {
        writeln!(
            self.writer,
            "{} {line}",
            format_elapsed(self.start.elapsed()).style(self.styles.count),
        )
    }

    fn write_result(&mut self, results: &RunResults) -> io::Result<()> {
        let state = results.state();
        writeln!(self.writer)?;
        writeln!(
            self.writer,
            "{}",
            format!("== Tests result: {state} ==").style(self.styles.heading),
        )?;

        if results.is_interrupted() {
            match self.signal_name {
                Some(name) => writeln!(self.writer, "Test suite interrupted by signal {name}.")?,
                None => writeln!(self.writer, "Test suite interrupted.")?,
            }
        }

        let omitted = results.omitted();
        if !omitted.is_empty() {
            self.write_list(&format!("{} omitted:", count(omitted.len(), "unit")), omitted)?;
        }

        let passed = results.passed();
        if !passed.is_empty() && !self.opts.quiet {
            let all = results.failed_units().next().is_none()
                && results.skipped().is_empty()
                && !results.is_interrupted()
                && passed.len() > 1;
            writeln!(self.writer)?;
            writeln!(
                self.writer,
                "{}{} OK.",
                if all { "All " } else { "" },
                count(passed.len(), "unit"),
            )?;
        }

        if self.opts.slowest {
            writeln!(self.writer)?;
            writeln!(self.writer, "{SLOWEST_COUNT} slowest units:")?;
            for (unit_id, duration) in results.slowest(SLOWEST_COUNT) {
                writeln!(self.writer, "- {unit_id}: {}", format_duration(duration))?;
            }
        }

        let failed: Vec<_> = results.failed_units().collect();
        if !failed.is_empty() {
            self.write_list(
                &format!("{} failed:", count(failed.len(), "unit"))
                    .style(self.styles.fail)
                    .to_string(),
                failed,
            )?;
        }

        let env_changed = results.env_changed();
        if !env_changed.is_empty() {
            self.write_list(
                &format!(
                    "{} altered the execution environment:",
                    count(env_changed.len(), "unit"),
                ),
                env_changed,
            )?;
        }

        if !self.opts.quiet {
            let skipped = results.skipped();
            if !skipped.is_empty() {
                self.write_list(&format!("{} skipped:", count(skipped.len(), "unit")), skipped)?;
            }
            let resource_denied = results.resource_denied();
            if !resource_denied.is_empty() {
                self.write_list(
                    &format!(
                        "{} skipped (resource denied):",
                        count(resource_denied.len(), "unit"),
                    ),
                    resource_denied,
                )?;
            }
        }

        let rerun = results.rerun();
        if !rerun.is_empty() {
            self.write_list(&format!("{}:", count(rerun.len(), "re-run unit")), rerun)?;
        }

        let did_not_run = results.did_not_run();
        if !did_not_run.is_empty() {
            self.write_list(
                &format!("{} run no tests:", count(did_not_run.len(), "unit")),
                did_not_run,
            )?;
        }

        Ok(())
    }

    fn write_totals(&mut self, results: &RunResults) -> io::Result<()> {
        writeln!(self.writer)?;
        writeln!(
            self.writer,
            "Total duration: {}",
            format_duration(self.start.elapsed()),
        )?;

        let stats = results.total_stats();
        let mut tests = vec![format!("run={}", thousands(stats.tests_run))];
        if stats.failures > 0 {
            tests.push(format!("failures={}", thousands(stats.failures)));
        }
        if stats.skipped > 0 {
            tests.push(format!("skipped={}", thousands(stats.skipped)));
        }
        writeln!(self.writer, "Total tests: {}", tests.join(" "))?;

        let failed = results.failed_units().count();
        let run = results.passed().len()
            + failed
            + results.rerun().len()
            + results.skipped().len()
            + results.env_changed().len()
            + results.did_not_run().len();
        let mut files = vec![format!("run={run}/{}", results.selected().len())];
        for (name, len) in [
            ("failed", failed),
            ("env_changed", results.env_changed().len()),
            ("skipped", results.skipped().len()),
            ("resource_denied", results.resource_denied().len()),
            ("rerun", results.rerun().len()),
            ("run_no_tests", results.did_not_run().len()),
        ] {
            if len > 0 {
                files.push(format!("{name}={len}"));
            }
        }
        writeln!(self.writer, "Total test files: {}", files.join(" "))?;

        let state = results.state();
        let style = if results.exit_code() == 0 {
            self.styles.pass
        } else {
            self.styles.fail
        };
        writeln!(self.writer, "Result: {}", state.style(style))
    }

    fn write_list<'a>(
        &mut self,
        heading: &str,
        unit_ids: impl IntoIterator<Item = &'a UnitId>,
    ) -> io::Result<()> {
        writeln!(self.writer)?;
        writeln!(self.writer, "{heading}")?;
        for line in wrap_list(unit_ids, LIST_WIDTH, LIST_INDENT) {
            writeln!(self.writer, "{line}")?;
        }
        Ok(())
    }
}

/// Returns "running (N): a (1 min), b (45 sec)" for units running long enough to mention.
fn running_text(running: &[RunningUnit]) -> Option<String> {
    let long: Vec<_> = running
        .iter()
        .filter(|unit| unit.elapsed >= PROGRESS_MIN_TIME)
        .collect();
    if long.is_empty() {
        return None;
    }
    Some(format!(
        "running ({}): {}",
        long.len(),
        long.iter()
            .map(|unit| format!("{} ({})", unit.unit_id, format_duration(unit.elapsed)))
            .join(", "),
    ))
}

/// Returns "1 unit" or "N units".
fn count(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

/// Formats elapsed time as H:MM:SS.
fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (mins, secs) = (secs / 60, secs % 60);
    let (hours, mins) = (mins / 60, mins % 60);
    format!("{hours}:{mins:02}:{secs:02}")
}

/// Formats a number with `,` as the thousands separator.
fn thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Sorts unit ids and fills them into indented lines of at most `width` characters.
///
/// A single id longer than the width gets a line of its own.
fn wrap_list<'a>(
    unit_ids: impl IntoIterator<Item = &'a UnitId>,
    width: usize,
    indent: usize,
) -> Vec<String> {
    let blanks = " ".repeat(indent);
    let mut lines = Vec::new();
    let mut line = String::new();
    for unit_id in unit_ids.into_iter().map(UnitId::as_str).sorted() {
        if !line.is_empty() && line.len() + 1 + unit_id.len() > width {
            lines.push(std::mem::take(&mut line));
        }
        if line.is_empty() {
            line.push_str(&blanks);
        } else {
            line.push(' ');
        }
        line.push_str(unit_id);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}
