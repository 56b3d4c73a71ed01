// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for regrtest-runner.

use std::{process::ExitStatus, time::Duration};

/// Pluralization helpers for log messages.
pub mod plural {
    /// Returns "unit" if `count` is 1, otherwise "units".
    pub fn units_str(count: usize) -> &'static str {
        if count == 1 { "unit" } else { "units" }
    }

    /// Returns "worker process" if `count` is 1, otherwise "worker processes".
    pub fn worker_processes_str(count: usize) -> &'static str {
        if count == 1 {
            "worker process"
        } else {
            "worker processes"
        }
    }
}

/// Formats a duration for humans: "250 ms", "1.5 sec", "2 min 3 sec", "1 hour 5 min".
///
/// At most two components are shown, and sub-second precision is only kept when the duration is
/// under a minute.
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_nanos().div_ceil(1_000_000);
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{hours} hour"));
    }
    if mins > 0 {
        parts.push(format!("{mins} min"));
    }
    if secs > 0 {
        if parts.is_empty() {
            parts.push(format!("{:.1} sec", secs as f64 + ms as f64 / 1000.0));
        } else {
            parts.push(format!("{secs} sec"));
        }
    }

    if parts.is_empty() {
        return format!("{ms} ms");
    }
    parts.truncate(2);
    parts.join(" ")
}

/// Displays how a process exited, for use in error messages.
pub(crate) fn display_exited_with(exit_status: ExitStatus) -> String {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(sig) = exit_status.signal() {
            return match signal_str(sig) {
                Some(s) => format!("terminated by signal {sig} (SIG{s})"),
                None => format!("terminated by signal {sig}"),
            };
        }
    }

    match exit_status.code() {
        Some(code) => format!("exit code {code}"),
        None => "exited with an unknown error".to_owned(),
    }
}

/// Returns the name of a signal that commonly ends a crashed or killed worker, without the
/// `SIG` prefix.
#[cfg(unix)]
pub(crate) fn signal_str(signal: i32) -> Option<&'static str> {
    let name = match signal {
        libc::SIGHUP => "HUP",
        libc::SIGINT => "INT",
        libc::SIGQUIT => "QUIT",
        libc::SIGILL => "ILL",
        libc::SIGABRT => "ABRT",
        libc::SIGBUS => "BUS",
        libc::SIGFPE => "FPE",
        libc::SIGKILL => "KILL",
        libc::SIGSEGV => "SEGV",
        libc::SIGPIPE => "PIPE",
        libc::SIGALRM => "ALRM",
        libc::SIGTERM => "TERM",
        _ => return None,
    };
    Some(name)
}
