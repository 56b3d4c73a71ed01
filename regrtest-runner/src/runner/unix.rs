// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::KillStatus;
use libc::{ESRCH, SIGKILL};
use std::{io, os::unix::process::CommandExt};

/// Pre-execution configuration on Unix.
///
/// This makes the child the leader of a new process group, so that it and every process it
/// spawns can be killed at once.
pub(super) fn set_process_group(cmd: &mut std::process::Command) {
    cmd.process_group(0);
}

/// Kills the process group led by `pid`.
pub(super) fn kill_process_group(pid: u32) -> io::Result<KillStatus> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

    // SAFETY: kill has no memory safety requirements. A negative pid targets the process group.
    let ret = unsafe { libc::kill(-pgid, SIGKILL) };
    if ret == 0 {
        return Ok(KillStatus::Killed);
    }

    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(ESRCH) {
        Ok(KillStatus::AlreadyExited)
    } else {
        Err(err)
    }
}
