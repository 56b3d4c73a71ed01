// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::KillStatus;
use std::{io, os::windows::process::CommandExt};
use windows_sys::Win32::{
    Foundation::{CloseHandle, ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER},
    System::Threading::{CREATE_NEW_PROCESS_GROUP, OpenProcess, PROCESS_TERMINATE, TerminateProcess},
};

/// Pre-execution configuration on Windows.
///
/// The child gets its own console process group, so that Ctrl-C in the terminal is only
/// delivered to the runner.
pub(super) fn set_process_group(cmd: &mut std::process::Command) {
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

/// Kills the process `pid`.
///
/// Windows has no process group kill. This only kills the direct child.
pub(super) fn kill_process_group(pid: u32) -> io::Result<KillStatus> {
    // SAFETY: Win32 call with no pointer arguments.
    let handle = unsafe { OpenProcess(PROCESS_TERMINATE, 0, pid) };
    if handle.is_null() {
        let err = io::Error::last_os_error();
        // The pid no longer refers to a running process.
        return if err.raw_os_error() == Some(ERROR_INVALID_PARAMETER as i32) {
            Ok(KillStatus::AlreadyExited)
        } else {
            Err(err)
        };
    }

    // SAFETY: handle is a valid process handle opened above.
    let terminated = unsafe { TerminateProcess(handle, 1) };
    let res = if terminated != 0 {
        Ok(KillStatus::Killed)
    } else {
        let err = io::Error::last_os_error();
        // A process that is exiting refuses termination with access denied.
        if err.raw_os_error() == Some(ERROR_ACCESS_DENIED as i32) {
            Ok(KillStatus::AlreadyExited)
        } else {
            Err(err)
        }
    };

    // SAFETY: handle is valid and not used after this.
    unsafe { CloseHandle(handle) };
    res
}
