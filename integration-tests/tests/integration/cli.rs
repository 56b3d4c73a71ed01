// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::FAKE_UNIT_BIN;
use camino_tempfile::Utf8TempDir;
use indoc::indoc;
use integration_tests::{fake_unit::STATE_DIR_ENV, regrtest_cli::RegrtestCli};
use regrtest_runner::results::RegrtestExitCode;

fn cli(state_dir: &Utf8TempDir) -> RegrtestCli {
    let mut cli = RegrtestCli::new(env!("CARGO_BIN_EXE_regrtest-dup"));
    cli.env(STATE_DIR_ENV, state_dir.path().as_str());
    cli
}

fn state_dir() -> Utf8TempDir {
    camino_tempfile::Builder::new()
        .prefix("regrtest-cli-")
        .tempdir()
        .expect("created state dir")
}

#[test]
fn test_cli_failure_summary() {
    let state_dir = state_dir();
    let output = cli(&state_dir)
        .args(["run", "pass_1", "fail_2", "skip_3", "-j", "2", "--", FAKE_UNIT_BIN])
        .output();

    assert_eq!(
        output.exit_status.code(),
        Some(RegrtestExitCode::BAD_TEST),
        "{output}"
    );
    let stdout = output.stdout_as_str();
    assert!(
        stdout.contains("Run 3 units in parallel using 2 worker processes"),
        "{output}"
    );
    assert!(stdout.contains("== Tests result: FAILURE =="), "{output}");
    assert!(
        stdout.contains(indoc! {"
            1 unit failed:
                fail_2
        "}),
        "{output}"
    );
    assert!(
        stdout.contains(indoc! {"
            1 unit skipped:
                skip_3
        "}),
        "{output}"
    );
    assert!(stdout.contains("Result: FAILURE"), "{output}");
}

#[test]
fn test_cli_rerun_quiet() {
    let state_dir = state_dir();
    let output = cli(&state_dir)
        .args(["--quiet", "run", "flaky_1", "pass_2", "-w", "--", FAKE_UNIT_BIN])
        .output();

    assert_eq!(
        output.exit_status.code(),
        Some(RegrtestExitCode::OK),
        "{output}"
    );
    let stdout = output.stdout_as_str();
    assert!(
        stdout.contains("Re-running 1 failed unit in verbose mode in worker processes"),
        "{output}"
    );
    assert!(
        stdout.contains("Result: FAILURE then SUCCESS"),
        "{output}"
    );
    // Quiet mode leaves out the list of passed units.
    assert!(!stdout.contains("units OK."), "{output}");
}

#[test]
fn test_cli_fromfile() {
    let state_dir = state_dir();
    let list = state_dir.path().join("units.txt");
    std::fs::write(&list, "# units\npass_1\npass_2 extra\n").expect("wrote unit list");

    let output = cli(&state_dir)
        .args(["run", "--fromfile", list.as_str(), "--", FAKE_UNIT_BIN])
        .output();

    assert_eq!(
        output.exit_status.code(),
        Some(RegrtestExitCode::OK),
        "{output}"
    );
    assert!(
        output.stdout_as_str().contains("All 2 units OK."),
        "{output}"
    );
}

#[test]
fn test_cli_setup_errors() {
    let state_dir = state_dir();

    let output = cli(&state_dir).args(["run", "--", FAKE_UNIT_BIN]).output();
    assert_eq!(
        output.exit_status.code(),
        Some(RegrtestExitCode::SETUP_ERROR),
        "{output}"
    );
    assert!(
        output.stderr_as_str().contains("no units specified"),
        "{output}"
    );

    let output = cli(&state_dir)
        .args([
            "run",
            "pass_1",
            "--profile",
            "nonexistent",
            "--",
            FAKE_UNIT_BIN,
        ])
        .output();
    assert_eq!(
        output.exit_status.code(),
        Some(RegrtestExitCode::SETUP_ERROR),
        "{output}"
    );
    assert!(
        output
            .stderr_as_str()
            .contains("profile `nonexistent` not found"),
        "{output}"
    );
}
