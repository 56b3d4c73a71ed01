// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers shared by the integration tests and the test helper binaries.

pub mod fake_unit;
pub mod regrtest_cli;
