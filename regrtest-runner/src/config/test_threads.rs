// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::TestThreadsParseError;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, str::FromStr, sync::LazyLock};
use tracing::warn;

const NUM_CPUS_KEYWORD: &str = "num-cpus";

/// Returns the number of logical CPUs, computed once per process.
pub fn num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> = LazyLock::new(|| {
        std::thread::available_parallelism().map_or_else(
            |err| {
                warn!("unable to determine the number of CPUs ({err}), assuming 1");
                1
            },
            usize::from,
        )
    });
    *NUM_CPUS
}

/// How many worker processes run at once.
///
/// In config files and on the command line this is a positive integer, a negative integer
/// (the CPU count minus that many, but at least 1), or `"num-cpus"`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTestThreads", into = "RawTestThreads")]
pub enum TestThreads {
    /// A fixed number of workers.
    Count(usize),

    /// One worker per logical CPU.
    NumCpus,
}

impl TestThreads {
    /// Returns the number of workers to start.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(count) => count,
            Self::NumCpus => num_cpus(),
        }
    }

    fn from_signed(count: i64) -> Result<Self, TestThreadsParseError> {
        match count.cmp(&0) {
            Ordering::Greater => Ok(Self::Count(count as usize)),
            Ordering::Less => {
                let remaining = (num_cpus() as i64).saturating_add(count);
                Ok(Self::Count(remaining.max(1) as usize))
            }
            Ordering::Equal => Err(TestThreadsParseError::new("0 (jobs may not be 0)")),
        }
    }
}

impl FromStr for TestThreads {
    type Err = TestThreadsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == NUM_CPUS_KEYWORD {
            return Ok(Self::NumCpus);
        }
        let count: i64 = s
            .parse()
            .map_err(|err| TestThreadsParseError::new(format!("{s} ({err})")))?;
        Self::from_signed(count)
    }
}

impl fmt::Display for TestThreads {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => write!(f, "{count}"),
            Self::NumCpus => f.write_str(NUM_CPUS_KEYWORD),
        }
    }
}

// Worker processes read this back from their job, so both directions go through the same form.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawTestThreads {
    Count(i64),
    Keyword(String),
}

impl TryFrom<RawTestThreads> for TestThreads {
    type Error = TestThreadsParseError;

    fn try_from(raw: RawTestThreads) -> Result<Self, Self::Error> {
        match raw {
            RawTestThreads::Count(count) => Self::from_signed(count),
            RawTestThreads::Keyword(keyword) => keyword.parse(),
        }
    }
}

impl From<TestThreads> for RawTestThreads {
    fn from(threads: TestThreads) -> Self {
        match threads {
            TestThreads::Count(count) => Self::Count(i64::try_from(count).unwrap_or(i64::MAX)),
            TestThreads::NumCpus => Self::Keyword(NUM_CPUS_KEYWORD.to_owned()),
        }
    }
}
