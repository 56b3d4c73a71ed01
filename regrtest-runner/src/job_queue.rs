// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A shared, one-shot queue of units to run.

use crate::protocol::UnitId;
use std::sync::{Mutex, PoisonError};

/// A queue of unit ids shared by all workers in a pass.
///
/// Each id is handed out to exactly one caller of [`next`](Self::next). Once the queue is
/// exhausted or [stopped](Self::stop), every call returns `None`.
#[derive(Debug)]
pub struct JobQueue {
    inner: Mutex<JobQueueInner>,
}

#[derive(Debug)]
struct JobQueueInner {
    unit_ids: Vec<UnitId>,
    next_index: usize,
    stopped: bool,
}

impl JobQueue {
    /// Creates a new queue over the given ids, in order.
    pub fn new(unit_ids: impl IntoIterator<Item = UnitId>) -> Self {
        Self {
            inner: Mutex::new(JobQueueInner {
                unit_ids: unit_ids.into_iter().collect(),
                next_index: 0,
                stopped: false,
            }),
        }
    }

    /// Returns the next unit id, or `None` if the queue is exhausted or stopped.
    pub fn next(&self) -> Option<UnitId> {
        let mut inner = self.lock();
        if inner.stopped {
            return None;
        }
        let unit_id = inner.unit_ids.get(inner.next_index).cloned()?;
        inner.next_index += 1;
        Some(unit_id)
    }

    /// Stops the queue: all subsequent calls to [`next`](Self::next) return `None`.
    pub fn stop(&self) {
        self.lock().stopped = true;
    }

    /// Returns true if the queue has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Returns the number of ids handed out so far.
    pub fn dispatched(&self) -> usize {
        self.lock().next_index
    }

    /// Returns the total number of ids in the queue.
    pub fn len(&self) -> usize {
        self.lock().unit_ids.len()
    }

    /// Returns true if the queue was created without any ids.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JobQueueInner> {
        // The lock is never held across anything that can panic, so a poisoned lock still guards
        // consistent data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
