// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared by the dispatch loop, the hand-off tasks and the workers.
#[derive(Debug, Default)]
pub struct DispatchStats {
    received: AtomicU64,
    dispatched: AtomicU64,
    handled: AtomicU64,
    panicked: AtomicU64,
    abandoned: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Jobs taken from the queue by the dispatch loop.
    pub received: u64,
    /// Jobs passed to a worker's channel.
    pub dispatched: u64,
    /// Handler invocations that returned normally.
    pub handled: u64,
    /// Handler invocations that panicked.
    pub panicked: u64,
    /// Jobs that left the queue but never reached a worker.
    pub abandoned: u64,
}

impl StatsSnapshot {
    /// Jobs that finished the handler, whether it panicked or not.
    pub fn completed(&self) -> u64 {
        self.handled + self.panicked
    }
}

impl DispatchStats {
    pub(crate) fn job_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}
