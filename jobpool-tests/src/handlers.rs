// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use async_channel::{Receiver, Sender};
use jobpool::{Handler, Job};
use log::debug;

/// Reports every handled payload on a channel.
pub struct RecordingHandler {
    done: Sender<u32>,
}

impl RecordingHandler {
    pub fn new() -> (Self, Receiver<u32>) {
        let (done, rx) = async_channel::unbounded();
        (Self { done }, rx)
    }
}

impl Handler<u32> for RecordingHandler {
    fn desc(&self) -> &str {
        "recording"
    }

    fn handle(&self, job: Job<u32>) {
        let payload = job.into_payload();
        debug!("handling job {payload}");
        let _ = self.done.send_blocking(payload);
    }
}

/// Counts how many handler calls overlap.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    max: AtomicUsize,
    violations: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }
}

/// Holds each job for `work` and records the peak concurrency on a probe.
pub struct ProbingHandler {
    pub probe: Arc<ConcurrencyProbe>,
    pub limit: usize,
    pub work: Duration,
    pub done: Sender<u32>,
}

impl Handler<u32> for ProbingHandler {
    fn desc(&self) -> &str {
        "probing"
    }

    fn handle(&self, job: Job<u32>) {
        let now = self.probe.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max.fetch_max(now, Ordering::SeqCst);
        if now > self.limit {
            self.probe.violations.fetch_add(1, Ordering::SeqCst);
        }
        thread::sleep(self.work);
        self.probe.current.fetch_sub(1, Ordering::SeqCst);
        let _ = self.done.send_blocking(job.into_payload());
    }
}

/// Execution window of one job.
#[derive(Debug, Clone, Copy)]
pub struct Span {
    pub payload: u32,
    pub start: Instant,
    pub end: Instant,
}

impl Span {
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Sleeps for a per-payload duration and reports when it ran.
pub struct TimedHandler {
    pub durations: Vec<(u32, Duration)>,
    pub spans: Sender<Span>,
}

impl Handler<u32> for TimedHandler {
    fn handle(&self, job: Job<u32>) {
        let payload = *job.payload();
        let start = Instant::now();
        if let Some((_, duration)) = self.durations.iter().find(|(p, _)| *p == payload) {
            thread::sleep(*duration);
        }
        let _ = self.spans.send_blocking(Span {
            payload,
            start,
            end: Instant::now(),
        });
    }
}
