// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use async_channel::{Receiver, Sender};

use crate::job_engine::job::Job;

/// Sending half of a worker's hand-off channel.
pub type JobSender<P> = Sender<Job<P>>;

/// Availability queue: the hand-off channels of all currently idle workers.
///
/// An idle worker publishes its own sender here; a hand-off task acquires
/// one and passes exactly one job through it. A worker publishes again only
/// after it has finished that job, so a sender is never present twice and
/// the pool never holds more entries than there are workers.
pub struct WorkerPool<P> {
    tx: Sender<JobSender<P>>,
    rx: Receiver<JobSender<P>>,
}

impl<P> Clone for WorkerPool<P> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<P> WorkerPool<P> {
    /// Creates a pool for `capacity` workers. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Advertises an idle worker. Fails only once the pool is closed.
    pub async fn publish(&self, worker: JobSender<P>) -> Result<(), JobSender<P>> {
        self.tx.send(worker).await.map_err(|err| err.into_inner())
    }

    /// Waits for an idle worker. `None` once the pool is closed and empty.
    pub async fn acquire(&self) -> Option<JobSender<P>> {
        self.rx.recv().await.ok()
    }

    /// Number of workers currently advertised as idle.
    pub fn idle(&self) -> usize {
        self.rx.len()
    }

    /// Rejects further workers and lets waiting hand-offs return `None`
    /// once the advertised ones are taken.
    pub fn close(&self) {
        self.tx.close();
    }
}
