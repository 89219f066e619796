// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use async_channel::{Receiver, Sender, TrySendError};
use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use futures::{select_biased, FutureExt};
use log::{debug, error, info, warn};

use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::job_engine::handler::Handler;
use crate::job_engine::job::Job;
use crate::job_engine::stats::{DispatchStats, StatsSnapshot};
use crate::job_engine::worker::{Worker, WorkerState};
use crate::job_engine::worker_pool::WorkerPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Created,
    Running,
    Stopped,
}

/// Matches queued jobs to idle workers and owns the workers' lifecycle.
///
/// Producers write [`Job`]s into the queue directly. The dispatch loop runs
/// on its own thread and spawns one hand-off task per job, so accepting the
/// next job never waits for a worker to become free. Jobs may therefore
/// complete in any order.
///
/// Shutdown loses work on purpose: after [`Dispatcher::stop`], jobs still in
/// the queue or still waiting for a worker are dropped. Use
/// [`Dispatcher::drain`] to finish everything that was queued.
///
/// Dropping the dispatcher stops it without waiting.
pub struct Dispatcher<P: Send + 'static> {
    config: DispatcherConfig,
    handler: Arc<dyn Handler<P>>,
    queue_tx: Option<Sender<Job<P>>>,
    queue_rx: Receiver<Job<P>>,
    pool: WorkerPool<P>,
    workers: Vec<Worker<P>>,
    quit_tx: Sender<()>,
    quit_rx: Receiver<()>,
    stats: Arc<DispatchStats>,
    thread_handle: Option<JoinHandle<()>>,
    status: Status,
}

impl<P: Send + 'static> Dispatcher<P> {
    /// Creates a dispatcher with an internal job queue sized by
    /// `config.queue_capacity`. Producers obtain it via [`Dispatcher::job_queue`].
    pub fn new(config: DispatcherConfig, handler: impl Handler<P>) -> Result<Self, DispatchError> {
        config.validate()?;
        let (tx, rx) = match config.queue_capacity {
            Some(capacity) => async_channel::bounded(capacity),
            None => async_channel::unbounded(),
        };
        Ok(Self::from_parts(config, Some(tx), rx, Arc::new(handler)))
    }

    /// Creates a dispatcher that consumes a caller-supplied job queue.
    pub fn with_queue(
        config: DispatcherConfig,
        queue: Receiver<Job<P>>,
        handler: impl Handler<P>,
    ) -> Result<Self, DispatchError> {
        config.validate()?;
        Ok(Self::from_parts(config, None, queue, Arc::new(handler)))
    }

    fn from_parts(
        config: DispatcherConfig,
        queue_tx: Option<Sender<Job<P>>>,
        queue_rx: Receiver<Job<P>>,
        handler: Arc<dyn Handler<P>>,
    ) -> Self {
        let (quit_tx, quit_rx) = async_channel::bounded(1);
        Self {
            pool: WorkerPool::new(config.workers),
            config,
            handler,
            queue_tx,
            queue_rx,
            workers: Vec::new(),
            quit_tx,
            quit_rx,
            stats: Arc::new(DispatchStats::default()),
            thread_handle: None,
            status: Status::Created,
        }
    }

    /// Producer handle of the internal queue; `None` for a caller-supplied
    /// queue and after the dispatcher has been stopped.
    pub fn job_queue(&self) -> Option<Sender<Job<P>>> {
        self.queue_tx.clone()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.status == Status::Running
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of workers currently waiting for a job.
    pub fn idle_workers(&self) -> usize {
        self.pool.idle()
    }

    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.workers.iter().map(Worker::state).collect()
    }

    /// Starts all workers and the dispatch loop.
    pub fn run(&mut self) -> Result<(), DispatchError> {
        match self.status {
            Status::Running => return Err(DispatchError::AlreadyRunning),
            Status::Stopped => return Err(DispatchError::Stopped),
            Status::Created => {}
        }

        for id in 0..self.config.workers {
            let worker = Worker::new(id, self.pool.clone(), self.handler.clone())
                .with_thread_name(format!("{}-worker-{id}", self.config.thread_name))
                .with_stats(self.stats.clone());
            if let Err(e) = worker.start() {
                error!("Failed to start worker {id}: {e}");
                self.abort_workers();
                return Err(e);
            }
            self.workers.push(worker);
        }

        let dispatch_loop = DispatchLoop {
            queue: self.queue_rx.clone(),
            pool: self.pool.clone(),
            quit: self.quit_rx.clone(),
            stats: self.stats.clone(),
            slots: self.config.max_pending_handoffs.map(HandoffSlots::new),
        };
        let name = format!("{}-dispatch", self.config.thread_name);
        // run dispatcher in a dedicated thread
        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            let mut pool = LocalPool::new();
            let spawner = pool.spawner();
            if let Err(e) = spawner.spawn_local(dispatch_loop.run(spawner.clone())) {
                error!("Failed to spawn the dispatch loop: {e}");
                return;
            }
            pool.run(); // blocks until the loop and all hand-offs complete
        });
        match spawned {
            Ok(handle) => self.thread_handle = Some(handle),
            Err(source) => {
                self.abort_workers();
                return Err(DispatchError::Spawn { name, source });
            }
        }

        self.status = Status::Running;
        info!(
            "Dispatcher running with {} workers ({})",
            self.config.workers,
            self.handler.desc()
        );
        Ok(())
    }

    fn abort_workers(&mut self) {
        for worker in &self.workers {
            worker.stop();
        }
        for worker in self.workers.drain(..) {
            worker.wait_until_finished();
        }
        self.status = Status::Stopped;
    }

    /// Stops matching jobs to workers and stops every worker. Does not block.
    ///
    /// Handler calls in progress, and jobs already handed to a worker, run
    /// to completion. Jobs left in the queue or waiting for a worker are
    /// abandoned. The queue is closed, so producers sending afterwards, or
    /// blocked on a full queue, get an error.
    pub fn stop(&mut self) {
        if self.status == Status::Stopped {
            return;
        }
        self.status = Status::Stopped;
        self.quit_tx.close();
        self.queue_rx.close();
        self.pool.close();
        for worker in &self.workers {
            worker.stop();
        }
        self.queue_tx = None;
        debug!("Dispatcher stop requested");
    }

    /// Waits for the dispatch thread to finish, then stops the workers and
    /// waits for them as well.
    ///
    /// The dispatch thread finishes after [`Dispatcher::stop`] or once the
    /// job queue has been closed and every job taken from it has reached a
    /// worker. Without either, this blocks.
    pub fn wait_until_finished(&mut self) {
        if self.status == Status::Created {
            return;
        }
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("Dispatch thread terminated abnormally");
            }
        }
        for worker in &self.workers {
            worker.stop();
        }
        for worker in &self.workers {
            worker.wait_until_finished();
            debug!("Worker {} joined", worker.id());
        }
        if self.status == Status::Running {
            self.status = Status::Stopped;
        }
        self.queue_tx = None;
        info!("Dispatcher finished: {:?}", self.stats.snapshot());
    }

    /// Closes the job queue and blocks until every queued job has been
    /// handled, then shuts the workers down. Producers sending afterwards
    /// get an error from the queue.
    ///
    /// A dispatcher that was never run is started first. If that fails the
    /// error is returned and the queue is left open.
    pub fn drain(&mut self) -> Result<(), DispatchError> {
        if self.status == Status::Created {
            self.run()?;
        }
        self.queue_rx.close();
        self.wait_until_finished();
        self.quit_tx.close();
        self.status = Status::Stopped;
        Ok(())
    }
}

impl<P: Send + 'static> std::fmt::Debug for Dispatcher<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("status", &self.status)
            .field("workers", &self.workers)
            .field("queued", &self.queue_rx.len())
            .finish()
    }
}

/// Counting semaphore over a bounded channel: one message per hand-off in flight.
#[derive(Clone)]
struct HandoffSlots {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl HandoffSlots {
    fn new(limit: usize) -> Self {
        let (tx, rx) = async_channel::bounded(limit);
        Self { tx, rx }
    }

    async fn acquire(&self) -> HandoffSlot {
        // cannot fail, we hold a receiver
        let _ = self.tx.send(()).await;
        HandoffSlot {
            rx: self.rx.clone(),
        }
    }
}

struct HandoffSlot {
    rx: Receiver<()>,
}

impl Drop for HandoffSlot {
    fn drop(&mut self) {
        let _ = self.rx.try_recv();
    }
}

/// State owned by the dispatch thread.
struct DispatchLoop<P> {
    queue: Receiver<Job<P>>,
    pool: WorkerPool<P>,
    quit: Receiver<()>,
    stats: Arc<DispatchStats>,
    slots: Option<HandoffSlots>,
}

impl<P: Send + 'static> DispatchLoop<P> {
    /// Listen for incoming jobs and spawn one hand-off task per job.
    async fn run(self, spawner: LocalSpawner) {
        loop {
            let job = select_biased! {
                _ = self.quit.recv().fuse() => break,
                job = self.queue.recv().fuse() => match job {
                    Ok(job) => job,
                    Err(_) => {
                        info!("Job queue has been closed");
                        break;
                    }
                },
            };
            self.stats.job_received();

            let slot = match &self.slots {
                Some(slots) => select_biased! {
                    _ = self.quit.recv().fuse() => {
                        self.stats.job_abandoned();
                        break;
                    }
                    slot = slots.acquire().fuse() => Some(slot),
                },
                None => None,
            };

            let handoff = hand_off(
                job,
                self.pool.clone(),
                self.quit.clone(),
                self.stats.clone(),
                slot,
            );
            if let Err(e) = spawner.spawn_local(handoff) {
                warn!("Failed to spawn hand-off task: {e}");
                self.stats.job_abandoned();
            }
        }

        let left = self.queue.len();
        if left > 0 {
            warn!("Dispatch loop stopped with {left} jobs left in the queue; they are abandoned");
        }
        info!("Dispatch loop shutting down");
    }
}

/// Waits for an idle worker and passes one job to it.
///
/// A worker stopped on its own leaves its closed channel in the pool; the
/// job then goes to the next idle worker.
async fn hand_off<P: Send + 'static>(
    mut job: Job<P>,
    pool: WorkerPool<P>,
    quit: Receiver<()>,
    stats: Arc<DispatchStats>,
    _slot: Option<HandoffSlot>,
) {
    loop {
        let worker = select_biased! {
            _ = quit.recv().fuse() => None,
            worker = pool.acquire().fuse() => worker,
        };
        let Some(worker) = worker else {
            debug!("No worker available before shutdown, job abandoned");
            stats.job_abandoned();
            return;
        };

        // An advertised worker is parked on an empty channel, so this never blocks.
        match worker.try_send(job) {
            Ok(()) => {
                stats.job_dispatched();
                return;
            }
            Err(TrySendError::Closed(returned)) => {
                debug!("Worker stopped before accepting the job, trying the next one");
                job = returned;
            }
            Err(TrySendError::Full(_)) => {
                error!("Idle worker advertised a full channel, job abandoned");
                stats.job_abandoned();
                return;
            }
        }
    }
}
