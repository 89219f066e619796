// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use async_channel::{Receiver, Sender};
use futures::{select_biased, FutureExt};
use log::{debug, error, warn};

use crate::error::DispatchError;
use crate::job_engine::handler::Handler;
use crate::job_engine::job::Job;
use crate::job_engine::stats::{DispatchStats, StatsSnapshot};
use crate::job_engine::worker_pool::{JobSender, WorkerPool};

/// Lifecycle of a worker:
/// `Created -> Idle -> Busy -> Idle -> ... -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum WorkerState {
    Created,
    Idle,
    Busy,
    Stopping,
    Stopped,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Created,
            1 => WorkerState::Idle,
            2 => WorkerState::Busy,
            3 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }
}

#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(WorkerState::Created as u8))
    }

    fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Moves between `Idle` and `Busy`; never leaves `Stopping` or `Stopped`.
    fn enter(&self, state: WorkerState) {
        let _ = self.0.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            (current < WorkerState::Stopping as u8).then_some(state as u8)
        });
    }

    fn begin_stopping(&self) {
        let _ = self.0.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            let current = WorkerState::from_u8(current);
            matches!(current, WorkerState::Idle | WorkerState::Busy)
                .then_some(WorkerState::Stopping as u8)
        });
    }
}

/// A single executor of handler logic with its own hand-off channel.
///
/// While idle, the worker advertises its channel in the shared
/// [`WorkerPool`] and waits for either one job or the stop signal. The
/// handler runs synchronously on the worker's thread; a panic inside it is
/// caught and the worker goes back to idle.
///
/// There is no per-job timeout: a handler that never returns keeps its
/// worker busy forever, and that worker is lost to the pool.
pub struct Worker<P: Send + 'static> {
    id: usize,
    thread_name: String,
    handler: Arc<dyn Handler<P>>,
    pool: WorkerPool<P>,
    stats: Arc<DispatchStats>,
    state: Arc<StateCell>,
    job_tx: JobSender<P>,
    stop_tx: Sender<()>,
    // Taken by the first `start()`; `None` afterwards.
    receivers: Mutex<Option<(Receiver<Job<P>>, Receiver<()>)>>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<P: Send + 'static> Worker<P> {
    pub fn new(id: usize, pool: WorkerPool<P>, handler: Arc<dyn Handler<P>>) -> Self {
        // async-channel has no rendezvous channels; a capacity of one is
        // equivalent because the worker only advertises an empty channel.
        let (job_tx, job_rx) = async_channel::bounded(1);
        let (stop_tx, stop_rx) = async_channel::bounded(1);

        Self {
            id,
            thread_name: format!("worker-{id}"),
            handler,
            pool,
            stats: Arc::new(DispatchStats::default()),
            state: Arc::new(StateCell::new()),
            job_tx,
            stop_tx,
            receivers: Mutex::new(Some((job_rx, stop_rx))),
            thread_handle: Mutex::new(None),
        }
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub(crate) fn with_stats(mut self, stats: Arc<DispatchStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Starts the service loop on a dedicated thread.
    ///
    /// Only the first call starts the worker; later calls return
    /// [`DispatchError::WorkerAlreadyStarted`].
    pub fn start(&self) -> Result<(), DispatchError> {
        if self.state.get() == WorkerState::Stopped {
            return Err(DispatchError::Stopped);
        }
        let Some((job_rx, stop_rx)) = lock(&self.receivers).take() else {
            return Err(DispatchError::WorkerAlreadyStarted(self.id));
        };

        let service = WorkerLoop {
            id: self.id,
            handler: self.handler.clone(),
            pool: self.pool.clone(),
            stats: self.stats.clone(),
            state: self.state.clone(),
            job_tx: self.job_tx.clone(),
            job_rx,
            stop_rx,
        };

        self.state.enter(WorkerState::Idle);
        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || futures::executor::block_on(service.run()))
            .map_err(|source| {
                self.state.set(WorkerState::Stopped);
                DispatchError::Spawn {
                    name: self.thread_name.clone(),
                    source,
                }
            })?;
        *lock(&self.thread_handle) = Some(handle);
        Ok(())
    }

    /// Requests the loop to exit.
    ///
    /// A handler call in progress runs to completion, and a job that was
    /// already handed to this worker is still executed. Stopping a worker
    /// that was never started just marks it as stopped.
    ///
    /// An idle worker's channel stays in its [`WorkerPool`] after the stop.
    /// Hand-offs that acquire it find it closed and move on to the next idle
    /// worker. Dropping the last handle to a worker stops it as well.
    pub fn stop(&self) {
        if lock(&self.receivers).take().is_some() {
            self.state.set(WorkerState::Stopped);
        } else {
            self.state.begin_stopping();
        }
        self.stop_tx.close();
    }

    /// Blocks until the worker thread has exited. Returns immediately if the
    /// worker was never started or has already been joined.
    pub fn wait_until_finished(&self) {
        let handle = lock(&self.thread_handle).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Worker {} thread terminated abnormally", self.id);
                self.state.set(WorkerState::Stopped);
            }
        }
    }
}

impl<P: Send + 'static> std::fmt::Debug for Worker<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("handler", &self.handler.desc())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// State owned by the worker thread.
struct WorkerLoop<P> {
    id: usize,
    handler: Arc<dyn Handler<P>>,
    pool: WorkerPool<P>,
    stats: Arc<DispatchStats>,
    state: Arc<StateCell>,
    job_tx: JobSender<P>,
    job_rx: Receiver<Job<P>>,
    stop_rx: Receiver<()>,
}

impl<P: Send + 'static> WorkerLoop<P> {
    async fn run(self) {
        debug!("Worker {} started", self.id);
        loop {
            if self.stop_rx.is_closed() {
                break;
            }
            self.state.enter(WorkerState::Idle);

            // the stop signal is never sent, only closed; recv() resolves on close
            let published = select_biased! {
                _ = self.stop_rx.recv().fuse() => false,
                res = self.pool.publish(self.job_tx.clone()).fuse() => res.is_ok(),
            };
            if !published {
                break;
            }

            let next = select_biased! {
                job = self.job_rx.recv().fuse() => job.ok(),
                _ = self.stop_rx.recv().fuse() => None,
            };
            match next {
                Some(job) => self.run_job(job),
                None => break,
            }
        }

        // Refuse further hand-offs, then finish what has already arrived.
        self.job_rx.close();
        while let Ok(job) = self.job_rx.try_recv() {
            self.run_job(job);
        }
        self.state.set(WorkerState::Stopped);
        debug!("Worker {} stopped", self.id);
    }

    fn run_job(&self, job: Job<P>) {
        self.state.enter(WorkerState::Busy);
        let handler = &self.handler;
        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(job))) {
            Ok(()) => self.stats.job_handled(),
            Err(panic) => {
                self.stats.job_panicked();
                warn!(
                    "Worker {}: handler '{}' panicked: {}",
                    self.id,
                    handler.desc(),
                    panic_message(panic.as_ref())
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
