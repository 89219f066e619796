// SPDX-License-Identifier: MIT
// jobpool: fixed-size worker pool for fire-and-forget jobs
//
// - Producers put jobs into a queue.
// - A dispatcher hands every job to exactly one idle worker.
//
// Author: Johannes Leupolz <dev@leupolz.eu>

pub mod config;
pub mod error;
pub mod job_engine;

pub use config::DispatcherConfig;
pub use error::DispatchError;
pub use job_engine::dispatcher::Dispatcher;
pub use job_engine::handler::{handler_fn, FnHandler, Handler};
pub use job_engine::job::Job;
pub use job_engine::stats::StatsSnapshot;
pub use job_engine::worker::{Worker, WorkerState};
pub use job_engine::worker_pool::WorkerPool;
