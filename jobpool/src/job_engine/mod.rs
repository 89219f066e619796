// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! # Design: Bounded Worker-Pool Dispatcher
//!
//! ## Overview
//! A fixed number of workers, each on its own thread, execute one shared
//! handler for every job that producers put into the job queue.
//!
//! - Producers write jobs into the job queue (bounded or unbounded).
//! - The dispatch loop takes a job and spawns a hand-off task for it, then
//!   immediately goes back to the queue.
//! - A hand-off task waits for an idle worker in the worker pool and passes
//!   the job into that worker's channel.
//! - An idle worker advertises its channel in the worker pool, runs exactly
//!   one job, and advertises itself again.
//! - A panicking handler only costs its job; the worker keeps running.
//!
//! ## Backpressure
//! The worker pool is the only place where jobs wait for workers. When all
//! workers are busy, hand-off tasks pile up until `max_pending_handoffs` is
//! reached; then the dispatch loop stops reading and the queue fills up, and
//! finally producers block (bounded queue).
//!
//! ```text
//!         +-----------+     +----------------+
//!         | producers | --> |   job queue    |
//!         +-----------+     +-------+--------+
//!                                   |
//!                                   v
//!                          +--------+--------+      +-------------+
//!                          |  dispatch loop  | ---> |  hand-offs  |
//!                          +-----------------+      +------+------+
//!                                                          |
//!                                      acquire idle worker | (worker pool)
//!                                                          v
//!                                 +----------+  +----------+  +----------+
//!                                 | worker 0 |  | worker 1 |  | worker n |
//!                                 | handle() |  | handle() |  | handle() |
//!                                 +----------+  +----------+  +----------+
//! ```

pub mod dispatcher;
pub mod handler;
pub mod job;
pub mod stats;
pub mod worker;
pub mod worker_pool;
