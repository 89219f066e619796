// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

/// Errors surfaced by the dispatcher API.
///
/// Failures of individual jobs never show up here; they are contained by
/// the worker that ran the job.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("worker count must be positive, got {0}")]
    InvalidWorkerCount(usize),

    #[error("queue capacity must be positive when the queue is bounded")]
    InvalidQueueCapacity,

    #[error("hand-off limit must be positive when hand-offs are bounded")]
    InvalidHandoffLimit,

    #[error("dispatcher is already running")]
    AlreadyRunning,

    #[error("dispatcher has been stopped")]
    Stopped,

    #[error("worker {0} has already been started")]
    WorkerAlreadyStarted(usize),

    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),
}
