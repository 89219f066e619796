// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::num::NonZeroUsize;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Settings of a single dispatcher.
///
/// Loaded from JSON (missing fields fall back to [`Default`]) or built in
/// code. Validation happens when a dispatcher is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Number of workers, i.e. the maximum number of handlers running at once.
    pub workers: usize,
    /// Capacity of the internally created job queue. `None` means unbounded.
    /// Ignored when the caller supplies its own queue.
    pub queue_capacity: Option<usize>,
    /// Maximum number of jobs taken from the queue that are still waiting
    /// for an idle worker. `None` means unbounded.
    pub max_pending_handoffs: Option<usize>,
    /// Prefix for the names of the dispatch and worker threads.
    pub thread_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            queue_capacity: Some(128),
            max_pending_handoffs: Some(128),
            thread_name: "jobpool".to_string(),
        }
    }
}

impl DispatcherConfig {
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, DispatchError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.workers == 0 {
            return Err(DispatchError::InvalidWorkerCount(self.workers));
        }
        if self.queue_capacity == Some(0) {
            return Err(DispatchError::InvalidQueueCapacity);
        }
        if self.max_pending_handoffs == Some(0) {
            return Err(DispatchError::InvalidHandoffLimit);
        }
        Ok(())
    }
}
