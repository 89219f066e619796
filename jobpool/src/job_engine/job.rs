// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

/// A unit of work: one opaque payload supplied by the producer.
///
/// Jobs carry no identity and no ordering relative to each other. A job is
/// read exactly once by the worker it is handed to and then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job<P> {
    payload: P,
}

impl<P> Job<P> {
    pub fn new(payload: P) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }
}

impl<P> From<P> for Job<P> {
    fn from(payload: P) -> Self {
        Job::new(payload)
    }
}
