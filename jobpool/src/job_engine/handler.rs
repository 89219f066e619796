// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use crate::job_engine::job::Job;

/// Caller-supplied logic invoked once per job.
///
/// A handler only performs side effects. Results, retries or dead-letter
/// handling belong to the handler itself, e.g. by writing into a channel it
/// owns. All workers of a dispatcher share one handler, hence `Sync`.
pub trait Handler<P>: Send + Sync + 'static {
    /// Free-form description, used for logging or debugging
    fn desc(&self) -> &str {
        "handler"
    }

    fn handle(&self, job: Job<P>);
}

impl<P: 'static> std::fmt::Debug for dyn Handler<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler").field("desc", &self.desc()).finish()
    }
}

/// Adapter that lets a plain function or closure act as a [`Handler`].
pub struct FnHandler<F> {
    desc: String,
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(desc: impl Into<String>, f: F) -> Self {
        Self {
            desc: desc.into(),
            f,
        }
    }
}

impl<P, F> Handler<P> for FnHandler<F>
where
    F: Fn(Job<P>) + Send + Sync + 'static,
{
    fn desc(&self) -> &str {
        &self.desc
    }

    fn handle(&self, job: Job<P>) {
        (self.f)(job)
    }
}

/// Wraps a closure into a [`Handler`] with a generic description.
pub fn handler_fn<P, F>(f: F) -> FnHandler<F>
where
    F: Fn(Job<P>) + Send + Sync + 'static,
{
    FnHandler::new("closure", f)
}
