// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

pub mod handlers;

use std::time::{Duration, Instant};

use async_channel::Receiver;
use async_io::Timer;
use futures::{select, FutureExt};

/// Generous upper bound for anything the scenarios wait for.
pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Receives one message, or `None` if nothing arrives within `timeout`.
pub fn recv_timeout<T>(rx: &Receiver<T>, timeout: Duration) -> Option<T> {
    futures::executor::block_on(async {
        select! {
            msg = rx.recv().fuse() => msg.ok(),
            _ = Timer::after(timeout).fuse() => None,
        }
    })
}

/// Receives exactly `n` messages, failing the test if any of them is late.
pub fn recv_n<T>(rx: &Receiver<T>, n: usize) -> Vec<T> {
    (0..n)
        .map(|i| {
            recv_timeout(rx, TIMEOUT)
                .unwrap_or_else(|| panic!("only {i} of {n} messages arrived within {TIMEOUT:?}"))
        })
        .collect()
}

/// Everything that is immediately available.
pub fn recv_pending<T>(rx: &Receiver<T>) -> Vec<T> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

/// Polls `cond` until it holds or `timeout` has passed.
pub fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
