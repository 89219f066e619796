// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use jobpool::{handler_fn, DispatchError, Dispatcher, DispatcherConfig, FnHandler, Job};
use jobpool_tests::handlers::{ConcurrencyProbe, ProbingHandler, RecordingHandler, TimedHandler};
use jobpool_tests::{init_logging, recv_n, recv_pending, recv_timeout, wait_until, TIMEOUT};

fn config(workers: usize) -> DispatcherConfig {
    DispatcherConfig {
        thread_name: "scenario".to_string(),
        ..DispatcherConfig::with_workers(workers)
    }
}

#[test]
fn test_every_job_handled_exactly_once() {
    init_logging();
    let (handler, done) = RecordingHandler::new();
    let mut dispatcher = Dispatcher::new(config(4), handler).unwrap();
    dispatcher.run().unwrap();
    let queue = dispatcher.job_queue().unwrap();

    for n in 1..=200 {
        queue.send_blocking(Job::new(n)).unwrap();
    }
    let mut handled = recv_n(&done, 200);
    dispatcher.stop();
    dispatcher.wait_until_finished();

    assert!(recv_pending(&done).is_empty(), "a job was handled twice");
    handled.sort();
    assert_eq!(handled, (1..=200).collect::<Vec<_>>());
    let stats = dispatcher.stats();
    assert_eq!(stats.received, 200);
    assert_eq!(stats.dispatched, 200);
    assert_eq!(stats.handled, 200);
}

#[test]
fn test_concurrency_never_exceeds_worker_count() {
    init_logging();
    const WORKERS: usize = 3;
    let probe = Arc::new(ConcurrencyProbe::default());
    let (done_tx, done) = async_channel::unbounded();
    let handler = ProbingHandler {
        probe: probe.clone(),
        limit: WORKERS,
        work: Duration::from_millis(5),
        done: done_tx,
    };
    let mut dispatcher = Dispatcher::new(config(WORKERS), handler).unwrap();
    dispatcher.run().unwrap();
    let queue = dispatcher.job_queue().unwrap();

    for n in 0..60 {
        queue.send_blocking(Job::new(n)).unwrap();
    }
    recv_n(&done, 60);
    dispatcher.drain().unwrap();

    assert_eq!(probe.violations(), 0);
    assert!(probe.max() >= 1 && probe.max() <= WORKERS);
}

#[test]
fn test_scenario_a_five_workers_ten_jobs() {
    init_logging();
    let (handler, done) = RecordingHandler::new();
    let mut dispatcher = Dispatcher::new(config(5), handler).unwrap();
    dispatcher.run().unwrap();
    let queue = dispatcher.job_queue().unwrap();

    for n in 1..=10 {
        queue.send_blocking(Job::new(n)).unwrap();
    }
    drop(queue);
    dispatcher.drain().unwrap();

    let handled: Vec<u32> = recv_pending(&done);
    assert_eq!(handled.len(), 10);
    assert_eq!(
        handled.into_iter().collect::<BTreeSet<_>>(),
        (1..=10).collect::<BTreeSet<_>>()
    );
}

#[test]
fn test_scenario_b_single_worker_serializes_jobs() {
    init_logging();
    let (spans_tx, spans) = async_channel::unbounded();
    let handler = TimedHandler {
        durations: vec![(1, Duration::from_millis(100))],
        spans: spans_tx,
    };
    let mut dispatcher = Dispatcher::new(config(1), handler).unwrap();
    dispatcher.run().unwrap();
    let queue = dispatcher.job_queue().unwrap();

    queue.send_blocking(Job::new(1)).unwrap();
    queue.send_blocking(Job::new(2)).unwrap();
    let ran = recv_n(&spans, 2);
    dispatcher.drain().unwrap();

    assert!(!ran[0].overlaps(&ran[1]));
    assert!(ran[0].end <= ran[1].start);
    let slow = ran.iter().find(|span| span.payload == 1).unwrap();
    assert!(slow.end - slow.start >= Duration::from_millis(100));
}

#[test]
fn test_scenario_c_panic_is_contained() {
    init_logging();
    let (done_tx, done) = async_channel::unbounded();
    let handler = FnHandler::new("panics on 1", move |job: Job<u32>| {
        let n = job.into_payload();
        if n == 1 {
            panic!("job {n} failed on purpose");
        }
        done_tx.send_blocking(n).unwrap();
    });
    let mut dispatcher = Dispatcher::new(config(2), handler).unwrap();
    dispatcher.run().unwrap();
    let queue = dispatcher.job_queue().unwrap();

    queue.send_blocking(Job::new(1)).unwrap();
    queue.send_blocking(Job::new(2)).unwrap();
    assert_eq!(recv_timeout(&done, TIMEOUT), Some(2));

    // still responsive after the panic
    queue.send_blocking(Job::new(3)).unwrap();
    assert_eq!(recv_timeout(&done, TIMEOUT), Some(3));

    dispatcher.drain().unwrap();
    let stats = dispatcher.stats();
    assert_eq!(stats.panicked, 1);
    assert_eq!(stats.handled, 2);
}

#[test]
fn test_panics_do_not_shrink_the_pool() {
    init_logging();
    let (done_tx, done) = async_channel::unbounded();
    let handler = handler_fn(move |job: Job<u32>| {
        let n = job.into_payload();
        if n % 2 == 0 {
            panic!("even job {n}");
        }
        done_tx.send_blocking(n).unwrap();
    });
    let mut dispatcher = Dispatcher::new(config(2), handler).unwrap();
    dispatcher.run().unwrap();
    let queue = dispatcher.job_queue().unwrap();

    for n in 0..20 {
        queue.send_blocking(Job::new(n)).unwrap();
    }
    let mut odd = recv_n(&done, 10);
    odd.sort();
    assert_eq!(odd, (0..20).filter(|n| n % 2 == 1).collect::<Vec<_>>());

    dispatcher.drain().unwrap();
    let stats = dispatcher.stats();
    assert_eq!(stats.panicked, 10);
    assert_eq!(stats.handled, 10);
}

#[test]
fn test_stop_lets_running_job_finish_and_abandons_the_rest() {
    init_logging();
    let (started_tx, started) = async_channel::unbounded();
    let (gate_tx, gate) = async_channel::bounded::<()>(1);
    let (done_tx, done) = async_channel::unbounded();
    let handler = FnHandler::new("gated", move |job: Job<u32>| {
        let n = job.into_payload();
        started_tx.send_blocking(n).unwrap();
        if n == 1 {
            gate.recv_blocking().unwrap();
        }
        done_tx.send_blocking(n).unwrap();
    });
    let mut dispatcher = Dispatcher::new(config(1), handler).unwrap();
    dispatcher.run().unwrap();
    let queue = dispatcher.job_queue().unwrap();

    queue.send_blocking(Job::new(1)).unwrap();
    assert_eq!(recv_timeout(&started, TIMEOUT), Some(1));
    for n in 2..=5 {
        queue.send_blocking(Job::new(n)).unwrap();
    }

    dispatcher.stop();
    gate_tx.send_blocking(()).unwrap();
    dispatcher.wait_until_finished();

    assert_eq!(recv_pending(&done), vec![1]);
    let stats = dispatcher.stats();
    assert_eq!(stats.handled, 1);
    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.received - stats.dispatched, stats.abandoned);
    assert!(dispatcher.job_queue().is_none());
}

#[test]
fn test_stop_releases_producer_blocked_on_full_queue() {
    init_logging();
    let (started_tx, started) = async_channel::unbounded();
    let (gate_tx, gate) = async_channel::bounded::<()>(1);
    let (done_tx, done) = async_channel::unbounded();
    let handler = FnHandler::new("gated", move |job: Job<u32>| {
        let n = job.into_payload();
        started_tx.send_blocking(n).unwrap();
        if n == 1 {
            gate.recv_blocking().unwrap();
        }
        done_tx.send_blocking(n).unwrap();
    });
    let config = DispatcherConfig {
        queue_capacity: Some(1),
        max_pending_handoffs: Some(1),
        ..config(1)
    };
    let mut dispatcher = Dispatcher::new(config, handler).unwrap();
    dispatcher.run().unwrap();
    let queue = dispatcher.job_queue().unwrap();

    // 1 runs, 2 waits for the worker, 3 waits for a hand-off slot
    queue.send_blocking(Job::new(1)).unwrap();
    assert_eq!(recv_timeout(&started, TIMEOUT), Some(1));
    queue.send_blocking(Job::new(2)).unwrap();
    queue.send_blocking(Job::new(3)).unwrap();
    assert!(wait_until(TIMEOUT, || dispatcher.stats().received == 3));
    // 4 fills the queue
    queue.send_blocking(Job::new(4)).unwrap();

    let (sent_tx, sent) = async_channel::bounded(1);
    let producer = std::thread::spawn(move || {
        let result = queue.send_blocking(Job::new(5));
        sent_tx.send_blocking(result.is_ok()).unwrap();
    });
    assert_eq!(recv_timeout(&sent, Duration::from_millis(100)), None);

    dispatcher.stop();
    assert_eq!(recv_timeout(&sent, TIMEOUT), Some(false));
    producer.join().unwrap();

    gate_tx.send_blocking(()).unwrap();
    dispatcher.wait_until_finished();
    assert_eq!(recv_pending(&done), vec![1]);
}

#[test]
fn test_dropping_running_dispatcher_stops_workers() {
    init_logging();
    let (handler, done) = RecordingHandler::new();
    let mut dispatcher = Dispatcher::new(config(2), handler).unwrap();
    dispatcher.run().unwrap();
    let queue = dispatcher.job_queue().unwrap();
    queue.send_blocking(Job::new(1)).unwrap();
    assert_eq!(recv_timeout(&done, TIMEOUT), Some(1));

    // the recording sender lives in the handler, which every worker thread shares
    drop(queue);
    drop(dispatcher);
    assert!(wait_until(TIMEOUT, || done.is_closed()));
}

#[test]
fn test_drain_handles_everything_queued() {
    init_logging();
    let (handler, done) = RecordingHandler::new();
    let config = DispatcherConfig {
        queue_capacity: None,
        max_pending_handoffs: Some(2),
        ..config(2)
    };
    let mut dispatcher = Dispatcher::new(config, handler).unwrap();
    let queue = dispatcher.job_queue().unwrap();

    // queued before the workers exist
    for n in 0..50 {
        queue.send_blocking(Job::new(n)).unwrap();
    }
    dispatcher.run().unwrap();
    dispatcher.drain().unwrap();

    assert_eq!(recv_pending(&done).len(), 50);
    assert_eq!(dispatcher.stats().abandoned, 0);
    assert!(queue.send_blocking(Job::new(50)).is_err());
}

#[test]
fn test_producers_closing_their_queue_ends_dispatching() {
    init_logging();
    let (producer, rx) = async_channel::bounded(8);
    let (handler, done) = RecordingHandler::new();
    let mut dispatcher = Dispatcher::with_queue(config(2), rx, handler).unwrap();
    dispatcher.run().unwrap();

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let producer = producer.clone();
            std::thread::spawn(move || {
                for n in 0..25 {
                    producer.send_blocking(Job::new(p * 100 + n)).unwrap();
                }
            })
        })
        .collect();
    drop(producer);
    for handle in producers {
        handle.join().unwrap();
    }

    // returns once the closed queue is empty and all jobs reached a worker
    dispatcher.wait_until_finished();
    let handled = recv_pending(&done);
    assert_eq!(handled.len(), 100);
    assert_eq!(handled.into_iter().collect::<BTreeSet<_>>().len(), 100);
}

#[test]
fn test_invalid_configuration_fails_fast() {
    let (handler, _done) = RecordingHandler::new();
    assert!(matches!(
        Dispatcher::new(config(0), handler),
        Err(DispatchError::InvalidWorkerCount(0))
    ));

    let (_tx, rx) = async_channel::unbounded();
    let (handler, _done) = RecordingHandler::new();
    let config = DispatcherConfig {
        max_pending_handoffs: Some(0),
        ..config(1)
    };
    assert!(matches!(
        Dispatcher::with_queue(config, rx, handler),
        Err(DispatchError::InvalidHandoffLimit)
    ));
}
