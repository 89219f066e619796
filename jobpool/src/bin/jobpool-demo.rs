// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use jobpool::{Dispatcher, DispatcherConfig, FnHandler, Job};
use log::info;

#[derive(Debug, Parser)]
#[command(author, version, about = "Runs numbered jobs through a worker pool")]
struct Args {
    /// JSON file with a dispatcher configuration; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of workers
    #[arg(long)]
    workers: Option<usize>,

    /// Capacity of the job queue (0 means unbounded)
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Maximum number of jobs waiting for a worker (0 means unbounded)
    #[arg(long)]
    max_pending_handoffs: Option<usize>,

    /// Number of jobs to submit, numbered from 1
    #[arg(long, default_value_t = 10)]
    jobs: u64,

    /// Let every n-th job panic inside the handler
    #[arg(long, value_name = "N")]
    panic_every: Option<u64>,

    /// Time each job spends in the handler
    #[arg(long, value_name = "MS", default_value_t = 0)]
    sleep_ms: u64,

    /// Stop right after submitting instead of draining the queue
    #[arg(long)]
    stop_early: bool,
}

fn build_config(args: &Args) -> anyhow::Result<DispatcherConfig> {
    let mut config = match &args.config {
        Some(path) => DispatcherConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => DispatcherConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(capacity) = args.queue_capacity {
        config.queue_capacity = (capacity > 0).then_some(capacity);
    }
    if let Some(limit) = args.max_pending_handoffs {
        config.max_pending_handoffs = (limit > 0).then_some(limit);
    }
    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = build_config(&args)?;

    let panic_every = args.panic_every.filter(|n| *n > 0);
    let sleep = Duration::from_millis(args.sleep_ms);
    let handler = FnHandler::new("print job", move |job: Job<u64>| {
        let n = job.into_payload();
        if !sleep.is_zero() {
            std::thread::sleep(sleep);
        }
        if panic_every.is_some_and(|every| n % every == 0) {
            panic!("job {n} failed on purpose");
        }
        println!("{n}");
    });

    let mut dispatcher = Dispatcher::new(config, handler)?;
    dispatcher.run()?;
    let queue = dispatcher
        .job_queue()
        .context("dispatcher has no internal job queue")?;

    for n in 1..=args.jobs {
        queue
            .send_blocking(Job::new(n))
            .context("job queue closed unexpectedly")?;
    }
    drop(queue);
    info!("Submitted {} jobs", args.jobs);

    if args.stop_early {
        dispatcher.stop();
        dispatcher.wait_until_finished();
    } else {
        dispatcher.drain()?;
    }

    let stats = dispatcher.stats();
    info!("{} of {} jobs completed", stats.completed(), args.jobs);
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
