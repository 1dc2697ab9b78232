//! # cmdprof - Main Entry Point
//!
//! Runs one subcommand between the profiling hooks:
//! - `burn`: CPU spin plus allocation churn inside traced spans
//! - `serve`: idle loop that keeps the debug endpoint reachable

use anyhow::{Context, Result};
use clap::Parser;
use cmdprof::cli::{Args, Command};
use cmdprof::debug::registry;
use cmdprof::profiling::TrackingAllocator;
use cmdprof::{ProfilingConfig, ProfilingSession};
use log::info;
use std::alloc::System;
use std::hint::black_box;
use std::time::{Duration, Instant};

#[global_allocator]
static ALLOC: TrackingAllocator<System> = TrackingAllocator::new(System);

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config = ProfilingConfig::from(&args.profile);
    let mut session = ProfilingSession::new(config);

    session.run(|| match args.command {
        Command::Burn { millis, rounds } => burn(Duration::from_millis(millis), rounds),
        Command::Serve { seconds } => serve(seconds),
    })
}

/// Keep one core busy and churn the heap so every profile has something in it
fn burn(duration: Duration, rounds: usize) -> Result<()> {
    let iterations = registry().new_int("burn_iterations").context("publishing burn counters")?;
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    let _span = tracing::info_span!("burn", millis).entered();

    let mut retained: Vec<Vec<u8>> = Vec::with_capacity(rounds);
    for round in 0..rounds {
        let _round = tracing::debug_span!("allocate", round).entered();
        retained.push(vec![0u8; 64 << (round % 12)]);
    }

    let started = Instant::now();
    let mut acc = 0u64;
    while started.elapsed() < duration {
        let _spin = tracing::trace_span!("spin").entered();
        for i in 0..10_000u64 {
            acc = black_box(acc.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(i));
        }
        iterations.add(1);
    }
    tracing::info!(iterations = iterations.value(), "burn finished");

    info!(
        "burned {:.1}s, retained {} buffers, checksum {acc:x}",
        started.elapsed().as_secs_f64(),
        retained.len()
    );
    Ok(())
}

fn serve(seconds: u64) -> Result<()> {
    let started = Instant::now();
    let limit = (seconds > 0).then(|| Duration::from_secs(seconds));
    info!("serving until {}", limit.map_or("interrupted".to_string(), |l| format!("{}s", l.as_secs())));
    loop {
        if limit.is_some_and(|l| started.elapsed() >= l) {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}
