use std::time::{Duration, Instant};

use rayon::prelude::*;
use shared_handoff::{Completion, CompletionSource, RunConfig, run};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct SweepResult {
    buffer_size: usize,
    iterations: u64,
    completion: shared_handoff::Result<Completion>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Parallel handoff sweep with Rayon");
    println!("=================================\n");

    // Configuration
    const BUFFER_SIZES: [usize; 4] = [0, 1_000, 50_000, 250_000];
    const ITERATION_COUNTS: [u64; 3] = [1, 10, 40];
    const POLL_INTERVAL: Duration = Duration::from_millis(5);

    let runs: Vec<(usize, u64)> = BUFFER_SIZES
        .iter()
        .flat_map(|&size| ITERATION_COUNTS.iter().map(move |&iters| (size, iters)))
        .collect();

    println!("Configuration:");
    println!("  Buffer sizes: {:?}", BUFFER_SIZES);
    println!("  Iteration counts: {:?}", ITERATION_COUNTS);
    println!("  Independent runs: {}\n", runs.len());

    let start_time = Instant::now();

    // Every run owns its region, controller and engine thread
    let results: Vec<SweepResult> = runs
        .into_par_iter()
        .map(|(buffer_size, iterations)| {
            let config =
                RunConfig::new(buffer_size, iterations).with_poll_interval(POLL_INTERVAL);
            SweepResult {
                buffer_size,
                iterations,
                completion: run(&config),
            }
        })
        .collect();

    let total_duration = start_time.elapsed();

    println!("Results:");
    println!("========");
    let mut failures = 0;
    for result in &results {
        match &result.completion {
            Ok(completion) => {
                let last = completion.values.last().copied().unwrap_or_default();
                let expected = if result.buffer_size == 0 {
                    0.0
                } else {
                    ((result.buffer_size - 1) as f64 * (result.iterations - 1) as f64).sqrt()
                };
                let source = match completion.source {
                    CompletionSource::PushMessage => "push",
                    CompletionSource::PollTick => "poll",
                };
                println!(
                    "  size {:>7} x {:>3} passes: last = {:>10.3} (expected {:>10.3}) via {} in {:?}",
                    result.buffer_size,
                    result.iterations,
                    last,
                    expected,
                    source,
                    completion.elapsed
                );
                if last != expected {
                    failures += 1;
                }
            }
            Err(err) => {
                println!(
                    "  size {:>7} x {:>3} passes: failed: {}",
                    result.buffer_size, result.iterations, err
                );
                failures += 1;
            }
        }
    }

    println!("\nTotal execution time: {:?}", total_duration);

    if failures == 0 {
        println!("All {} runs completed with the expected payload", results.len());
    } else {
        println!("{} of {} runs did not match", failures, results.len());
    }
}
