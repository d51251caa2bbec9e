use std::time::{Duration, Instant};

use shared_handoff::{CompletionSource, RunConfig, run};
use tracing_subscriber::EnvFilter;

// Benchmark configuration
const BUFFER_SIZES: [usize; 4] = [1_000, 10_000, 100_000, 1_000_000];
const ITERATIONS: u64 = 20;
const NUM_ROUNDS: usize = 5;
const POLL_INTERVAL: Duration = Duration::from_millis(1);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("SharedHandoff Benchmark Results");
    println!("===============================");
    println!("Iterations per run: {}", ITERATIONS);
    println!("Rounds per size: {}", NUM_ROUNDS);
    println!("Poll interval: {:?}", POLL_INTERVAL);
    println!();
    println!(
        "{:<12} {:<14} {:<14} {:<10} {:<10}",
        "Buffer", "Avg run", "Min run", "Push", "Poll"
    );
    println!("{}", "-".repeat(64));

    let total_start = Instant::now();

    for buffer_size in BUFFER_SIZES {
        let config = RunConfig::new(buffer_size, ITERATIONS).with_poll_interval(POLL_INTERVAL);

        let mut total = Duration::ZERO;
        let mut min = Duration::MAX;
        let mut by_push = 0;
        let mut by_poll = 0;

        for _round in 0..NUM_ROUNDS {
            let start = Instant::now();
            let completion = match run(&config) {
                Ok(completion) => completion,
                Err(err) => {
                    eprintln!("run with buffer_size {} failed: {}", buffer_size, err);
                    return;
                }
            };
            let elapsed = start.elapsed();

            assert_eq!(completion.values.len(), buffer_size);
            total += elapsed;
            min = min.min(elapsed);
            match completion.source {
                CompletionSource::PushMessage => by_push += 1,
                CompletionSource::PollTick => by_poll += 1,
            }
        }

        println!(
            "{:<12} {:<14} {:<14} {:<10} {:<10}",
            buffer_size,
            format!("{:.3}ms", total.as_secs_f64() * 1000.0 / NUM_ROUNDS as f64),
            format!("{:.3}ms", min.as_secs_f64() * 1000.0),
            by_push,
            by_poll
        );
    }

    println!("\nTotal execution time: {:?}", total_start.elapsed());

    // With the profiler feature each run prints its own timing table
    #[cfg(not(feature = "profiler"))]
    println!("Enable the 'profiler' feature for per-run timing breakdowns");

    println!("\nBenchmark completed successfully!");
}
