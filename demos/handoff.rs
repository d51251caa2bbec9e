//! Runs a single handoff driven by `HANDOFF_*` environment variables.
//!
//! ```text
//! RUST_LOG=shared_handoff=debug HANDOFF_BUFFER_SIZE=5 HANDOFF_ITERATIONS=1 \
//!     cargo run --example handoff
//! ```

use shared_handoff::{Controller, Engine, RunConfig, control_channel, spawn_engine};
use tracing_subscriber::EnvFilter;

fn main() -> shared_handoff::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = RunConfig::from_env()?;
    println!(
        "buffer_size = {}, iterations = {}, poll every {:?}",
        config.buffer_size, config.iterations, config.poll_interval
    );

    let (controller_end, engine_end) = control_channel();
    let engine = spawn_engine(Engine::new(config.progress_checkpoints), engine_end)?;

    let mut controller = Controller::new(controller_end, config.clone())
        .with_progress_observer(|percent| println!("progress: {percent}%"));
    let region = controller.allocate(config.buffer_size)?;
    println!("allocated {} bytes", region.byte_len());

    controller.start(config.iterations)?;
    let completion = controller.await_completion()?;

    let preview: Vec<_> = completion.values.iter().take(8).collect();
    println!(
        "completed via {:?} after {:?}: {:?}{}",
        completion.source,
        completion.elapsed,
        preview,
        if completion.values.len() > preview.len() { " ..." } else { "" }
    );

    drop(controller);
    engine.join();
    Ok(())
}
