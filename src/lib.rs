//! # SharedHandoff - One-Shot Shared-Memory Handoff Between Two Threads
//!
//! A controller thread and a worker thread coordinate through a single shared
//! memory region and one atomic flag instead of copying data through messages.
//! The controller allocates the region and lends it to the engine, the engine
//! fills the payload in place and publishes completion, and the controller
//! reads the final values straight out of the region.
//!
//! ## Key Features
//!
//! - **Zero-Copy**: Only a reference to the region crosses the control channel
//! - **Single Sync Word**: One `AtomicU32` is the only inter-thread primitive
//! - **Dual Completion Signal**: Poll ticks and a push message feed one idempotent handler
//! - **Typed Access**: Payload reads require proof that the flag was observed as done
//!
//! ## Usage Pattern
//!
//! ```rust,no_run
//! use shared_handoff::{Controller, Engine, RunConfig, control_channel, spawn_engine};
//!
//! let config = RunConfig::new(1_000, 50);
//! let (controller_end, engine_end) = control_channel();
//!
//! // The engine runs on its own thread and serves start requests
//! let engine = spawn_engine(Engine::new(config.progress_checkpoints), engine_end).unwrap();
//!
//! let mut controller = Controller::new(controller_end, config.clone())
//!     .with_progress_observer(|percent| println!("progress: {percent}%"));
//!
//! // Allocate, lend to the engine, and wait for either completion signal
//! controller.allocate(config.buffer_size).unwrap();
//! controller.start(config.iterations).unwrap();
//! let completion = controller.await_completion().unwrap();
//! println!("{} values via {:?}", completion.values.len(), completion.source);
//!
//! // Dropping the controller closes the channel and lets the engine exit
//! drop(controller);
//! engine.join();
//! ```
//!
//! ## Region Layout
//!
//! ```text
//! | f64 payload × buffer_size | u32 sync word |   total = buffer_size * 8 + 4
//! ```
//!
//! ## Thread Safety
//!
//! - The engine is the only writer of the payload and the only thread that
//!   moves the sync word from 0 to 1
//! - The sync word is stored with `Release` and loaded with `Acquire`
//! - The controller reads the payload only after observing the sync word as 1


pub mod channel;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod layout;
pub mod message;
pub mod progress;
pub mod region;
#[cfg(feature = "profiler")]
pub mod timer;
mod wait;

pub use channel::{ControllerEnd, EngineEnd, control_channel};
pub use config::RunConfig;
pub use controller::{Completion, CompletionSource, Controller, ControllerEvent, RunState};
pub use engine::{Engine, EngineThread, StartRequest, spawn_engine};
pub use error::{HandoffError, Result, StartRejected};
pub use layout::{DONE, NOT_DONE, RegionLayout};
pub use message::{ControlMessage, Envelope};
pub use progress::ProgressTracker;
pub use region::{CompletedPayload, RegionHandle, SharedRegion};

#[cfg(feature = "profiler")]
pub use timer::{RunTimer, TimingStats};

/// Performs one complete run: spawns an engine, allocates a region, starts the
/// computation and waits for completion.
///
/// The engine thread is joined before returning, except on timeout, where it
/// is left to finish (or be abandoned) on its own.
pub fn run(config: &RunConfig) -> Result<Completion> {
    config.validate()?;

    let (controller_end, engine_end) = control_channel();
    let engine = Engine::new(config.progress_checkpoints);
    let controller = Controller::new(controller_end, config.clone());

    #[cfg(feature = "profiler")]
    let (engine, controller) = {
        let timer = RunTimer::new();
        (engine.with_timer(timer.clone()), controller.with_timer(timer))
    };

    let engine_thread = spawn_engine(engine, engine_end)?;
    let mut controller = controller;

    controller.allocate(config.buffer_size)?;
    controller.start(config.iterations)?;
    let completion = controller.await_completion()?;

    #[cfg(feature = "profiler")]
    if let Some(stats) = controller.timing_stats() {
        stats.plot();
    }

    drop(controller);
    engine_thread.join();
    Ok(completion)
}
