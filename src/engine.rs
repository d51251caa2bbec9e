//! Worker-side computation engine.
//!
//! The engine validates a `compute-shared` envelope, claims the attached
//! region, overwrites the payload once per pass and then publishes completion
//! twice: a `Release` store of `DONE` plus a wake on the sync word, followed by
//! a `shared-complete` message.

use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};

use crate::{
    channel::EngineEnd,
    error::StartRejected,
    message::{COMPUTE_SHARED, ControlMessage, Envelope},
    region::RegionHandle,
};

#[cfg(feature = "profiler")]
use crate::timer::RunTimer;

/// Name given to the engine's OS thread.
pub const ENGINE_THREAD_NAME: &str = "handoff-engine";

/// A start request that passed validation. Only [`StartRequest::from_envelope`]
/// builds one, so `buffer_size` never exceeds the region's capacity.
#[derive(Debug, Clone)]
pub struct StartRequest {
    region: RegionHandle,
    buffer_size: usize,
    iterations: u64,
}

impl StartRequest {
    /// Checks that `envelope` is a well-formed `compute-shared` request whose
    /// sizes fit the attached region.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, StartRejected> {
        let Envelope { body, region } = envelope;
        let region = region.ok_or(StartRejected::MissingRegion)?;

        match body.get("type").and_then(serde_json::Value::as_str) {
            Some(COMPUTE_SHARED) => {}
            Some(other) => return Err(StartRejected::UnexpectedTag(other.to_string())),
            None => return Err(StartRejected::UnexpectedTag(String::new())),
        }

        let (buffer_size, iterations) = match ControlMessage::from_json(body) {
            Ok(ControlMessage::ComputeShared {
                buffer_size,
                iterations,
            }) => (buffer_size, iterations),
            Ok(other) => return Err(StartRejected::UnexpectedTag(other.tag().to_string())),
            Err(err) => return Err(StartRejected::MalformedBody(err.to_string())),
        };

        if iterations == 0 {
            return Err(StartRejected::ZeroIterations);
        }

        let capacity = region.buffer_size();
        let buffer_size = usize::try_from(buffer_size)
            .ok()
            .filter(|&size| size <= capacity)
            .ok_or(StartRejected::ExceedsCapacity {
                buffer_size,
                capacity,
            })?;

        Ok(StartRequest {
            region,
            buffer_size,
            iterations,
        })
    }

    #[inline]
    pub fn region(&self) -> &RegionHandle {
        &self.region
    }

    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    #[inline]
    pub fn iterations(&self) -> u64 {
        self.iterations
    }
}

/// Writes pass `iter` of the workload: `payload[i] = sqrt(i * iter)`.
#[inline]
pub fn compute_pass(payload: &mut [f64], iter: u64) {
    let iter = iter as f64;
    for (i, value) in payload.iter_mut().enumerate() {
        *value = (i as f64 * iter).sqrt();
    }
}

/// Passes after which a progress message is sent, as `(pass_index, percent)`.
///
/// At most `checkpoints` entries, non-decreasing, ending with 100 when
/// `checkpoints > 0`.
pub fn progress_schedule(iterations: u64, checkpoints: u32) -> impl Iterator<Item = (u64, u8)> {
    let checkpoints = u64::from(checkpoints).min(iterations);
    let stride = if checkpoints == 0 {
        0
    } else {
        iterations.div_ceil(checkpoints)
    };
    (0..iterations)
        .filter(move |&iter| stride != 0 && ((iter + 1) % stride == 0 || iter + 1 == iterations))
        .map(move |iter| (iter, percent_after(iter, iterations)))
}

#[inline]
fn percent_after(iter: u64, iterations: u64) -> u8 {
    ((u128::from(iter) + 1) * 100 / u128::from(iterations)) as u8
}

/// The worker side of a handoff.
///
/// An engine serves `compute-shared` envelopes: it claims the attached region,
/// runs every pass over the payload, reports up to `progress_checkpoints`
/// percentages and then publishes completion through the sync word and a
/// `shared-complete` message.
///
/// ## Usage
///
/// ```rust,no_run
/// use shared_handoff::{Engine, Envelope, SharedRegion, control_channel};
///
/// let (controller_end, engine_end) = control_channel();
/// let region = SharedRegion::allocate(4).unwrap();
///
/// // Run one request inline instead of on the engine thread
/// Engine::new(2)
///     .on_start(Envelope::compute_shared(region.clone(), 3), &engine_end)
///     .unwrap();
///
/// assert!(region.is_done());
/// assert_eq!(controller_end.events().try_iter().count(), 3); // 2 progress + shared-complete
/// ```
#[derive(Debug, Clone)]
pub struct Engine {
    progress_checkpoints: u32,

    #[cfg(feature = "profiler")]
    timer: Option<RunTimer>,
}

impl Engine {
    pub fn new(progress_checkpoints: u32) -> Self {
        Self {
            progress_checkpoints,
            #[cfg(feature = "profiler")]
            timer: None,
        }
    }

    #[cfg(feature = "profiler")]
    pub fn with_timer(self, timer: RunTimer) -> Self {
        Self {
            timer: Some(timer),
            ..self
        }
    }

    /// Handles one inbound envelope.
    ///
    /// A rejected request leaves the region untouched and sends nothing back,
    /// so the controller keeps waiting until its own timeout, if any.
    pub fn on_start(&self, envelope: Envelope, channel: &EngineEnd) -> Result<(), StartRejected> {
        let request = StartRequest::from_envelope(envelope)?;
        self.compute(&request, channel)
    }

    /// Runs every pass over the request's region, then publishes completion.
    fn compute(&self, request: &StartRequest, channel: &EngineEnd) -> Result<(), StartRejected> {
        let mut writer = request.region.lend().ok_or(StartRejected::AlreadyLent)?;
        debug!(
            buffer_size = request.buffer_size,
            iterations = request.iterations,
            "engine starting"
        );

        let mut checkpoints =
            progress_schedule(request.iterations, self.progress_checkpoints).peekable();
        let payload = &mut writer.payload_mut()[..request.buffer_size];

        for iter in 0..request.iterations {
            #[cfg(feature = "profiler")]
            if let Some(timer) = &self.timer {
                timer.start_pass();
            }

            compute_pass(payload, iter);

            #[cfg(feature = "profiler")]
            if let Some(timer) = &self.timer {
                timer.end_pass();
            }

            if let Some((_, percent)) = checkpoints.next_if(|&(at, _)| at == iter) {
                trace!(percent, "engine progress");
                channel.emit(ControlMessage::Progress { percent });
            }
        }

        #[cfg(feature = "profiler")]
        if let Some(timer) = &self.timer {
            timer.mark_published();
        }

        writer.publish();
        channel.emit(ControlMessage::SharedComplete {});
        debug!("engine published completion");
        Ok(())
    }

    /// Serves envelopes from `channel` until the controller end is dropped.
    pub fn serve(&self, channel: &EngineEnd) {
        for envelope in channel.requests().iter() {
            if let Err(rejected) = self.on_start(envelope, channel) {
                warn!(%rejected, "dropping compute-shared request");
            }
        }
    }
}

/// The engine's OS thread. Exits once the controller end of the channel is
/// dropped.
#[derive(Debug)]
pub struct EngineThread {
    handle: JoinHandle<()>,
}

impl EngineThread {
    /// Waits for the thread to exit, forwarding a panic if it had one.
    pub fn join(self) {
        if let Err(payload) = self.handle.join() {
            std::panic::resume_unwind(payload);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Spawns `engine` on a named thread serving `channel`.
pub fn spawn_engine(engine: Engine, channel: EngineEnd) -> std::io::Result<EngineThread> {
    let handle = thread::Builder::new()
        .name(ENGINE_THREAD_NAME.to_string())
        .spawn(move || {
            trace!("engine thread starting");
            engine.serve(&channel);
            trace!("engine thread exiting");
        })?;
    Ok(EngineThread { handle })
}
