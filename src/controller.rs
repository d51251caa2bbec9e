//! Producer-side controller.
//!
//! ## State machine
//!
//! ```text
//! Idle --allocate--> Allocated --start--> Running --observe DONE--> Completed
//! ```
//!
//! ## Completion detection
//!
//! Two independent sources feed [`Controller::handle_event`]:
//!
//! - **Poll ticks** every `poll_interval`: an `Acquire` load of the sync word.
//! - **Push**: the engine's `shared-complete` message.
//!
//! Both reduce to [`Controller::try_complete`], which reads the payload once,
//! records the result and turns every later call into a no-op that returns the
//! same result.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, after, never, select, tick};
use tracing::{debug, info, trace, warn};

use crate::{
    channel::ControllerEnd,
    config::RunConfig,
    error::{HandoffError, Result},
    message::{ControlMessage, Envelope},
    progress::ProgressTracker,
    region::{RegionHandle, SharedRegion},
};

#[cfg(feature = "profiler")]
use crate::timer::{RunTimer, TimingStats};

/// Lifecycle of one run. Transitions only move forward; a controller handles
/// a single region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Idle,
    Allocated,
    Running,
    Completed,
}

/// Which signal completed the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionSource {
    PollTick,
    PushMessage,
}

/// Something the controller reacts to while a run is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    PollTick,
    Message(ControlMessage),
}

/// The recorded outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Final payload values, read from the region after observing DONE.
    pub values: Vec<f64>,
    /// The signal that got there first.
    pub source: CompletionSource,
    /// Time from `start` to observed completion.
    pub elapsed: Duration,
}

type ProgressObserver = Box<dyn FnMut(u8) + Send>;

enum Step {
    Event(ControllerEvent),
    Disconnected,
    TimedOut,
}

/// The producer side of a handoff.
///
/// A controller owns the run's region until it lends it to the engine with
/// `start`, then watches for completion on two paths: poll ticks that load the
/// sync word, and the engine's `shared-complete` message. Whichever arrives
/// first completes the run; the other is a no-op.
///
/// ## Usage
///
/// ```rust,no_run
/// use shared_handoff::{Controller, Engine, RunConfig, control_channel, spawn_engine};
///
/// let config = RunConfig::new(16, 4);
/// let (controller_end, engine_end) = control_channel();
/// let engine = spawn_engine(Engine::new(config.progress_checkpoints), engine_end).unwrap();
///
/// let mut controller = Controller::new(controller_end, config);
/// controller.allocate(16).unwrap();
/// controller.start(4).unwrap();
///
/// let completion = controller.await_completion().unwrap();
/// assert_eq!(completion.values.len(), 16);
///
/// drop(controller);
/// engine.join();
/// ```
pub struct Controller {
    config: RunConfig,
    channel: ControllerEnd,
    state: RunState,
    region: Option<RegionHandle>,
    started_at: Option<Instant>,
    completion: Option<Completion>,
    progress: ProgressTracker,
    observer: Option<ProgressObserver>,

    #[cfg(feature = "profiler")]
    timer: Option<RunTimer>,
}

impl Controller {
    pub fn new(channel: ControllerEnd, config: RunConfig) -> Self {
        Self {
            config,
            channel,
            state: RunState::Idle,
            region: None,
            started_at: None,
            completion: None,
            progress: ProgressTracker::new(),
            observer: None,
            #[cfg(feature = "profiler")]
            timer: None,
        }
    }

    /// Calls `observer` with every percentage surfaced, ending with 100.
    pub fn with_progress_observer<F>(self, observer: F) -> Self
    where
        F: FnMut(u8) + Send + 'static,
    {
        Self {
            observer: Some(Box::new(observer)),
            ..self
        }
    }

    #[cfg(feature = "profiler")]
    pub fn with_timer(self, timer: RunTimer) -> Self {
        Self {
            timer: Some(timer),
            ..self
        }
    }

    #[inline]
    pub fn state(&self) -> RunState {
        self.state
    }

    #[inline]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    #[inline]
    pub(crate) fn channel(&self) -> &ControllerEnd {
        &self.channel
    }

    /// The region of the current run, once allocated.
    #[inline]
    pub fn region(&self) -> Option<&RegionHandle> {
        self.region.as_ref()
    }

    #[inline]
    pub fn progress(&self) -> u8 {
        self.progress.percent()
    }

    #[inline]
    pub fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    /// Timing of the run. `None` until completion has been observed, since
    /// the engine writes its timings until it publishes.
    #[cfg(feature = "profiler")]
    pub fn timing_stats(&self) -> Option<TimingStats> {
        if self.state != RunState::Completed {
            return None;
        }
        self.timer.as_ref().map(RunTimer::get_timing_stats)
    }

    /// Allocates the run's region: zeroed payload, sync word `NOT_DONE`.
    ///
    /// The controller's configuration is validated first, so an unusable poll
    /// interval or timeout fails here rather than once the run is in flight.
    pub fn allocate(&mut self, buffer_size: usize) -> Result<RegionHandle> {
        self.expect_state(RunState::Idle)?;
        self.config.validate()?;
        let region = SharedRegion::allocate(buffer_size)?;
        self.region = Some(RegionHandle::clone(&region));
        self.state = RunState::Allocated;
        Ok(region)
    }

    /// Sends `compute-shared` with a reference to the region. Only valid once
    /// per region.
    pub fn start(&mut self, iterations: u64) -> Result<()> {
        self.expect_state(RunState::Allocated)?;
        if iterations == 0 {
            return Err(HandoffError::InvalidConfig(
                "iterations must be at least 1".to_string(),
            ));
        }
        let region = self
            .region
            .as_ref()
            .map(RegionHandle::clone)
            .ok_or(HandoffError::InvalidState {
                expected: RunState::Allocated,
                actual: self.state,
            })?;

        let buffer_size = region.buffer_size();
        if !self.channel.send(Envelope::compute_shared(region, iterations)) {
            return Err(HandoffError::ChannelClosed);
        }
        self.started_at = Some(Instant::now());
        self.state = RunState::Running;
        debug!(buffer_size, iterations, "controller started run");
        Ok(())
    }

    /// Reacts to one event. Returns the completion if the run is complete,
    /// whether or not this event completed it.
    pub fn handle_event(&mut self, event: ControllerEvent) -> Option<&Completion> {
        match event {
            ControllerEvent::PollTick => {
                if self.try_complete(CompletionSource::PollTick).is_none()
                    && self.state == RunState::Running
                    && self.config.synthesize_progress
                {
                    let surfaced = self.progress.synthesize();
                    self.surface(surfaced);
                }
            }
            ControllerEvent::Message(ControlMessage::Progress { percent }) => {
                trace!(percent, "engine progress");
                let surfaced = self.progress.observe(percent);
                self.surface(surfaced);
            }
            ControllerEvent::Message(ControlMessage::SharedComplete {}) => {
                self.try_complete(CompletionSource::PushMessage);
            }
            ControllerEvent::Message(other) => {
                debug!(tag = other.tag(), "ignoring message not addressed to the controller");
            }
        }
        self.completion.as_ref()
    }

    /// Completes the run if the region is done.
    ///
    /// The payload is read only after an `Acquire` load has observed DONE. A
    /// push message is trusted to mean DONE is already stored; the load still
    /// happens, bounded by one poll interval. Once complete, every later call
    /// returns the recorded result unchanged.
    pub fn try_complete(&mut self, source: CompletionSource) -> Option<&Completion> {
        if self.state == RunState::Completed {
            return self.completion.as_ref();
        }
        if self.state != RunState::Running {
            return None;
        }
        let region = self.region.as_ref()?;

        if source == CompletionSource::PushMessage && !region.wait_done(Some(self.config.poll_interval)) {
            warn!("shared-complete received before the sync word was set");
            return None;
        }
        let values = region.completed()?.to_vec();

        let elapsed = self.started_at.map(|t| t.elapsed()).unwrap_or_default();
        info!(?source, buffer_size = values.len(), ?elapsed, "run completed");

        #[cfg(feature = "profiler")]
        if let Some(timer) = &self.timer {
            timer.mark_detected();
        }

        self.completion = Some(Completion {
            values,
            source,
            elapsed,
        });
        self.state = RunState::Completed;
        let surfaced = self.progress.complete();
        self.surface(surfaced);
        self.completion.as_ref()
    }

    /// Drives poll ticks and engine messages until the run completes or the
    /// configured timeout expires.
    ///
    /// # Errors
    ///
    /// [`HandoffError::InvalidState`] unless the run is `Running` or already
    /// `Completed`; [`HandoffError::Timeout`] if the deadline passes first. A
    /// timed-out controller stays `Running` and may be awaited again.
    pub fn await_completion(&mut self) -> Result<Completion> {
        if let Some(completion) = &self.completion {
            return Ok(completion.clone());
        }
        self.expect_state(RunState::Running)?;

        let ticker = tick(self.config.poll_interval);
        let deadline = self.config.timeout.map_or_else(never, after);
        let mut events: Receiver<ControlMessage> = self.channel.events().clone();

        loop {
            let step = select! {
                recv(events) -> message => match message {
                    Ok(message) => Step::Event(ControllerEvent::Message(message)),
                    Err(_) => Step::Disconnected,
                },
                recv(ticker) -> _ => Step::Event(ControllerEvent::PollTick),
                recv(deadline) -> _ => Step::TimedOut,
            };

            match step {
                Step::Event(event) => {
                    if let Some(completion) = self.handle_event(event) {
                        return Ok(completion.clone());
                    }
                }
                Step::Disconnected => {
                    // The engine's last store may still become visible, so
                    // keep polling the flag.
                    warn!("engine channel disconnected, falling back to polling");
                    events = never();
                }
                Step::TimedOut => {
                    let timeout = self.config.timeout.unwrap_or_default();
                    warn!(?timeout, "run timed out");
                    return Err(HandoffError::Timeout(timeout));
                }
            }
        }
    }

    fn surface(&mut self, percent: Option<u8>) {
        if let (Some(percent), Some(observer)) = (percent, self.observer.as_mut()) {
            observer(percent);
        }
    }

    fn expect_state(&self, expected: RunState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(HandoffError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.state)
            .field("region", &self.region)
            .field("progress", &self.progress.percent())
            .finish_non_exhaustive()
    }
}
