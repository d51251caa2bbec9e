use std::{
    cell::UnsafeCell,
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

/// A wrapper around UnsafeCell that implements Send and Sync for fields that
/// have exactly one writing thread.
pub(crate) struct ThreadSafeUnsafeCell<T>(UnsafeCell<T>);

unsafe impl<T: Send> Send for ThreadSafeUnsafeCell<T> {}
unsafe impl<T: Send> Sync for ThreadSafeUnsafeCell<T> {}

impl<T> ThreadSafeUnsafeCell<T> {
    #[inline(always)]
    pub(crate) fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    #[inline(always)]
    pub(crate) fn get(&self) -> *mut T {
        self.0.get()
    }
}

/// Timing of a single run, shared by the engine and the controller.
#[derive(Clone)]
pub struct RunTimer {
    /// Timer creation, taken as the start of the run.
    pub(crate) init_timestamp: Instant,

    /// Start of the pass currently being computed. Engine only.
    pub(crate) pass_start: Arc<ThreadSafeUnsafeCell<Instant>>,

    /// Duration of each completed pass. Engine only.
    pub(crate) pass_times: Arc<ThreadSafeUnsafeCell<Vec<Duration>>>,

    /// When the engine stored DONE. Engine only.
    pub(crate) published_timestamp: Arc<ThreadSafeUnsafeCell<Option<Instant>>>,

    /// When the controller first observed completion. Controller only.
    pub(crate) detected_timestamp: Arc<ThreadSafeUnsafeCell<Option<Instant>>>,
}

// SAFETY: RunTimer is safe to share between threads because:
// 1. Every field has a single writing thread (engine or controller)
// 2. The controller only reads engine fields after observing DONE with Acquire,
//    and the engine writes them before its Release store of DONE
unsafe impl Send for RunTimer {}
unsafe impl Sync for RunTimer {}

impl RunTimer {
    #[inline]
    pub fn new() -> Self {
        let init_timestamp = Instant::now();
        Self {
            init_timestamp,
            pass_start: Arc::new(ThreadSafeUnsafeCell::new(init_timestamp)),
            pass_times: Arc::new(ThreadSafeUnsafeCell::new(Vec::new())),
            published_timestamp: Arc::new(ThreadSafeUnsafeCell::new(None)),
            detected_timestamp: Arc::new(ThreadSafeUnsafeCell::new(None)),
        }
    }

    /// Engine: a pass is starting.
    #[inline]
    pub(crate) fn start_pass(&self) {
        unsafe {
            *self.pass_start.get() = Instant::now();
        }
    }

    /// Engine: the current pass finished.
    #[inline]
    pub(crate) fn end_pass(&self) {
        let end_time = Instant::now();
        unsafe {
            let start_time = *self.pass_start.get();
            (*self.pass_times.get()).push(end_time.duration_since(start_time));
        }
    }

    /// Engine: called right before DONE is stored.
    #[inline]
    pub(crate) fn mark_published(&self) {
        unsafe {
            *self.published_timestamp.get() = Some(Instant::now());
        }
    }

    /// Controller: completion observed. Later calls keep the first timestamp.
    #[inline]
    pub(crate) fn mark_detected(&self) {
        unsafe {
            let detected = &mut *self.detected_timestamp.get();
            if detected.is_none() {
                *detected = Some(Instant::now());
            }
        }
    }

    /// Controller: snapshot of the run. Must only be called after DONE has
    /// been observed, while the engine no longer writes its fields.
    #[inline]
    pub(crate) fn get_timing_stats(&self) -> TimingStats {
        unsafe {
            TimingStats {
                init_timestamp: self.init_timestamp,
                published_timestamp: *self.published_timestamp.get(),
                detected_timestamp: *self.detected_timestamp.get(),
                pass_times: (*self.pass_times.get()).clone(),
            }
        }
    }
}

impl fmt::Debug for RunTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunTimer")
            .field("init_timestamp", &self.init_timestamp)
            .finish_non_exhaustive()
    }
}

impl Default for RunTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct TimingStats {
    pub init_timestamp: Instant,
    pub published_timestamp: Option<Instant>,
    pub detected_timestamp: Option<Instant>,
    /// Duration of each pass, in pass order.
    pub pass_times: Vec<Duration>,
}

impl TimingStats {
    /// Time from timer creation to the controller observing completion.
    #[inline]
    pub fn total_runtime(&self) -> Option<Duration> {
        self.detected_timestamp
            .map(|detected| detected.duration_since(self.init_timestamp))
    }

    #[inline]
    pub fn total_pass_time(&self) -> Duration {
        self.pass_times.iter().sum()
    }

    #[inline]
    pub fn average_pass_time(&self) -> Option<Duration> {
        if self.pass_times.is_empty() {
            return None;
        }
        Some(self.total_pass_time() / self.pass_times.len() as u32)
    }

    /// Delay between the engine's publish and the controller noticing it.
    #[inline]
    pub fn detection_latency(&self) -> Option<Duration> {
        let published = self.published_timestamp?;
        let detected = self.detected_timestamp?;
        Some(detected.saturating_duration_since(published))
    }

    /// Prints pass times followed by run totals.
    pub fn plot(&self) {
        if self.pass_times.is_empty() {
            println!("No timing data available to plot.");
            return;
        }

        println!("\n📊 PASS TIME TABLE");
        println!("Time format: milliseconds (ms) with microsecond precision");
        println!("{}", "=".repeat(40));
        println!("{:<12} {:<12}", "Pass", "Time");
        println!("{} {}", "-".repeat(12), "-".repeat(12));

        for (pass, time) in self.pass_times.iter().enumerate() {
            println!("{:<12} {:<12.3}", pass, duration_to_ms(*time));
        }

        println!("{}", "=".repeat(40));
        println!(
            "{:<12} {:<12.3}",
            "Total Pass",
            duration_to_ms(self.total_pass_time())
        );
        if let Some(average) = self.average_pass_time() {
            println!("{:<12} {:<12.3}", "Avg Pass", duration_to_ms(average));
        }
        match self.total_runtime() {
            Some(total) => println!("{:<12} {:<12.3}", "Total Time", duration_to_ms(total)),
            None => println!("{:<12} {:<12}", "Total Time", "-"),
        }
        match self.detection_latency() {
            Some(latency) => println!("{:<12} {:<12.3}", "Detect Lag", duration_to_ms(latency)),
            None => println!("{:<12} {:<12}", "Detect Lag", "-"),
        }
        println!("{}", "=".repeat(40));

        println!("\nLegend:");
        println!("  • Total Pass: Sum of all pass times (ms)");
        println!("  • Total Time: Runtime from start to observed completion (ms)");
        println!("  • Detect Lag: Publish to observed completion (ms)");
    }
}

/// Convert Duration to milliseconds as f64
#[inline]
fn duration_to_ms(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}
