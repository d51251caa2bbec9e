//! Progress as surfaced by the controller.
//!
//! Output is non-decreasing, stays below 100 while the run is in flight, and
//! is exactly 100 once completion has been observed.

/// Highest percentage surfaced before completion.
pub const IN_FLIGHT_CAP: u8 = 99;

/// Increment applied per poll tick when the engine reports no progress.
pub const SYNTHETIC_STEP: u8 = 10;

/// Ceiling for synthesized progress.
pub const SYNTHETIC_CAP: u8 = 90;

/// Turns engine reports and poll ticks into the percentage shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressTracker {
    percent: u8,
    engine_reported: bool,
    completed: bool,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn percent(&self) -> u8 {
        self.percent
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Records a percentage reported by the engine. Returns the new value if
    /// the surfaced percentage moved.
    pub fn observe(&mut self, percent: u8) -> Option<u8> {
        if self.completed {
            return None;
        }
        self.engine_reported = true;
        self.advance_to(percent.min(IN_FLIGHT_CAP))
    }

    /// Advances the synthetic estimate by one step, unless the engine has
    /// reported real progress.
    pub fn synthesize(&mut self) -> Option<u8> {
        if self.completed || self.engine_reported {
            return None;
        }
        let next = self.percent.saturating_add(SYNTHETIC_STEP).min(SYNTHETIC_CAP);
        self.advance_to(next)
    }

    /// Snaps to 100. Returns `Some(100)` only the first time.
    pub fn complete(&mut self) -> Option<u8> {
        if self.completed {
            return None;
        }
        self.completed = true;
        self.percent = 100;
        Some(100)
    }

    fn advance_to(&mut self, percent: u8) -> Option<u8> {
        if percent > self.percent {
            self.percent = percent;
            Some(percent)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_progress_capped() {
        let mut progress = ProgressTracker::new();
        let mut surfaced = Vec::new();
        for _ in 0..20 {
            surfaced.extend(progress.synthesize());
        }
        assert_eq!(surfaced, vec![10, 20, 30, 40, 50, 60, 70, 80, 90]);
        assert_eq!(progress.percent(), SYNTHETIC_CAP);
        assert_eq!(progress.complete(), Some(100));
    }

    #[test]
    fn test_engine_progress_stops_synthesis() {
        let mut progress = ProgressTracker::new();
        progress.synthesize();
        assert_eq!(progress.observe(5), None);
        assert_eq!(progress.synthesize(), None);
        assert_eq!(progress.observe(50), Some(50));
        assert_eq!(progress.percent(), 50);
    }

    #[test]
    fn test_engine_hundred_held_until_complete() {
        let mut progress = ProgressTracker::new();
        assert_eq!(progress.observe(100), Some(IN_FLIGHT_CAP));
        assert!(!progress.is_complete());
        assert_eq!(progress.complete(), Some(100));
        assert_eq!(progress.complete(), None);
        assert_eq!(progress.observe(40), None);
        assert_eq!(progress.percent(), 100);
    }
}
