//! Run parameters.
//!
//! Defaults match the demo UI: one million elements, 100 passes, 200ms poll.

use std::time::Duration;

use crate::{
    error::{HandoffError, Result},
    layout::RegionLayout,
};

pub const DEFAULT_BUFFER_SIZE: usize = 1_000_000;
pub const DEFAULT_ITERATIONS: u64 = 100;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_PROGRESS_CHECKPOINTS: u32 = 10;

/// Longest accepted poll interval or timeout. Deadlines are computed by adding
/// these to the current instant, which must not overflow.
pub const MAX_WAIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

pub const ENV_BUFFER_SIZE: &str = "HANDOFF_BUFFER_SIZE";
pub const ENV_ITERATIONS: &str = "HANDOFF_ITERATIONS";
pub const ENV_POLL_INTERVAL_MS: &str = "HANDOFF_POLL_INTERVAL_MS";
pub const ENV_PROGRESS_CHECKPOINTS: &str = "HANDOFF_PROGRESS_CHECKPOINTS";
pub const ENV_TIMEOUT_MS: &str = "HANDOFF_TIMEOUT_MS";

/// Parameters for one run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Payload element count. Zero is allowed.
    pub buffer_size: usize,

    /// Passes the engine makes over the payload. Must be at least 1.
    pub iterations: u64,

    /// How often the controller loads the sync word.
    pub poll_interval: Duration,

    /// Upper bound on progress messages the engine emits per run; 0 disables
    /// them.
    pub progress_checkpoints: u32,

    /// Whether poll ticks advance an estimated percentage while the engine
    /// has reported nothing.
    pub synthesize_progress: bool,

    /// Give up waiting after this long. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            iterations: DEFAULT_ITERATIONS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            progress_checkpoints: DEFAULT_PROGRESS_CHECKPOINTS,
            synthesize_progress: true,
            timeout: None,
        }
    }
}

impl RunConfig {
    pub fn new(buffer_size: usize, iterations: u64) -> Self {
        Self {
            buffer_size,
            iterations,
            ..Self::default()
        }
    }

    #[inline]
    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..self
        }
    }

    #[inline]
    pub fn with_progress_checkpoints(self, progress_checkpoints: u32) -> Self {
        Self {
            progress_checkpoints,
            ..self
        }
    }

    #[inline]
    pub fn with_synthesized_progress(self, synthesize_progress: bool) -> Self {
        Self {
            synthesize_progress,
            ..self
        }
    }

    #[inline]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(HandoffError::InvalidConfig(
                "iterations must be at least 1".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(HandoffError::InvalidConfig(
                "poll interval must be non-zero".to_string(),
            ));
        }
        if self.poll_interval > MAX_WAIT {
            return Err(HandoffError::InvalidConfig(format!(
                "poll interval {:?} exceeds {:?}",
                self.poll_interval, MAX_WAIT
            )));
        }
        if let Some(timeout) = self.timeout.filter(|&timeout| timeout > MAX_WAIT) {
            return Err(HandoffError::InvalidConfig(format!(
                "timeout {:?} exceeds {:?}",
                timeout, MAX_WAIT
            )));
        }
        RegionLayout::new(self.buffer_size)?;
        Ok(())
    }

    /// Defaults overlaid with `HANDOFF_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`, keyed by the `ENV_*` names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = parse(&lookup, ENV_BUFFER_SIZE)? {
            config.buffer_size = value;
        }
        if let Some(value) = parse(&lookup, ENV_ITERATIONS)? {
            config.iterations = value;
        }
        if let Some(ms) = parse(&lookup, ENV_POLL_INTERVAL_MS)? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(value) = parse(&lookup, ENV_PROGRESS_CHECKPOINTS)? {
            config.progress_checkpoints = value;
        }
        if let Some(ms) = parse(&lookup, ENV_TIMEOUT_MS)? {
            config.timeout = Some(Duration::from_millis(ms));
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| HandoffError::InvalidConfig(format!("{key}={raw:?} is not a valid number"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval, Duration::from_millis(200));
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let config = RunConfig::new(10, 0);
        assert!(matches!(
            config.validate(),
            Err(HandoffError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_buffer_size_accepted() {
        assert!(RunConfig::new(0, 1).validate().is_ok());
    }

    #[test]
    fn test_lookup_overlay() {
        let config = RunConfig::from_lookup(lookup_from(&[
            (ENV_BUFFER_SIZE, "64"),
            (ENV_ITERATIONS, " 8 "),
            (ENV_POLL_INTERVAL_MS, "5"),
            (ENV_TIMEOUT_MS, "1000"),
        ]))
        .unwrap();

        assert_eq!(config.buffer_size, 64);
        assert_eq!(config.iterations, 8);
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert_eq!(config.progress_checkpoints, DEFAULT_PROGRESS_CHECKPOINTS);
        assert_eq!(config.timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let err = RunConfig::from_lookup(lookup_from(&[(ENV_ITERATIONS, "many")])).unwrap_err();
        assert!(err.to_string().contains(ENV_ITERATIONS));

        let err = RunConfig::from_lookup(lookup_from(&[(ENV_BUFFER_SIZE, "-1")])).unwrap_err();
        assert!(matches!(err, HandoffError::InvalidConfig(_)));
    }

    #[test]
    fn test_unbounded_waits_rejected() {
        let config = RunConfig::new(3, 4).with_poll_interval(Duration::MAX);
        assert!(matches!(
            config.validate(),
            Err(HandoffError::InvalidConfig(_))
        ));

        let config = RunConfig::new(3, 4).with_timeout(Duration::MAX);
        assert!(matches!(
            config.validate(),
            Err(HandoffError::InvalidConfig(_))
        ));

        let longest = RunConfig::new(3, 4)
            .with_poll_interval(MAX_WAIT)
            .with_timeout(MAX_WAIT);
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn test_lookup_rejects_unbounded_poll_interval() {
        let err = RunConfig::from_lookup(lookup_from(&[(
            ENV_POLL_INTERVAL_MS,
            "18446744073709551615",
        )]))
        .unwrap_err();
        assert!(matches!(err, HandoffError::InvalidConfig(_)));

        let err = RunConfig::from_lookup(lookup_from(&[(ENV_TIMEOUT_MS, "18446744073709551615")]))
            .unwrap_err();
        assert!(matches!(err, HandoffError::InvalidConfig(_)));
    }
}
