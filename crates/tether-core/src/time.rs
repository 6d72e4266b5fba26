use std::time::{Duration, Instant};

/// Abstraction over a time source to improve testability.
///
/// The connection core never reads the clock itself; callers pass the current
/// instant into every time-dependent operation, usually taken from a `Clock`.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current time instant.
    fn now(&self) -> Instant;
}

/// System clock using `Instant::now()`.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Seconds elapsed from `epoch` to `time`, as carried in wire timestamps.
///
/// Instants before the epoch map to zero.
#[inline]
pub fn seconds_since(epoch: Instant, time: Instant) -> f64 {
    time.saturating_duration_since(epoch).as_secs_f64()
}

/// Milliseconds in `duration`, as a float.
#[inline]
pub fn as_millis_f32(duration: Duration) -> f32 {
    duration.as_secs_f32() / 0.001
}
