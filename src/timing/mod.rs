//! Stream timestamps
//!
//! Preview frames are stamped with milliseconds elapsed since streaming
//! started. Every restart gets a fresh clock.

use std::sync::Arc;
use std::time::Instant;

/// Monotonic clock for frame timestamps
///
/// Clones share the same start instant, so the driver-callback context and
/// the workers agree on the timebase.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start: Arc<Instant>,
}

impl FrameClock {
    /// Start a clock at the current instant
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    pub fn from_instant(start: Instant) -> Self {
        Self {
            start: Arc::new(start),
        }
    }

    /// Milliseconds since the clock started
    #[inline]
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Milliseconds between the clock start and `instant`.
    /// Instants before the start read as zero.
    #[inline]
    pub fn ms_at(&self, instant: Instant) -> u64 {
        instant.saturating_duration_since(*self.start).as_millis() as u64
    }

    pub fn start_instant(&self) -> Instant {
        *self.start
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
