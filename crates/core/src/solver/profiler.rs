//! Performance profiling helpers for tracking simulation timing.
//!
//! Provides RAII-style profiling scopes and a rolling frame timer.
use std::time::Instant;
use tracing::trace;

/// A profiling scope that measures elapsed time using RAII.
///
/// The elapsed time is emitted as a `trace!` event when the scope is dropped.
pub struct ProfilerScope {
    start: Instant,
    name: &'static str,
}

impl ProfilerScope {
    /// Creates a new profiling scope.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Gets elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for ProfilerScope {
    fn drop(&mut self) {
        trace!(stage = self.name, elapsed_ms = self.elapsed_ms(), "stage complete");
    }
}

/// Frame timer tracking the last and smoothed frame cost.
pub struct FrameTimer {
    last_frame_time_ms: f64,
    average_frame_time_ms: f64,
    frames: u64,
}

impl FrameTimer {
    /// Weight of the newest sample in the running average
    const SMOOTHING: f64 = 0.1;

    /// Creates a new frame timer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_frame_time_ms: 0.0,
            average_frame_time_ms: 0.0,
            frames: 0,
        }
    }

    /// Records frame time in milliseconds.
    pub fn record(&mut self, time_ms: f64) {
        self.last_frame_time_ms = time_ms;
        self.average_frame_time_ms = if self.frames == 0 {
            time_ms
        } else {
            self.average_frame_time_ms + (time_ms - self.average_frame_time_ms) * Self::SMOOTHING
        };
        self.frames += 1;
    }

    /// Gets the last recorded frame time.
    #[must_use]
    pub fn last_frame_time_ms(&self) -> f64 {
        self.last_frame_time_ms
    }

    /// Exponentially smoothed frame time.
    #[must_use]
    pub fn average_frame_time_ms(&self) -> f64 {
        self.average_frame_time_ms
    }

    /// Forget all recorded samples.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}
