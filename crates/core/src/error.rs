//! Error taxonomy for the fluid engine
//!
//! Configuration errors are either clamped (knobs with a known range) or rejected
//! (grid construction). Resource exhaustion is fatal at construction. Failures after
//! a buffer swap leave the engine in a state that only `reset()` recovers from.

use thiserror::Error;

/// Errors produced by the fluid engine and its backends
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FluidError {
    /// Grid dimensions are zero or exceed the supported maximum
    #[error("invalid grid {width}x{height}: {reason}")]
    InvalidGrid {
        width: u32,
        height: u32,
        reason: &'static str,
    },

    /// The backend cannot hold the requested fields at this resolution
    #[error("backend '{backend}' cannot allocate {requested_bytes} bytes of field storage")]
    ResourceExhausted {
        backend: &'static str,
        requested_bytes: u64,
    },

    /// Timestep was negative, NaN or infinite
    #[error("invalid timestep {0}: must be finite and non-negative")]
    InvalidTimestep(f32),

    /// The pending splat queue is at capacity
    #[error("splat queue is full ({capacity} pending splats)")]
    SplatQueueFull { capacity: usize },

    /// A pass referenced a field handle the backend never allocated
    #[error("unknown field handle {0}")]
    UnknownField(usize),

    /// Two stages declared the same field with different channel counts
    #[error("field {field} declared with {existing} and {requested} channels")]
    FieldLayoutConflict {
        field: &'static str,
        existing: u32,
        requested: u32,
    },

    /// A stage needed a field that was not allocated for this pipeline
    #[error("stage '{stage}' requires field {field} which is not allocated")]
    MissingField {
        stage: &'static str,
        field: &'static str,
    },

    /// Uploaded data does not match the field's shape
    #[error("field data length {actual} does not match expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// The engine (or backend) has been disposed
    #[error("simulation has been disposed")]
    Disposed,

    /// A previous frame failed after swapping buffers; call `reset()`
    #[error("simulation state is undefined after a failed frame; reset() required")]
    NeedsReset,

    /// The shared configuration lock was poisoned by a panicking writer
    #[error("configuration lock poisoned")]
    ConfigLockPoisoned,

    /// Reading a field back from the device failed
    #[error("field readback failed: {0}")]
    Readback(String),
}
