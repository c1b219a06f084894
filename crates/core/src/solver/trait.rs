//! Field backend trait definition
//!
//! This module defines the `FieldBackend` trait, which provides a backend-agnostic
//! interface for allocating double-buffered grid fields and executing kernel passes
//! over them. Both CPU and GPU implementations implement this trait.

use super::fields::FieldHandle;
use super::kernel::KernelPass;
use crate::error::FluidError;
use crate::grid::Grid;
use std::borrow::Cow;

/// Backend-agnostic interface for double-buffered field storage and pass execution
///
/// Passes are executed in submission order. A backend must make the output of pass
/// *N* visible to every later pass before that later pass reads it.
pub trait FieldBackend: Send + Sync {
    /// Allocate a zeroed read/write pair with `channels` values per cell
    ///
    /// # Errors
    ///
    /// Returns `FluidError::ResourceExhausted` if the device cannot hold the pair,
    /// or `FluidError::Disposed` after [`release`](Self::release).
    fn allocate(&mut self, label: &'static str, channels: u32) -> Result<FieldHandle, FluidError>;

    /// Run one pass: read the inputs' authoritative buffers, fully write the
    /// destination's scratch buffer, then swap the destination pair
    ///
    /// # Errors
    ///
    /// Returns `FluidError::UnknownField` for handles this backend never allocated.
    /// On error no buffer has been swapped.
    fn dispatch(&mut self, pass: &KernelPass) -> Result<(), FluidError>;

    /// Zero both buffers of a field
    ///
    /// # Errors
    ///
    /// Returns `FluidError::UnknownField` for handles this backend never allocated.
    fn clear(&mut self, field: FieldHandle) -> Result<(), FluidError>;

    /// Replace a field's authoritative buffer with host data
    ///
    /// # Errors
    ///
    /// Returns `FluidError::ShapeMismatch` if `data` is not `cells * channels` long.
    fn upload(&mut self, field: FieldHandle, data: &[f32]) -> Result<(), FluidError>;

    /// Read a field's authoritative buffer
    ///
    /// Returns `cells * channels` values in row-major order. CPU backend returns a
    /// borrowed slice, GPU backend returns an owned copy.
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Readback` if the device copy fails.
    fn read(&self, field: FieldHandle) -> Result<Cow<'_, [f32]>, FluidError>;

    /// Channels per cell of an allocated field
    fn channels(&self, field: FieldHandle) -> Option<u32>;

    /// Block until all submitted passes have completed
    fn flush(&mut self) {}

    /// Release every buffer pair; the backend rejects further work
    fn release(&mut self);

    /// Grid all fields are sized to
    fn grid(&self) -> Grid;

    /// Short backend name for logs and stats
    fn name(&self) -> &'static str;

    /// Check if this is the GPU backend
    fn is_gpu_accelerated(&self) -> bool;
}
