//! CPU-based field backend
//!
//! This module provides the reference implementation of the `FieldBackend` trait.
//! Fields live in host `Vec<f32>` pairs and passes run cell by cell on the calling
//! thread. This backend is always available and serves as the fallback when GPU
//! acceleration is not available; tests use it for deterministic results.

use super::fields::{FieldHandle, FieldPair};
use super::kernel::{evaluate, KernelPass, Sampler};
use super::FieldBackend;
use crate::error::FluidError;
use crate::grid::Grid;
use std::borrow::Cow;
use tracing::debug;

/// Default host memory budget for field storage (both halves of every pair)
pub const DEFAULT_HOST_BUDGET_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Single-threaded host backend
pub struct CpuBackend {
    grid: Grid,
    fields: Vec<FieldPair>,
    allocated_bytes: u64,
    budget_bytes: u64,
    released: bool,
}

impl CpuBackend {
    #[must_use]
    pub fn new(grid: Grid) -> Self {
        Self::with_budget(grid, DEFAULT_HOST_BUDGET_BYTES)
    }

    /// Create a backend that refuses allocations beyond `budget_bytes`
    #[must_use]
    pub fn with_budget(grid: Grid, budget_bytes: u64) -> Self {
        Self {
            grid,
            fields: Vec::new(),
            allocated_bytes: 0,
            budget_bytes,
            released: false,
        }
    }

    fn pair(&self, field: FieldHandle) -> Result<&FieldPair, FluidError> {
        self.fields
            .get(field.index())
            .ok_or(FluidError::UnknownField(field.index()))
    }

    fn live(&self) -> Result<(), FluidError> {
        if self.released {
            Err(FluidError::Disposed)
        } else {
            Ok(())
        }
    }
}

impl FieldBackend for CpuBackend {
    fn allocate(&mut self, label: &'static str, channels: u32) -> Result<FieldHandle, FluidError> {
        self.live()?;
        let channels = channels.clamp(1, 4) as usize;
        let pair_bytes = 2 * (self.grid.cell_count() * channels * std::mem::size_of::<f32>()) as u64;
        if self.allocated_bytes + pair_bytes > self.budget_bytes {
            return Err(FluidError::ResourceExhausted {
                backend: self.name(),
                requested_bytes: self.allocated_bytes + pair_bytes,
            });
        }

        let handle = FieldHandle(self.fields.len());
        self.fields.push(FieldPair::new(
            label,
            self.grid.width() as usize,
            self.grid.height() as usize,
            channels,
        ));
        self.allocated_bytes += pair_bytes;
        debug!("Allocated CPU field '{}' ({} channels)", label, channels);
        Ok(handle)
    }

    fn dispatch(&mut self, pass: &KernelPass) -> Result<(), FluidError> {
        self.live()?;
        // Validate every handle before detaching any buffer
        for input in pass.kernel.inputs().into_iter().flatten() {
            self.pair(input)?;
        }
        let output = pass.output.index();
        let channels = self.pair(pass.output)?.channels();

        let mut scratch = self.fields[output].take_write();
        let (width, height) = (self.grid.width() as usize, self.grid.height() as usize);
        let fields = &self.fields;
        let result = evaluate(
            &pass.kernel,
            self.grid,
            |handle| {
                let read = fields
                    .get(handle.index())
                    .ok_or(FluidError::UnknownField(handle.index()))?
                    .read();
                Ok(Sampler::new(read.as_slice(), width, height, read.channels))
            },
            &mut scratch,
            channels,
        );

        match result {
            Ok(()) => {
                self.fields[output].commit(scratch);
                Ok(())
            }
            Err(e) => {
                self.fields[output].restore_write(scratch);
                Err(e)
            }
        }
    }

    fn clear(&mut self, field: FieldHandle) -> Result<(), FluidError> {
        self.live()?;
        self.fields
            .get_mut(field.index())
            .ok_or(FluidError::UnknownField(field.index()))?
            .clear();
        Ok(())
    }

    fn upload(&mut self, field: FieldHandle, data: &[f32]) -> Result<(), FluidError> {
        self.live()?;
        let pair = self
            .fields
            .get_mut(field.index())
            .ok_or(FluidError::UnknownField(field.index()))?;
        let target = pair.read_mut();
        if data.len() != target.data.len() {
            return Err(FluidError::ShapeMismatch {
                expected: target.data.len(),
                actual: data.len(),
            });
        }
        target.data.copy_from_slice(data);
        Ok(())
    }

    fn read(&self, field: FieldHandle) -> Result<Cow<'_, [f32]>, FluidError> {
        self.live()?;
        Ok(Cow::Borrowed(self.pair(field)?.read().as_slice()))
    }

    fn channels(&self, field: FieldHandle) -> Option<u32> {
        self.fields.get(field.index()).map(|p| p.channels() as u32)
    }

    fn release(&mut self) {
        self.fields.clear();
        self.fields.shrink_to_fit();
        self.allocated_bytes = 0;
        self.released = true;
    }

    fn grid(&self) -> Grid {
        self.grid
    }

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn is_gpu_accelerated(&self) -> bool {
        false
    }
}
