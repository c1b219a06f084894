//! Simulation domain
//!
//! The grid fixes the resolution of every field for the lifetime of an engine.
//! Finite-difference stencils use the texel size `(1/width, 1/height)` and splats
//! use the aspect ratio to keep their footprint circular on non-square domains.

use crate::error::FluidError;

/// Largest supported grid edge in cells
pub const MAX_GRID_DIMENSION: u32 = 4096;

/// Immutable grid dimensions shared by every field of one engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Grid {
    width: u32,
    height: u32,
}

impl Grid {
    /// Create a grid, rejecting zero or oversized dimensions
    ///
    /// # Errors
    ///
    /// Returns `FluidError::InvalidGrid` if either dimension is zero or larger
    /// than [`MAX_GRID_DIMENSION`].
    pub fn new(width: u32, height: u32) -> Result<Self, FluidError> {
        if width == 0 || height == 0 {
            return Err(FluidError::InvalidGrid {
                width,
                height,
                reason: "dimensions must be positive",
            });
        }
        if width > MAX_GRID_DIMENSION || height > MAX_GRID_DIMENSION {
            return Err(FluidError::InvalidGrid {
                width,
                height,
                reason: "dimensions exceed 4096 cells",
            });
        }
        Ok(Self { width, height })
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of cells in the grid
    #[must_use]
    pub const fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size of one cell in normalized `[0,1]²` coordinates
    #[must_use]
    pub fn texel_size(&self) -> (f32, f32) {
        (1.0 / self.width as f32, 1.0 / self.height as f32)
    }

    /// Width over height, used to keep splats circular
    #[must_use]
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Row-major index of cell `(x, y)`
    #[inline]
    #[must_use]
    pub const fn index(&self, x: usize, y: usize) -> usize {
        y * self.width as usize + x
    }

    /// Normalized coordinates of the center of cell `(x, y)`
    #[inline]
    #[must_use]
    pub fn cell_center(&self, x: usize, y: usize) -> (f32, f32) {
        (
            (x as f32 + 0.5) / self.width as f32,
            (y as f32 + 0.5) / self.height as f32,
        )
    }

    /// Cell containing the normalized position `(u, v)`, clamped to the grid
    #[must_use]
    pub fn cell_at(&self, u: f32, v: f32) -> (usize, usize) {
        let x = (u * self.width as f32).floor().clamp(0.0, (self.width - 1) as f32);
        let y = (v * self.height as f32).floor().clamp(0.0, (self.height - 1) as f32);
        (x as usize, y as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_rejects_zero_dimension() {
        assert!(matches!(
            Grid::new(0, 16),
            Err(FluidError::InvalidGrid { width: 0, .. })
        ));
        assert!(Grid::new(16, 0).is_err());
    }

    #[test]
    fn test_grid_rejects_oversized() {
        assert!(Grid::new(MAX_GRID_DIMENSION + 1, 8).is_err());
        assert!(Grid::new(MAX_GRID_DIMENSION, 8).is_ok());
    }

    #[test]
    fn test_texel_size_and_aspect() {
        let grid = Grid::new(200, 100).unwrap();
        assert_eq!(grid.texel_size(), (0.005, 0.01));
        assert_eq!(grid.aspect_ratio(), 2.0);
        assert_eq!(grid.cell_count(), 20_000);
    }

    #[test]
    fn test_cell_lookup_round_trips_centers() {
        let grid = Grid::new(8, 4).unwrap();
        let (u, v) = grid.cell_center(5, 2);
        assert_eq!(grid.cell_at(u, v), (5, 2));
        // Positions outside [0,1] clamp to the border cells
        assert_eq!(grid.cell_at(-0.5, 1.5), (0, 3));
    }
}
