//! Host-side field measurements
//!
//! These operate on read-back buffers and use the same clamped stencils as the
//! kernels, so they agree with what the solver itself sees.

use crate::grid::Grid;

/// Mean of `|div v|` over all cells of a two-channel velocity buffer
#[must_use]
pub fn mean_abs_divergence(velocity: &[f32], grid: Grid) -> f32 {
    let width = grid.width() as usize;
    let height = grid.height() as usize;
    let at = |x: isize, y: isize, c: usize| {
        let cx = x.clamp(0, width as isize - 1) as usize;
        let cy = y.clamp(0, height as isize - 1) as usize;
        velocity[(cy * width + cx) * 2 + c]
    };

    let mut total = 0.0_f64;
    for y in 0..height as isize {
        for x in 0..width as isize {
            let div = 0.5 * ((at(x + 1, y, 0) - at(x - 1, y, 0)) + (at(x, y + 1, 1) - at(x, y - 1, 1)));
            total += f64::from(div.abs());
        }
    }
    (total / grid.cell_count() as f64) as f32
}

/// Sum of every value in a buffer
#[must_use]
pub fn total_mass(field: &[f32]) -> f32 {
    field.iter().map(|v| f64::from(*v)).sum::<f64>() as f32
}

/// Largest per-cell vector magnitude and the cell it occurs in
#[must_use]
pub fn peak_magnitude(field: &[f32], channels: usize, grid: Grid) -> (f32, (usize, usize)) {
    let width = grid.width() as usize;
    field
        .chunks_exact(channels.max(1))
        .enumerate()
        .map(|(i, cell)| {
            let magnitude = cell.iter().map(|v| v * v).sum::<f32>().sqrt();
            (magnitude, (i % width, i / width))
        })
        .fold((0.0, (0, 0)), |best, candidate| {
            if candidate.0 > best.0 {
                candidate
            } else {
                best
            }
        })
}
