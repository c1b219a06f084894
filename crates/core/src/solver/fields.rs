//! Field data structures for CPU and GPU backends
//!
//! This module defines the host-side storage used by the CPU backend: a row-major
//! multi-channel `FieldData` and the `FieldPair` that double-buffers it. The GPU
//! backend mirrors the pair with two storage buffers.

/// Opaque handle to a double-buffered field owned by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldHandle(pub(crate) usize);

impl FieldHandle {
    /// Index of this field in the backend's allocation table
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Field data container for CPU backend
///
/// Stores 2D field data as a flat `Vec<f32>` in row-major order with `channels`
/// interleaved values per cell.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldData {
    /// Field values in row-major order ((y * width + x) * channels + c)
    pub data: Vec<f32>,
    /// Grid width in cells
    pub width: usize,
    /// Grid height in cells
    pub height: usize,
    /// Values per cell (1 to 4)
    pub channels: usize,
}

impl FieldData {
    /// Create a new field with given dimensions, initialized to zero
    #[must_use]
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        Self {
            data: vec![0.0; width * height * channels],
            width,
            height,
            channels,
        }
    }

    /// Get reference to field data
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Get mutable reference to field data
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Get channel `c` at grid position
    ///
    /// # Panics
    ///
    /// Panics if coordinates or channel are out of bounds
    #[must_use]
    pub fn get(&self, x: usize, y: usize, c: usize) -> f32 {
        assert!(
            x < self.width && y < self.height && c < self.channels,
            "Coordinates out of bounds"
        );
        self.data[(y * self.width + x) * self.channels + c]
    }

    /// Set channel `c` at grid position
    ///
    /// # Panics
    ///
    /// Panics if coordinates or channel are out of bounds
    pub fn set(&mut self, x: usize, y: usize, c: usize, value: f32) {
        assert!(
            x < self.width && y < self.height && c < self.channels,
            "Coordinates out of bounds"
        );
        self.data[(y * self.width + x) * self.channels + c] = value;
    }

    /// Fill entire field with a value
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }
}

/// Read/write buffer pair for one field
///
/// `read` is authoritative and consumed by passes; `write` is scratch produced by
/// the current pass. `swap` is only called by a backend after a pass completes.
#[derive(Debug, Clone)]
pub struct FieldPair {
    pub label: &'static str,
    read: FieldData,
    write: FieldData,
}

impl FieldPair {
    #[must_use]
    pub fn new(label: &'static str, width: usize, height: usize, channels: usize) -> Self {
        Self {
            label,
            read: FieldData::new(width, height, channels),
            write: FieldData::new(width, height, channels),
        }
    }

    #[must_use]
    pub fn read(&self) -> &FieldData {
        &self.read
    }

    #[must_use]
    pub fn channels(&self) -> usize {
        self.read.channels
    }

    /// Detach the scratch buffer so a pass can fill it while sources stay borrowed
    pub(crate) fn take_write(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.write.data)
    }

    /// Return the filled scratch buffer and make it authoritative
    pub(crate) fn commit(&mut self, written: Vec<f32>) {
        self.write.data = written;
        self.swap();
    }

    /// Return an unused scratch buffer without promoting it
    pub(crate) fn restore_write(&mut self, scratch: Vec<f32>) {
        self.write.data = scratch;
    }

    /// Promote `write` to `read`
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.read, &mut self.write);
    }

    /// Overwrite the authoritative buffer (uploads)
    pub(crate) fn read_mut(&mut self) -> &mut FieldData {
        &mut self.read
    }

    /// Zero both buffers
    pub fn clear(&mut self) {
        self.read.fill(0.0);
        self.write.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_creation() {
        let field = FieldData::new(10, 20, 2);
        assert_eq!(field.width, 10);
        assert_eq!(field.height, 20);
        assert_eq!(field.data.len(), 400);
        assert!(field.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_field_get_set() {
        let mut field = FieldData::new(10, 10, 3);
        field.set(3, 4, 2, 123.45);
        assert_eq!(field.get(3, 4, 2), 123.45);

        // Verify row-major interleaved indexing
        let index = (4 * 10 + 3) * 3 + 2;
        assert_eq!(field.data[index], 123.45);
    }

    #[test]
    #[should_panic(expected = "Coordinates out of bounds")]
    fn test_field_bounds_check() {
        let field = FieldData::new(10, 10, 1);
        let _ = field.get(10, 5, 0);
    }

    #[test]
    fn test_pair_swap_promotes_write() {
        let mut pair = FieldPair::new("test", 2, 2, 1);
        let mut scratch = pair.take_write();
        assert_eq!(scratch.len(), 4);
        scratch = vec![1.0, 2.0, 3.0, 4.0];
        pair.commit(scratch);

        assert_eq!(pair.read().as_slice(), &[1.0, 2.0, 3.0, 4.0]);
        // The old authoritative buffer became scratch and still has the old values
        assert_eq!(pair.write.as_slice(), &[0.0; 4]);
    }

    #[test]
    fn test_pair_clear() {
        let mut pair = FieldPair::new("test", 2, 1, 2);
        pair.read_mut().fill(5.0);
        pair.clear();
        assert!(pair.read().as_slice().iter().all(|&v| v == 0.0));
    }
}
