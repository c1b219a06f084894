//! Forcing events: one-shot splats, continuous sources and pointer input

use crate::config::{SimConfig, MIN_SPLAT_RADIUS};
use crate::error::FluidError;
use nalgebra::Vector2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Brightness of randomly generated dye colours
const RANDOM_COLOR_INTENSITY: f32 = 0.15;

/// Clamp a radius into its valid range; NaN falls back to the minimum
fn clamp_radius(radius: f32) -> f32 {
    if radius.is_nan() {
        MIN_SPLAT_RADIUS
    } else {
        radius.clamp(MIN_SPLAT_RADIUS, 1.0)
    }
}

/// Transient forcing event, applied once and discarded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Splat {
    /// Centre in normalized coordinates, [0, 1]²
    pub position: Vector2<f32>,
    /// Added to velocity, in cells per second
    pub impulse: Vector2<f32>,
    /// Added to dye
    pub color: [f32; 3],
    /// Gaussian radius in normalized units
    pub radius: f32,
    /// Heat for smoke, impact strength for the ocean
    pub scalar: f32,
}

impl Splat {
    /// Create a splat; the radius is clamped into `[MIN_SPLAT_RADIUS, 1]`
    #[must_use]
    pub fn new(position: Vector2<f32>, impulse: Vector2<f32>, color: [f32; 3], radius: f32) -> Self {
        Self {
            position,
            impulse,
            color,
            radius: clamp_radius(radius),
            scalar: 1.0,
        }
    }

    #[must_use]
    pub fn with_scalar(mut self, scalar: f32) -> Self {
        self.scalar = scalar;
        self
    }
}

/// Persistent emitter, re-applied every frame until removed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub position: Vector2<f32>,
    /// Velocity injected per reference frame
    pub velocity: Vector2<f32>,
    /// Dye injected per reference frame
    pub color: [f32; 3],
    /// Heat injected per reference frame
    pub temperature: f32,
    pub radius: f32,
}

impl Source {
    #[must_use]
    pub fn new(position: Vector2<f32>, color: [f32; 3], radius: f32) -> Self {
        Self {
            position,
            velocity: Vector2::zeros(),
            color,
            temperature: 0.0,
            radius: clamp_radius(radius),
        }
    }

    #[must_use]
    pub fn with_velocity(mut self, velocity: Vector2<f32>) -> Self {
        self.velocity = velocity;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Three coloured smoke vents along the bottom edge, blowing upwards
    #[must_use]
    pub fn smoke_vents() -> [Self; 3] {
        let vent = |x: f32, color: [f32; 3]| {
            Self::new(Vector2::new(x, 0.08), color, 0.03)
                .with_velocity(Vector2::new(0.0, 4.0))
                .with_temperature(0.05)
        };
        [
            vent(0.25, [0.02, 0.004, 0.0]),
            vent(0.5, [0.0, 0.012, 0.02]),
            vent(0.75, [0.012, 0.0, 0.02]),
        ]
    }
}

/// Opaque id of a registered [`Source`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u64);

/// Bounded FIFO of pending splats
///
/// Splats are consumed by explicit dequeue, a bounded number per frame; anything
/// beyond that waits for later frames in arrival order.
#[derive(Debug, Clone)]
pub struct SplatQueue {
    pending: VecDeque<Splat>,
    capacity: usize,
}

impl SplatQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue a splat
    ///
    /// # Errors
    ///
    /// Returns `FluidError::SplatQueueFull` when the queue is at capacity; the
    /// splat is not enqueued.
    pub fn push(&mut self, splat: Splat) -> Result<(), FluidError> {
        if self.pending.len() >= self.capacity {
            return Err(FluidError::SplatQueueFull {
                capacity: self.capacity,
            });
        }
        self.pending.push_back(splat);
        Ok(())
    }

    /// Dequeue up to `max` splats, oldest first
    pub fn drain_front(&mut self, max: usize) -> Vec<Splat> {
        let count = max.min(self.pending.len());
        self.pending.drain(..count).collect()
    }

    /// Put splats back at the head of the queue, ahead of anything newer
    ///
    /// Used when a frame fails before consuming them; ignores the bound.
    pub fn requeue_front(&mut self, splats: Vec<Splat>) {
        for splat in splats.into_iter().rev() {
            self.pending.push_front(splat);
        }
    }

    /// Change the bound; already queued splats are kept
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Splat> {
        self.pending.iter()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Registered continuous sources, in registration order
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    ids: Vec<SourceId>,
    sources: Vec<Source>,
    next_id: u64,
}

impl SourceRegistry {
    pub fn add(&mut self, source: Source) -> SourceId {
        let id = SourceId(self.next_id);
        self.next_id += 1;
        self.ids.push(id);
        self.sources.push(source);
        id
    }

    /// Remove a source, returning it if it was registered
    pub fn remove(&mut self, id: SourceId) -> Option<Source> {
        let index = self.ids.iter().position(|existing| *existing == id)?;
        self.ids.remove(index);
        Some(self.sources.remove(index))
    }

    #[must_use]
    pub fn get(&self, id: SourceId) -> Option<&Source> {
        let index = self.ids.iter().position(|existing| *existing == id)?;
        self.sources.get(index)
    }

    /// Active sources as a contiguous slice
    #[must_use]
    pub fn as_slice(&self) -> &[Source] {
        &self.sources
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Remove every source; ids are never reused
    pub fn clear(&mut self) {
        self.ids.clear();
        self.sources.clear();
    }
}

/// Normalized pointer state from an input collaborator
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointerInput {
    /// Position in [0, 1]², already aspect-corrected
    pub position: Vector2<f32>,
    /// Movement since the last frame in normalized units
    pub delta: Vector2<f32>,
    pub down: bool,
}

impl PointerInput {
    /// The splat this input produces, if any
    ///
    /// Only a pressed pointer that moved produces a splat. The impulse is the
    /// delta scaled by the configured splat force; the colour is a random hue.
    #[must_use]
    pub fn to_splat(&self, config: &SimConfig) -> Option<Splat> {
        if !self.down || self.delta == Vector2::zeros() {
            return None;
        }
        Some(Splat::new(
            self.position,
            self.delta * config.splat_force,
            random_color(&mut rand::rng()),
            config.splat_radius,
        ))
    }
}

/// Fully saturated colour of a random hue, dimmed for additive dye
pub fn random_color<R: Rng + ?Sized>(rng: &mut R) -> [f32; 3] {
    let hue: f32 = rng.random_range(0.0..1.0);
    hsv_to_rgb(hue, 1.0, 1.0).map(|c| c * RANDOM_COLOR_INTENSITY)
}

/// A splat at a random position with a random direction and colour
pub fn random_splat<R: Rng + ?Sized>(rng: &mut R, config: &SimConfig) -> Splat {
    let position = Vector2::<f32>::new(rng.random_range(0.0..1.0), rng.random_range(0.0..1.0));
    let impulse = Vector2::<f32>::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0))
        * (config.splat_force * 0.1);
    Splat::new(position, impulse, random_color(rng).map(|c| c * 10.0), config.splat_radius)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [f32; 3] {
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);
    match sector as i32 % 6 {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}
