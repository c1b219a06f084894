//! Stencil kernels
//!
//! Every solver stage is expressed as a sequence of [`KernelPass`]es: one kernel,
//! reading the authoritative buffers of up to three input fields, writing the
//! scratch buffer of one destination field. A pass is pure per cell and reads at
//! most the four axis neighbours of a cell (plus one bilinear tap for advection).
//! Neighbour reads beyond the border clamp to the edge texel.
//!
//! The reference evaluation in this module is what the CPU backend runs; the WGSL
//! entry points in `shaders/kernels.wgsl` implement the same formulas on the GPU.

use super::fields::FieldHandle;
use crate::config::REFERENCE_FPS;
use crate::error::FluidError;
use crate::grid::Grid;

/// Regularizer added before normalizing the vorticity gradient
pub const VORTICITY_EPSILON: f32 = 1e-5;

/// Base water colours used by the ocean composite
pub const OCEAN_DEEP: [f32; 3] = [0.0, 0.05, 0.15];
pub const OCEAN_SHALLOW: [f32; 3] = [0.0, 0.35, 0.45];
pub const OCEAN_LIGHT_DIR: [f32; 3] = [0.3, 0.5, 0.8];

/// How far full foam lifts smoke towards white
pub const SMOKE_FOAM_TINT: f32 = 0.35;

/// A per-cell stencil operation and its inputs
#[derive(Debug, Clone, PartialEq)]
pub enum Kernel {
    /// Semi-Lagrangian transport of `source` along `velocity`, scaled by `dissipation`
    Advect {
        velocity: FieldHandle,
        source: FieldHandle,
        dt: f32,
        dissipation: f32,
    },
    /// Add a Gaussian blob of `value` centred at `point` to `target`
    Splat {
        target: FieldHandle,
        point: [f32; 2],
        value: [f32; 4],
        radius: f32,
        aspect: f32,
    },
    /// Scalar curl of a 2D velocity field
    Curl { velocity: FieldHandle },
    /// Add the vorticity confinement force to velocity
    Vorticity {
        velocity: FieldHandle,
        curl: FieldHandle,
        strength: f32,
        dt: f32,
    },
    /// Central-difference divergence of velocity
    Divergence { velocity: FieldHandle },
    /// One Jacobi relaxation step of the pressure Poisson equation
    Jacobi {
        pressure: FieldHandle,
        divergence: FieldHandle,
    },
    /// Subtract the pressure gradient from velocity
    GradientSubtract {
        pressure: FieldHandle,
        velocity: FieldHandle,
    },
    /// Vertical lift from temperature minus weight of smoke density
    Buoyancy {
        velocity: FieldHandle,
        temperature: FieldHandle,
        density: FieldHandle,
        dt: f32,
        kappa: f32,
        sigma: f32,
        ambient: f32,
    },
    /// One step of the discrete wave equation on a (height, vertical velocity) field
    ///
    /// The stencil and the height update are scaled by `dt * REFERENCE_FPS`, so wave
    /// speed does not depend on frame rate. `damping` is the per-step factor applied
    /// to both channels, so the net displacement of an impact relaxes to a flat
    /// surface.
    Wave {
        height: FieldHandle,
        dt: f32,
        damping: f32,
        amplitude: f32,
        wavenumber: f32,
        frequency: f32,
        time: f32,
    },
    /// Surface normals from the height gradient
    Normals { height: FieldHandle, strength: f32 },
    /// Exponential foam decay plus growth where local energy exceeds a threshold
    ///
    /// For a velocity source the energy is `|u| + |v|`. For a `surface` source
    /// (height, vertical velocity) it is the vertical speed plus the height slope,
    /// so a still but displaced surface grows no foam.
    Foam {
        foam: FieldHandle,
        source: FieldHandle,
        decay: f32,
        threshold: f32,
        growth: f32,
        surface: bool,
    },
    /// Tone-map an RGB dye field
    DisplayDye {
        dye: FieldHandle,
        brightness: f32,
        contrast: f32,
        gamma: f32,
    },
    /// Tone-map smoke dye, lifted towards white where foam has built up
    DisplaySmoke {
        dye: FieldHandle,
        foam: FieldHandle,
        brightness: f32,
        contrast: f32,
        gamma: f32,
    },
    /// Composite height, normals and foam into a shaded water image
    DisplayOcean {
        height: FieldHandle,
        normals: FieldHandle,
        foam: FieldHandle,
        brightness: f32,
        contrast: f32,
        gamma: f32,
    },
}

/// Discriminant of [`Kernel`], one GPU entry point each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelKind {
    Advect,
    Splat,
    Curl,
    Vorticity,
    Divergence,
    Jacobi,
    GradientSubtract,
    Buoyancy,
    Wave,
    Normals,
    Foam,
    DisplayDye,
    DisplaySmoke,
    DisplayOcean,
}

impl KernelKind {
    pub const ALL: [Self; 14] = [
        Self::Advect,
        Self::Splat,
        Self::Curl,
        Self::Vorticity,
        Self::Divergence,
        Self::Jacobi,
        Self::GradientSubtract,
        Self::Buoyancy,
        Self::Wave,
        Self::Normals,
        Self::Foam,
        Self::DisplayDye,
        Self::DisplaySmoke,
        Self::DisplayOcean,
    ];

    /// WGSL entry point implementing this kernel
    #[must_use]
    pub const fn entry_point(self) -> &'static str {
        match self {
            Self::Advect => "advect",
            Self::Splat => "splat",
            Self::Curl => "curl",
            Self::Vorticity => "vorticity",
            Self::Divergence => "divergence",
            Self::Jacobi => "jacobi",
            Self::GradientSubtract => "gradient_subtract",
            Self::Buoyancy => "buoyancy",
            Self::Wave => "wave",
            Self::Normals => "normals",
            Self::Foam => "foam",
            Self::DisplayDye => "display_dye",
            Self::DisplaySmoke => "display_smoke",
            Self::DisplayOcean => "display_ocean",
        }
    }
}

/// Backend-neutral uniform values for one pass
///
/// The meaning of `k` depends on the kernel; see [`Kernel::params`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PassParams {
    pub dt: f32,
    pub point: [f32; 2],
    pub value: [f32; 4],
    pub k: [f32; 5],
}

impl Kernel {
    #[must_use]
    pub const fn kind(&self) -> KernelKind {
        match self {
            Self::Advect { .. } => KernelKind::Advect,
            Self::Splat { .. } => KernelKind::Splat,
            Self::Curl { .. } => KernelKind::Curl,
            Self::Vorticity { .. } => KernelKind::Vorticity,
            Self::Divergence { .. } => KernelKind::Divergence,
            Self::Jacobi { .. } => KernelKind::Jacobi,
            Self::GradientSubtract { .. } => KernelKind::GradientSubtract,
            Self::Buoyancy { .. } => KernelKind::Buoyancy,
            Self::Wave { .. } => KernelKind::Wave,
            Self::Normals { .. } => KernelKind::Normals,
            Self::Foam { .. } => KernelKind::Foam,
            Self::DisplayDye { .. } => KernelKind::DisplayDye,
            Self::DisplaySmoke { .. } => KernelKind::DisplaySmoke,
            Self::DisplayOcean { .. } => KernelKind::DisplayOcean,
        }
    }

    /// Input fields in binding order (src0, src1, src2)
    #[must_use]
    pub fn inputs(&self) -> [Option<FieldHandle>; 3] {
        match *self {
            Self::Advect {
                velocity, source, ..
            } => [Some(velocity), Some(source), None],
            Self::Splat { target, .. } => [Some(target), None, None],
            Self::Curl { velocity } | Self::Divergence { velocity } => [Some(velocity), None, None],
            Self::Vorticity { velocity, curl, .. } => [Some(velocity), Some(curl), None],
            Self::Jacobi {
                pressure,
                divergence,
            } => [Some(pressure), Some(divergence), None],
            Self::GradientSubtract { pressure, velocity } => [Some(pressure), Some(velocity), None],
            Self::Buoyancy {
                velocity,
                temperature,
                density,
                ..
            } => [Some(velocity), Some(temperature), Some(density)],
            Self::Wave { height, .. } | Self::Normals { height, .. } => [Some(height), None, None],
            Self::Foam { foam, source, .. } => [Some(foam), Some(source), None],
            Self::DisplayDye { dye, .. } => [Some(dye), None, None],
            Self::DisplaySmoke { dye, foam, .. } => [Some(dye), Some(foam), None],
            Self::DisplayOcean {
                height,
                normals,
                foam,
                ..
            } => [Some(height), Some(normals), Some(foam)],
        }
    }

    /// Uniform values for the GPU parameter block
    #[must_use]
    pub fn params(&self) -> PassParams {
        let mut p = PassParams::default();
        match *self {
            Self::Advect {
                dt, dissipation, ..
            } => {
                p.dt = dt;
                p.k[0] = dissipation;
            }
            Self::Splat {
                point,
                value,
                radius,
                aspect,
                ..
            } => {
                p.point = point;
                p.value = value;
                p.k[0] = radius;
                p.k[1] = aspect;
            }
            Self::Curl { .. }
            | Self::Divergence { .. }
            | Self::Jacobi { .. }
            | Self::GradientSubtract { .. } => {}
            Self::Vorticity { strength, dt, .. } => {
                p.dt = dt;
                p.k[0] = strength;
            }
            Self::Buoyancy {
                dt,
                kappa,
                sigma,
                ambient,
                ..
            } => {
                p.dt = dt;
                p.k = [kappa, sigma, ambient, 0.0, 0.0];
            }
            Self::Wave {
                dt,
                damping,
                amplitude,
                wavenumber,
                frequency,
                time,
                ..
            } => {
                p.dt = dt;
                p.k = [damping, amplitude, wavenumber, frequency, time];
            }
            Self::Normals { strength, .. } => p.k[0] = strength,
            Self::Foam {
                decay,
                threshold,
                growth,
                surface,
                ..
            } => p.k = [decay, threshold, growth, f32::from(u8::from(surface)), 0.0],
            Self::DisplayDye {
                brightness,
                contrast,
                gamma,
                ..
            }
            | Self::DisplaySmoke {
                brightness,
                contrast,
                gamma,
                ..
            }
            | Self::DisplayOcean {
                brightness,
                contrast,
                gamma,
                ..
            } => p.k = [brightness, contrast, gamma, 0.0, 0.0],
        }
        p
    }
}

/// One kernel bound to its destination field
#[derive(Debug, Clone, PartialEq)]
pub struct KernelPass {
    pub kernel: Kernel,
    pub output: FieldHandle,
}

impl KernelPass {
    #[must_use]
    pub fn new(kernel: Kernel, output: FieldHandle) -> Self {
        Self { kernel, output }
    }
}

/// Read-only view of an authoritative buffer with clamped addressing
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sampler<'a> {
    data: &'a [f32],
    width: usize,
    height: usize,
    channels: usize,
}

impl<'a> Sampler<'a> {
    pub(crate) fn new(data: &'a [f32], width: usize, height: usize, channels: usize) -> Self {
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    /// Cell value with clamp-to-edge addressing; missing channels read as zero
    #[inline]
    pub(crate) fn fetch(&self, x: isize, y: isize) -> [f32; 4] {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        let base = (cy * self.width + cx) * self.channels;
        let mut out = [0.0; 4];
        out[..self.channels].copy_from_slice(&self.data[base..base + self.channels]);
        out
    }

    /// Bilinear sample at normalized coordinates, clamped like an edge-clamped texture
    pub(crate) fn bilinear(&self, u: f32, v: f32) -> [f32; 4] {
        let px = u * self.width as f32 - 0.5;
        let py = v * self.height as f32 - 0.5;
        let x0 = px.floor();
        let y0 = py.floor();
        let fx = px - x0;
        let fy = py - y0;
        let (x0, y0) = (x0 as isize, y0 as isize);

        let a = self.fetch(x0, y0);
        let b = self.fetch(x0 + 1, y0);
        let c = self.fetch(x0, y0 + 1);
        let d = self.fetch(x0 + 1, y0 + 1);

        let mut out = [0.0; 4];
        for i in 0..4 {
            let bottom = a[i] + (b[i] - a[i]) * fx;
            let top = c[i] + (d[i] - c[i]) * fx;
            out[i] = bottom + (top - bottom) * fy;
        }
        out
    }
}

/// Filmic curve (Narkowicz ACES fit), output in [0, 1]
#[inline]
pub(crate) fn aces(x: f32) -> f32 {
    let x = x.max(0.0);
    ((x * (2.51 * x + 0.03)) / (x * (2.43 * x + 0.59) + 0.14)).clamp(0.0, 1.0)
}

/// Brightness, contrast, tone curve and gamma for one colour channel
#[inline]
pub(crate) fn tone_map(value: f32, brightness: f32, contrast: f32, gamma: f32) -> f32 {
    let x = (value * brightness).max(0.0);
    let x = ((x - 0.5) * contrast + 0.5).max(0.0);
    aces(x).powf(1.0 / gamma)
}

fn normalize3(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len > 0.0 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        [0.0, 0.0, 1.0]
    }
}

/// Run `cell` for every grid cell and store the first `channels` values
fn for_each_cell<F>(grid: Grid, out: &mut [f32], channels: usize, mut cell: F)
where
    F: FnMut(usize, usize) -> [f32; 4],
{
    let width = grid.width() as usize;
    let height = grid.height() as usize;
    for y in 0..height {
        for x in 0..width {
            let value = cell(x, y);
            let base = (y * width + x) * channels;
            out[base..base + channels].copy_from_slice(&value[..channels]);
        }
    }
}

/// Evaluate one kernel over the whole grid on the host
///
/// `resolve` maps an input handle to a sampler over that field's authoritative
/// buffer. `out` is the destination's scratch buffer and is fully overwritten.
pub(crate) fn evaluate<'a, R>(
    kernel: &Kernel,
    grid: Grid,
    resolve: R,
    out: &mut [f32],
    channels: usize,
) -> Result<(), FluidError>
where
    R: Fn(FieldHandle) -> Result<Sampler<'a>, FluidError>,
{
    let (tx, ty) = grid.texel_size();

    match *kernel {
        Kernel::Advect {
            velocity,
            source,
            dt,
            dissipation,
        } => {
            let vel = resolve(velocity)?;
            let src = resolve(source)?;
            for_each_cell(grid, out, channels, |x, y| {
                let (u, v) = grid.cell_center(x, y);
                let w = vel.fetch(x as isize, y as isize);
                let sample = src.bilinear(u - dt * w[0] * tx, v - dt * w[1] * ty);
                sample.map(|s| s * dissipation)
            });
        }
        Kernel::Splat {
            target,
            point,
            value,
            radius,
            aspect,
        } => {
            let base = resolve(target)?;
            let inv_r2 = 1.0 / (radius * radius);
            for_each_cell(grid, out, channels, |x, y| {
                let (u, v) = grid.cell_center(x, y);
                let dx = (u - point[0]) * aspect;
                let dy = v - point[1];
                let falloff = (-(dx * dx + dy * dy) * inv_r2).exp();
                let current = base.fetch(x as isize, y as isize);
                std::array::from_fn(|i| current[i] + value[i] * falloff)
            });
        }
        Kernel::Curl { velocity } => {
            let vel = resolve(velocity)?;
            for_each_cell(grid, out, channels, |x, y| {
                let (x, y) = (x as isize, y as isize);
                let l = vel.fetch(x - 1, y);
                let r = vel.fetch(x + 1, y);
                let b = vel.fetch(x, y - 1);
                let t = vel.fetch(x, y + 1);
                [0.5 * ((r[1] - l[1]) - (t[0] - b[0])), 0.0, 0.0, 0.0]
            });
        }
        Kernel::Vorticity {
            velocity,
            curl,
            strength,
            dt,
        } => {
            let vel = resolve(velocity)?;
            let curl = resolve(curl)?;
            for_each_cell(grid, out, channels, |x, y| {
                let (x, y) = (x as isize, y as isize);
                let l = curl.fetch(x - 1, y)[0];
                let r = curl.fetch(x + 1, y)[0];
                let b = curl.fetch(x, y - 1)[0];
                let t = curl.fetch(x, y + 1)[0];
                let c = curl.fetch(x, y)[0];

                let mut fx = 0.5 * (t.abs() - b.abs());
                let mut fy = 0.5 * (r.abs() - l.abs());
                let len = (fx * fx + fy * fy).sqrt() + VORTICITY_EPSILON;
                fx = fx / len * strength * c;
                fy = -(fy / len * strength * c);

                let w = vel.fetch(x, y);
                [w[0] + fx * dt, w[1] + fy * dt, 0.0, 0.0]
            });
        }
        Kernel::Divergence { velocity } => {
            let vel = resolve(velocity)?;
            for_each_cell(grid, out, channels, |x, y| {
                let (x, y) = (x as isize, y as isize);
                let l = vel.fetch(x - 1, y);
                let r = vel.fetch(x + 1, y);
                let b = vel.fetch(x, y - 1);
                let t = vel.fetch(x, y + 1);
                [0.5 * ((r[0] - l[0]) + (t[1] - b[1])), 0.0, 0.0, 0.0]
            });
        }
        Kernel::Jacobi {
            pressure,
            divergence,
        } => {
            let p = resolve(pressure)?;
            let div = resolve(divergence)?;
            for_each_cell(grid, out, channels, |x, y| {
                let (x, y) = (x as isize, y as isize);
                let sum = p.fetch(x - 1, y)[0]
                    + p.fetch(x + 1, y)[0]
                    + p.fetch(x, y - 1)[0]
                    + p.fetch(x, y + 1)[0];
                [(sum - div.fetch(x, y)[0]) * 0.25, 0.0, 0.0, 0.0]
            });
        }
        Kernel::GradientSubtract { pressure, velocity } => {
            let p = resolve(pressure)?;
            let vel = resolve(velocity)?;
            for_each_cell(grid, out, channels, |x, y| {
                let (x, y) = (x as isize, y as isize);
                let gx = p.fetch(x + 1, y)[0] - p.fetch(x - 1, y)[0];
                let gy = p.fetch(x, y + 1)[0] - p.fetch(x, y - 1)[0];
                let w = vel.fetch(x, y);
                [w[0] - 0.5 * gx, w[1] - 0.5 * gy, 0.0, 0.0]
            });
        }
        Kernel::Buoyancy {
            velocity,
            temperature,
            density,
            dt,
            kappa,
            sigma,
            ambient,
        } => {
            let vel = resolve(velocity)?;
            let temp = resolve(temperature)?;
            let dens = resolve(density)?;
            for_each_cell(grid, out, channels, |x, y| {
                let (x, y) = (x as isize, y as isize);
                let w = vel.fetch(x, y);
                let t = temp.fetch(x, y)[0];
                let d = dens.fetch(x, y);
                let smoke = (d[0] + d[1] + d[2]) / 3.0;
                [w[0], w[1] + dt * (kappa * (t - ambient) - sigma * smoke), 0.0, 0.0]
            });
        }
        Kernel::Wave {
            height,
            dt,
            damping,
            amplitude,
            wavenumber,
            frequency,
            time,
        } => {
            let h = resolve(height)?;
            let step = dt * REFERENCE_FPS;
            for_each_cell(grid, out, channels, |x, y| {
                let (u, v) = grid.cell_center(x, y);
                let (x, y) = (x as isize, y as isize);
                let c = h.fetch(x, y);
                let laplacian = h.fetch(x - 1, y)[0]
                    + h.fetch(x + 1, y)[0]
                    + h.fetch(x, y - 1)[0]
                    + h.fetch(x, y + 1)[0]
                    - 4.0 * c[0];
                let swell = amplitude * (wavenumber * (u + 0.5 * v) - frequency * time).sin() * dt;
                let velocity = (c[1] + 0.5 * laplacian * step + swell) * damping;
                [(c[0] + velocity * step) * damping, velocity, 0.0, 0.0]
            });
        }
        Kernel::Normals { height, strength } => {
            let h = resolve(height)?;
            for_each_cell(grid, out, channels, |x, y| {
                let (x, y) = (x as isize, y as isize);
                let dx = 0.5 * (h.fetch(x - 1, y)[0] - h.fetch(x + 1, y)[0]) * strength;
                let dy = 0.5 * (h.fetch(x, y - 1)[0] - h.fetch(x, y + 1)[0]) * strength;
                let n = normalize3([dx, dy, 1.0]);
                [n[0], n[1], n[2], 0.0]
            });
        }
        Kernel::Foam {
            foam,
            source,
            decay,
            threshold,
            growth,
            surface,
        } => {
            let f = resolve(foam)?;
            let s = resolve(source)?;
            for_each_cell(grid, out, channels, |x, y| {
                let (x, y) = (x as isize, y as isize);
                let current = f.fetch(x, y)[0];
                let local = s.fetch(x, y);
                let energy = if surface {
                    let slope = 0.5
                        * ((s.fetch(x + 1, y)[0] - s.fetch(x - 1, y)[0]).abs()
                            + (s.fetch(x, y + 1)[0] - s.fetch(x, y - 1)[0]).abs());
                    local[1].abs() + slope
                } else {
                    local[0].abs() + local[1].abs()
                };
                let next = current * decay + growth * (energy - threshold).max(0.0);
                [next.clamp(0.0, 1.0), 0.0, 0.0, 0.0]
            });
        }
        Kernel::DisplayDye {
            dye,
            brightness,
            contrast,
            gamma,
        } => {
            let d = resolve(dye)?;
            for_each_cell(grid, out, channels, |x, y| {
                let c = d.fetch(x as isize, y as isize);
                [
                    tone_map(c[0], brightness, contrast, gamma),
                    tone_map(c[1], brightness, contrast, gamma),
                    tone_map(c[2], brightness, contrast, gamma),
                    1.0,
                ]
            });
        }
        Kernel::DisplaySmoke {
            dye,
            foam,
            brightness,
            contrast,
            gamma,
        } => {
            let d = resolve(dye)?;
            let f = resolve(foam)?;
            for_each_cell(grid, out, channels, |x, y| {
                let (x, y) = (x as isize, y as isize);
                let c = d.fetch(x, y);
                let lift = f.fetch(x, y)[0].clamp(0.0, 1.0) * SMOKE_FOAM_TINT;
                let mut rgb = [0.0; 3];
                for i in 0..3 {
                    let base = c[i].max(0.0);
                    let lifted = base + (1.0 - base).max(0.0) * lift;
                    rgb[i] = tone_map(lifted, brightness, contrast, gamma);
                }
                [rgb[0], rgb[1], rgb[2], 1.0]
            });
        }
        Kernel::DisplayOcean {
            height,
            normals,
            foam,
            brightness,
            contrast,
            gamma,
        } => {
            let h = resolve(height)?;
            let n = resolve(normals)?;
            let f = resolve(foam)?;
            let light = normalize3(OCEAN_LIGHT_DIR);
            for_each_cell(grid, out, channels, |x, y| {
                let (x, y) = (x as isize, y as isize);
                let height = h.fetch(x, y)[0];
                let raw = n.fetch(x, y);
                let normal = normalize3([raw[0], raw[1], raw[2]]);
                let foam = f.fetch(x, y)[0].clamp(0.0, 1.0);

                let depth_mix = (0.5 + height * 4.0).clamp(0.0, 1.0);
                let diffuse = (normal[0] * light[0] + normal[1] * light[1] + normal[2] * light[2])
                    .max(0.0);
                let shade = 0.35 + 0.65 * diffuse;

                let mut rgb = [0.0; 3];
                for i in 0..3 {
                    let base = OCEAN_DEEP[i] + (OCEAN_SHALLOW[i] - OCEAN_DEEP[i]) * depth_mix;
                    let lit = base * shade;
                    rgb[i] = tone_map(lit + (1.0 - lit) * foam, brightness, contrast, gamma);
                }
                [rgb[0], rgb[1], rgb[2], 1.0]
            });
        }
    }
    Ok(())
}
