use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::item::FrameContext;
use crate::config::Resolution;
use crate::params::{Parameter, ParameterSet};
use crate::render::RenderOp;
use crate::spectrum::{SpectrumAnalyser, SpectrumConfig};
use crate::{Result, SpectraError};

/// Upper bound on simulated particles regardless of the `count` parameter.
const MAX_PARTICLES: usize = 10_000;
/// Longest time step folded into particle motion, in seconds.
const MAX_PARTICLE_STEP: f64 = 0.1;
const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "webp", "gif", "bmp"];

/// Classic equaliser bars drawn from the analysed spectrum.
#[derive(Debug, Clone, Default)]
pub struct SpectrumBars {
    analyser: SpectrumAnalyser,
    last: Vec<f32>,
}

impl SpectrumBars {
    pub fn new() -> Self {
        Self {
            analyser: SpectrumAnalyser::new(SpectrumConfig::default()),
            last: Vec::new(),
        }
    }

    pub fn parameters() -> Vec<Parameter> {
        vec![
            Parameter::text("color", "#FFFFFF"),
            Parameter::number("alpha", 1.0).range(0.0, 1.0),
            Parameter::number("x", 0.0).range(-1.0, 1.0),
            Parameter::number("y", 0.5).range(-1.0, 1.0),
            Parameter::number("width", 0.8).range(0.0, 1.0),
            Parameter::number("heightScale", 1.0).range(0.0, 4.0),
        ]
    }

    pub fn analyser(&self) -> &SpectrumAnalyser {
        &self.analyser
    }

    pub fn analyser_mut(&mut self) -> &mut SpectrumAnalyser {
        &mut self.analyser
    }

    pub fn reset(&mut self) {
        self.analyser.reset();
        self.last.clear();
    }

    pub(crate) fn update(&mut self, ctx: &FrameContext<'_>, params: &ParameterSet) -> Vec<RenderOp> {
        if ctx.has_new_audio() {
            self.last = self.analyser.transform(&ctx.audio.frequency_data);
        }
        if self.last.is_empty() {
            return Vec::new();
        }

        let Resolution { width, height } = ctx.resolution;
        let span = params.number_f32("width") * width;
        let scale = params.number_f32("heightScale");
        let origin = [
            width / 2.0 + params.number_f32("x") * width / 2.0 - span / 2.0,
            height / 2.0 + params.number_f32("y") * height / 2.0,
        ];

        vec![RenderOp::Bars {
            color: params.text("color").to_string(),
            alpha: params.number_f32("alpha"),
            origin,
            width: span,
            heights: self.last.iter().map(|v| v * scale).collect(),
        }]
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Particle {
    position: [f32; 2],
    velocity: [f32; 2],
}

/// Drifting points that speed up with low-band energy. Positions live in
/// `[-1, 1]` on both axes and wrap at the edges.
#[derive(Debug, Clone)]
pub struct ParticleField {
    seed: u64,
    particles: Vec<Particle>,
    last_time: Option<f64>,
}

impl ParticleField {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            particles: Vec::new(),
            last_time: None,
        }
    }

    pub fn parameters() -> Vec<Parameter> {
        vec![
            Parameter::number("count", 200.0).range(0.0, MAX_PARTICLES as f64).step(1.0),
            Parameter::number("speed", 0.2).range(0.0, 5.0),
            Parameter::number("size", 2.0).range(0.5, 20.0),
            Parameter::text("color", "#FFFFFF"),
            Parameter::number("alpha", 1.0).range(0.0, 1.0),
            Parameter::number("reactivity", 2.0).range(0.0, 10.0),
            Parameter::number("bandEnd", 64.0).range(1.0, 1024.0).step(1.0),
        ]
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.particles.clear();
        self.last_time = None;
    }

    /// Lays out `count` particles; the same seed always gives the same field.
    fn spawn(&mut self, count: usize) {
        let mut rng = Pcg32::seed_from_u64(self.seed);
        self.particles = (0..count)
            .map(|_| {
                let angle = rng.gen_range(0.0..std::f32::consts::TAU);
                Particle {
                    position: [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)],
                    velocity: [angle.cos(), angle.sin()],
                }
            })
            .collect();
    }

    fn energy(ctx: &FrameContext<'_>, band_end: usize) -> f32 {
        let data = &ctx.audio.frequency_data;
        let band = &data[..band_end.min(data.len())];
        if band.is_empty() {
            return 0.0;
        }
        let mean = band.iter().filter(|v| v.is_finite()).sum::<f32>() / band.len() as f32;
        (mean / 255.0).clamp(0.0, 1.0)
    }

    pub(crate) fn update(&mut self, ctx: &FrameContext<'_>, params: &ParameterSet) -> Vec<RenderOp> {
        let count = (params.number("count").max(0.0).round() as usize).min(MAX_PARTICLES);
        if self.particles.len() != count {
            self.spawn(count);
        }

        if ctx.should_increment {
            let dt = self
                .last_time
                .map(|last| (ctx.time - last).clamp(0.0, MAX_PARTICLE_STEP))
                .unwrap_or(0.0) as f32;
            let band_end = params.number("bandEnd").max(1.0) as usize;
            let boost = 1.0 + params.number_f32("reactivity") * Self::energy(ctx, band_end);
            let step = params.number_f32("speed") * boost * dt;

            for particle in &mut self.particles {
                for axis in 0..2 {
                    let moved = particle.position[axis] + particle.velocity[axis] * step;
                    particle.position[axis] = (moved + 1.0).rem_euclid(2.0) - 1.0;
                }
            }
            self.last_time = Some(ctx.time);
        }

        if self.particles.is_empty() {
            return Vec::new();
        }

        let Resolution { width, height } = ctx.resolution;
        vec![RenderOp::Particles {
            color: params.text("color").to_string(),
            alpha: params.number_f32("alpha"),
            size: params.number_f32("size"),
            positions: self
                .particles
                .iter()
                .map(|p| {
                    [
                        (p.position[0] + 1.0) / 2.0 * width,
                        (p.position[1] + 1.0) / 2.0 * height,
                    ]
                })
                .collect(),
        }]
    }
}

/// Static picture placed on the layer. The source is resolved by the render
/// collaborator; only its format is checked here.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageSprite;

impl ImageSprite {
    pub fn parameters() -> Vec<Parameter> {
        vec![
            Parameter::text("source", ""),
            Parameter::number("x", 0.0).range(-2.0, 2.0),
            Parameter::number("y", 0.0).range(-2.0, 2.0),
            Parameter::number("scale", 1.0).range(0.0, 10.0),
            Parameter::number("alpha", 1.0).range(0.0, 1.0),
        ]
    }

    pub(crate) fn update(&self, ctx: &FrameContext<'_>, params: &ParameterSet) -> Result<Vec<RenderOp>> {
        let source = params.text("source");
        if source.is_empty() {
            return Ok(Vec::new());
        }

        let supported = source
            .rsplit_once('.')
            .map(|(_, ext)| {
                IMAGE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false);
        if !supported {
            return Err(SpectraError::config(format!(
                "unsupported image source `{source}`"
            )));
        }

        let Resolution { width, height } = ctx.resolution;
        Ok(vec![RenderOp::Image {
            source: source.to_string(),
            alpha: params.number_f32("alpha"),
            center: [
                width / 2.0 + params.number_f32("x") * width / 2.0,
                height / 2.0 + params.number_f32("y") * height / 2.0,
            ],
            scale: params.number_f32("scale"),
        }])
    }
}
