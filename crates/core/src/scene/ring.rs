//! Mirrored multi-layer spectrum ring with a pulsing emblem and audio driven
//! camera shake, after the js.nation visualiser.

use std::collections::VecDeque;
use std::f32::consts::PI;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::item::FrameContext;
use crate::config::Resolution;
use crate::params::{Parameter, ParameterSet};
use crate::render::RenderOp;
use crate::spectrum::{SpectrumAnalyser, SpectrumConfig};

const MIN_SHAKE_SCALAR: f32 = 0.9;
const MAX_SHAKE_SCALAR: f32 = 1.6;
/// Exponent of the falloff that flattens the ring towards its bottom.
const OUTLINE_DROPOFF_EXP: f32 = 4.0;

/// One coloured outline of the ring. Higher `delay` layers trail behind the
/// live spectrum by that many frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorLayer {
    pub enabled: bool,
    pub exponent: f32,
    pub color: String,
    pub delay: usize,
    pub smooth_margin: usize,
}

impl ColorLayer {
    pub fn defaults() -> Vec<ColorLayer> {
        const COLORS: [&str; 8] = [
            "#FFFFFF", "#FFFF00", "#FF0000", "#FF66FF", "#333399", "#0000FF", "#33CCFF", "#00FF00",
        ];
        const EXPONENTS: [f32; 8] = [1.0, 1.12, 1.14, 1.3, 1.33, 1.36, 1.5, 1.52];
        const MARGINS: [usize; 8] = [0, 2, 2, 3, 3, 3, 5, 5];

        COLORS
            .iter()
            .zip(EXPONENTS)
            .zip(MARGINS)
            .enumerate()
            .map(|(delay, ((color, exponent), smooth_margin))| ColorLayer {
                enabled: true,
                exponent,
                color: color.to_string(),
                delay,
                smooth_margin,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Shake {
    sum: [f32; 2],
    frame: [f32; 2],
    speed: [f32; 2],
    amplitude: [f32; 2],
    use_sin: [bool; 2],
}

struct ShakeTuning {
    intensity: f32,
    displacement: f32,
    movement: f32,
    wave_duration: f32,
}

impl Shake {
    fn new(rng: &mut Pcg32) -> Self {
        Self {
            sum: [0.0; 2],
            frame: [0.0; 2],
            speed: [1.0; 2],
            amplitude: [1.0; 2],
            use_sin: [rng.gen(), rng.gen()],
        }
    }

    fn step(&mut self, multiplier: f32, tuning: &ShakeTuning, rng: &mut Pcg32) {
        let step = tuning.intensity * multiplier;
        for axis in 0..2 {
            self.frame[axis] += step * self.speed[axis];
            if self.frame[axis].abs() > tuning.wave_duration {
                self.frame[axis] = 0.0;
                self.amplitude[axis] = random_scalar(rng) * direction(self.sum[axis], rng);
                self.speed[axis] = random_scalar(rng) * direction(self.sum[axis], rng);
                self.use_sin[axis] = rng.gen();
            }

            let wave = if self.use_sin[axis] {
                self.frame[axis].sin()
            } else {
                self.frame[axis].cos()
            };
            self.sum[axis] +=
                wave * tuning.displacement * self.amplitude[axis] * multiplier * tuning.movement;
        }
    }
}

fn random_scalar(rng: &mut Pcg32) -> f32 {
    rng.gen_range(MIN_SHAKE_SCALAR..MAX_SHAKE_SCALAR)
}

/// Pulls the shake back towards the centre the further it has drifted.
fn direction(current: f32, rng: &mut Pcg32) -> f32 {
    let sign = if current > 0.0 { 1.0 } else { -1.0 };
    let pull = sign * current.abs().powf(0.08);
    if pull + rng.gen::<f32>() > 1.0 {
        -1.0
    } else {
        1.0
    }
}

#[derive(Debug, Clone)]
pub struct SpectrumRing {
    analyser: SpectrumAnalyser,
    colors: Vec<ColorLayer>,
    spectrum_cache: VecDeque<Vec<f32>>,
    /// Spectrum each colour layer drew last, reused on redraws.
    previous: Vec<Vec<f32>>,
    prev_rad: Option<f32>,
    shake: Shake,
    seed: u64,
    rng: Pcg32,
}

impl SpectrumRing {
    pub fn new(seed: u64) -> Self {
        let mut rng = Pcg32::seed_from_u64(seed);
        let colors = ColorLayer::defaults();
        Self {
            analyser: SpectrumAnalyser::new(Self::analyser_defaults()),
            previous: vec![Vec::new(); colors.len()],
            colors,
            spectrum_cache: VecDeque::new(),
            prev_rad: None,
            shake: Shake::new(&mut rng),
            seed,
            rng,
        }
    }

    fn analyser_defaults() -> SpectrumConfig {
        SpectrumConfig {
            spectrum_size: 40,
            spectrum_height: 770.0,
            spectrum_end: 400,
            enable_dropoff_smoothing_transform: false,
            smoothing_time_constant: 0.03,
            ..SpectrumConfig::default()
        }
    }

    pub fn parameters(resolution: Resolution) -> Vec<Parameter> {
        let width = f64::from(resolution.width);
        vec![
            Parameter::number("alpha", 1.0).range(0.0, 1.0),
            Parameter::choice("drawType", "fill", &["fill", "stroke"]),
            Parameter::number("lineWidth", 2.0).range(0.0, 30.0).step(1.0),
            Parameter::number("x", 0.0).range(-2.0, 2.0),
            Parameter::number("y", 0.0).range(-2.0, 2.0),
            Parameter::number("scale", 1.1).range(0.01, 6.0),
            Parameter::number("spectrumRotation", 0.0)
                .range(0.0, std::f64::consts::FRAC_PI_2)
                .step(0.00001),
            Parameter::flag("invertSpectrum", false),
            Parameter::number("spectrumHeightScalar", 0.31).range(0.0, 2.0),
            Parameter::number("minRadius", width / 8.0).range(10.0, width / 4.0),
            Parameter::flag("emblemVisible", true),
            Parameter::number("emblemAlpha", 1.0).range(0.0, 1.0),
            Parameter::number("emblemExponential", 0.8)
                .range(0.2, 1.6)
                .step(0.00001),
            Parameter::number("emblemExaggeration", 1.82)
                .range(0.2, 5.0)
                .step(0.00001),
            Parameter::number("waveDuration", std::f64::consts::PI / 8.0)
                .range(0.0, std::f64::consts::PI * 16.0),
            Parameter::number("movementAmount", 1.0).range(0.0, 12.0),
            Parameter::number("maxShakeIntensity", std::f64::consts::PI / 3.0).range(0.0, 30.0),
            Parameter::number("maxShakeDisplacement", 4.0).range(0.0, 180.0),
        ]
    }

    pub fn analyser(&self) -> &SpectrumAnalyser {
        &self.analyser
    }

    pub fn analyser_mut(&mut self) -> &mut SpectrumAnalyser {
        &mut self.analyser
    }

    pub fn colors(&self) -> &[ColorLayer] {
        &self.colors
    }

    pub fn colors_mut(&mut self) -> &mut Vec<ColorLayer> {
        &mut self.colors
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.reset();
    }

    /// Accumulated shake offset in pixels.
    pub fn shake_offset(&self) -> [f32; 2] {
        self.shake.sum
    }

    pub fn reset(&mut self) {
        self.analyser.reset();
        self.spectrum_cache.clear();
        self.previous = vec![Vec::new(); self.colors.len()];
        self.prev_rad = None;
        self.rng = Pcg32::seed_from_u64(self.seed);
        self.shake = Shake::new(&mut self.rng);
    }

    fn max_buffer_size(&self) -> usize {
        self.colors
            .iter()
            .map(|c| c.delay)
            .max()
            .unwrap_or(0)
            .max(1)
    }

    pub(crate) fn update(&mut self, ctx: &FrameContext<'_>, params: &ParameterSet) -> Vec<RenderOp> {
        let Resolution { width, height } = ctx.resolution;
        let scale = params.number_f32("scale");
        let min_rad = params.number_f32("minRadius") * scale;
        let fresh = ctx.has_new_audio();
        self.previous.resize(self.colors.len(), Vec::new());

        let mut cur_rad = self.prev_rad.unwrap_or(min_rad).max(min_rad);
        if fresh {
            let spectrum = self.analyser.transform(&ctx.audio.frequency_data);
            let mult = multiplier(&spectrum).powf(params.number_f32("emblemExponential"))
                * params.number_f32("emblemExaggeration");
            let tuning = ShakeTuning {
                intensity: params.number_f32("maxShakeIntensity"),
                displacement: params.number_f32("maxShakeDisplacement"),
                movement: params.number_f32("movementAmount"),
                wave_duration: params.number_f32("waveDuration"),
            };
            self.shake.step(mult / 32.0, &tuning, &mut self.rng);

            let max_size = width / 4.0;
            let radius = (mult * (max_size - min_rad) + min_rad) / 2.0;
            cur_rad = (radius * scale).max(min_rad);

            if self.spectrum_cache.len() >= self.max_buffer_size() {
                self.spectrum_cache.pop_front();
            }
            self.spectrum_cache.push_back(spectrum);

            let cached = self.spectrum_cache.len();
            for (layer, previous) in self.colors.iter().zip(self.previous.iter_mut()) {
                let index = cached.saturating_sub(layer.delay + 1);
                if let Some(spectrum) = self.spectrum_cache.get(index) {
                    previous.clone_from(spectrum);
                }
            }
        }

        let center = [
            (params.number_f32("x") * width / 2.0).floor() + self.shake.sum[0] + width / 2.0,
            (params.number_f32("y") * height / 2.0).floor() + self.shake.sum[1] + height / 2.0,
        ];
        let outline = Outline {
            center,
            radius: cur_rad,
            scale,
            rotation: params.number_f32("spectrumRotation"),
            height_scalar: params.number_f32("spectrumHeightScalar"),
            invert: params.flag("invertSpectrum"),
        };

        let fill = params.text("drawType") == "fill";
        let alpha = params.number_f32("alpha");
        let line_width = params.number_f32("lineWidth");

        let mut ops = Vec::new();
        for (layer, spectrum) in self.colors.iter().zip(&self.previous).rev() {
            if !layer.enabled || spectrum.len() <= 4 {
                continue;
            }
            let smoothed = smooth_margin(spectrum, layer.smooth_margin);
            ops.push(RenderOp::Shape {
                color: layer.color.clone(),
                alpha,
                fill,
                line_width,
                points: outline.points(&smoothed, layer.exponent),
            });
        }

        if params.flag("emblemVisible") {
            ops.push(RenderOp::Emblem {
                center,
                radius: cur_rad,
                alpha: params.number_f32("emblemAlpha"),
            });
        }

        self.prev_rad = Some(cur_rad);
        ops
    }
}

struct Outline {
    center: [f32; 2],
    radius: f32,
    scale: f32,
    rotation: f32,
    height_scalar: f32,
    invert: bool,
}

impl Outline {
    /// Right half of the ring from top to bottom, then the mirrored left half
    /// back up, giving one closed outline.
    fn points(&self, spectrum: &[f32], exponent: f32) -> Vec<[f32; 2]> {
        let len = spectrum.len();
        let invert = if self.invert { -1.0 } else { 1.0 };
        let half: Vec<[f32; 2]> = spectrum
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let t = PI * (i as f32 / (len - 1) as f32) - PI / 2.0 + self.rotation;
                let dropoff = 1.0 - (i as f32 / len as f32).powf(OUTLINE_DROPOFF_EXP);
                let r = self.radius
                    + (value * self.height_scalar).powf(exponent) * dropoff * self.scale;
                [r * t.cos(), invert * r * t.sin()]
            })
            .collect();

        let [cx, cy] = self.center;
        half.iter()
            .map(|[x, y]| [cx + x, cy + y])
            .chain(half.iter().rev().map(|[x, y]| [cx - x, cy + y]))
            .collect()
    }
}

/// Loudness estimate in `[0, 1]` driving the emblem and the shake.
fn multiplier(spectrum: &[f32]) -> f32 {
    if spectrum.is_empty() {
        return 0.0;
    }
    let transformer = 1.2_f32;
    let mean = spectrum.iter().sum::<f32>() / spectrum.len() as f32;
    let intermediate = (mean / 256.0).clamp(0.0, 1.0);
    let curve =
        (1.0 / (transformer - 1.0)) * (-intermediate.powf(transformer) + transformer * intermediate);
    curve.clamp(0.0, 1.0)
}

/// Triangular weighted average over `margin` neighbours on each side,
/// narrowing near the edges.
fn smooth_margin(points: &[f32], margin: usize) -> Vec<f32> {
    if margin == 0 || points.is_empty() {
        return points.to_vec();
    }

    let last = points.len() - 1;
    (0..points.len())
        .map(|i| {
            let reach = margin.min(i).min(last - i);
            let mut sum = 0.0;
            let mut weights = 0.0;
            for j in 0..=reach {
                let weight = (margin - j + 1) as f32;
                if j == 0 {
                    sum += points[i] * weight;
                    weights += weight;
                } else {
                    sum += (points[i - j] + points[i + j]) * weight;
                    weights += 2.0 * weight;
                }
            }
            sum / weights
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AudioFrame;

    fn params() -> ParameterSet {
        ParameterSet::new(SpectrumRing::parameters(Resolution::default()))
    }

    fn ctx<'a>(audio: &'a AudioFrame, should_increment: bool) -> FrameContext<'a> {
        FrameContext {
            time: 0.0,
            audio,
            should_increment,
            resolution: Resolution::default(),
        }
    }

    fn loud() -> AudioFrame {
        AudioFrame::new((0..512).map(|i| (i % 200) as f32).collect(), Vec::new())
    }

    #[test]
    fn draws_enabled_layers_and_emblem() {
        let mut ring = SpectrumRing::new(7);
        let ops = ring.update(&ctx(&loud(), true), &params());
        let shapes = ops
            .iter()
            .filter(|op| matches!(op, RenderOp::Shape { .. }))
            .count();
        assert_eq!(shapes, 8);
        assert!(matches!(ops.last(), Some(RenderOp::Emblem { .. })));

        ring.colors_mut()[3].enabled = false;
        let ops = ring.update(&ctx(&loud(), true), &params());
        assert_eq!(ops.len(), 8);
    }

    #[test]
    fn redraw_repeats_previous_frame() {
        let mut ring = SpectrumRing::new(3);
        let first = ring.update(&ctx(&loud(), true), &params());
        let shake = ring.shake_offset();
        let again = ring.update(&ctx(&loud(), false), &params());
        let empty = ring.update(&ctx(&AudioFrame::empty(), true), &params());

        assert_eq!(first, again);
        assert_eq!(first, empty);
        assert_eq!(ring.shake_offset(), shake);
    }

    #[test]
    fn same_seed_gives_same_motion() {
        let mut a = SpectrumRing::new(11);
        let mut b = SpectrumRing::new(11);
        for _ in 0..20 {
            a.update(&ctx(&loud(), true), &params());
            b.update(&ctx(&loud(), true), &params());
        }
        assert_eq!(a.shake_offset(), b.shake_offset());

        a.reset();
        assert_eq!(a.shake_offset(), [0.0, 0.0]);
        assert!(a.update(&ctx(&AudioFrame::empty(), false), &params()).len() == 1);
    }

    #[test]
    fn smoothing_keeps_constant_signal() {
        let smoothed = smooth_margin(&[5.0; 10], 3);
        assert!(smoothed.iter().all(|v| (v - 5.0).abs() < 1e-5));
        assert_eq!(smooth_margin(&[1.0, 2.0], 0), vec![1.0, 2.0]);
    }

    #[test]
    fn outline_is_closed_and_mirrored() {
        let outline = Outline {
            center: [100.0, 100.0],
            radius: 10.0,
            scale: 1.0,
            rotation: 0.0,
            height_scalar: 0.0,
            invert: false,
        };
        let points = outline.points(&[0.0; 6], 1.0);
        assert_eq!(points.len(), 12);
        let (first, last) = (points[0], points[11]);
        assert!((first[0] - 100.0).abs() < 1e-4 && (last[0] - 100.0).abs() < 1e-4);
        assert!((points[0][1] - 90.0).abs() < 1e-4);
    }
}
