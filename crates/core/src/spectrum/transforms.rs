//! Individual spectrum stages. Every stage is a pure function of the current
//! frame, the analyser configuration and, for the temporal stages, the frame
//! produced on the previous update.

use super::SpectrumConfig;

/// Replaces negative and non-finite magnitudes with zero.
pub fn sanitize(frame: &[f32]) -> Vec<f32> {
    frame
        .iter()
        .map(|v| if v.is_finite() && *v > 0.0 { *v } else { 0.0 })
        .collect()
}

/// Limits how fast a bin may fall: each value keeps at least
/// `1 - dropoff_amount` of the previous frame's value at the same index.
pub fn smooth_dropoff(frame: &[f32], previous: &[f32], dropoff_amount: f32) -> Vec<f32> {
    if previous.len() != frame.len() {
        return frame.to_vec();
    }

    let retain = (1.0 - dropoff_amount).clamp(0.0, 1.0);
    frame
        .iter()
        .zip(previous)
        .map(|(current, prev)| current.max(prev * retain))
        .collect()
}

/// Resamples the raw FFT bins down to `spectrum_size` visual bins. Bins are
/// spread with a power curve so the low end, where most musical energy sits,
/// gets more resolution.
pub fn combine_bins(frame: &[f32], config: &SpectrumConfig) -> Vec<f32> {
    let size = config.spectrum_size;
    let mut out = vec![0.0; size];
    if frame.is_empty() || size == 0 {
        return out;
    }

    let last = frame.len() - 1;
    let start = config.spectrum_start.min(last) as f32;
    let end = config.spectrum_end.min(last) as f32;
    let span = (end - start).max(0.0);

    for (i, slot) in out.iter_mut().enumerate() {
        let position = (i as f32 / size as f32).powf(config.spectrum_scale) * span + start;
        let lower = (position.floor() as usize).min(last);
        let upper = (lower + 1).min(last);
        let fraction = position - lower as f32;
        *slot = frame[lower] * (1.0 - fraction) + frame[upper] * fraction;
    }

    out
}

/// Truncates or zero-pads to `size` without touching the value ordering.
pub fn fit_to_size(mut frame: Vec<f32>, size: usize) -> Vec<f32> {
    frame.resize(size, 0.0);
    frame
}

pub fn log_transform(frame: &[f32], config: &SpectrumConfig) -> Vec<f32> {
    let ceiling = config.input_ceiling;
    if ceiling <= 0.0 {
        return frame.to_vec();
    }

    let scale = ceiling / ceiling.ln_1p();
    frame.iter().map(|v| v.ln_1p() * scale).collect()
}

pub fn normalize_amplitude(frame: &[f32], config: &SpectrumConfig) -> Vec<f32> {
    let ceiling = config.input_ceiling;
    if ceiling <= 0.0 {
        return frame.to_vec();
    }

    frame
        .iter()
        .map(|v| {
            let scaled = v / ceiling * config.spectrum_height;
            if config.should_cap_height {
                scaled.min(config.spectrum_height)
            } else {
                scaled
            }
        })
        .collect()
}

/// Temporal low-pass against the previous output frame.
pub fn average_transform(frame: &[f32], previous: &[f32], config: &SpectrumConfig) -> Vec<f32> {
    if previous.len() != frame.len() {
        return frame.to_vec();
    }

    let weight = config.smoothing_time_constant.clamp(0.0, 1.0);
    frame
        .iter()
        .zip(previous)
        .map(|(current, prev)| prev * weight + current * (1.0 - weight))
        .collect()
}

/// Per-bin inertia: a falling bin keeps `tail_decay` of its previous value.
pub fn tail_transform(frame: &[f32], previous: &[f32], config: &SpectrumConfig) -> Vec<f32> {
    if previous.len() != frame.len() {
        return frame.to_vec();
    }

    let decay = config.tail_decay.clamp(0.0, 1.0);
    frame
        .iter()
        .zip(previous)
        .map(|(current, prev)| {
            if current < prev {
                current.max(prev * decay)
            } else {
                *current
            }
        })
        .collect()
}

/// Spatial moving average followed by head/tail margin weighting, repeated
/// `smoothing_passes` times.
pub fn smooth(frame: &[f32], config: &SpectrumConfig) -> Vec<f32> {
    if config.smoothing_points == 0 {
        return frame.to_vec();
    }

    let side = config.smoothing_points / 2;
    let mut points = frame.to_vec();
    for _ in 0..config.smoothing_passes {
        points = moving_average(&points, side);
        apply_margin_weights(&mut points, config);
    }
    points
}

fn moving_average(points: &[f32], side: usize) -> Vec<f32> {
    let len = points.len();
    let mut out = points.to_vec();
    if side == 0 || len < 2 * side + 1 {
        return out;
    }

    let window = (2 * side + 1) as f32;
    for i in side..len - side {
        let sum: f32 = points[i - side..=i + side].iter().sum();
        out[i] = sum / window;
    }
    out
}

fn apply_margin_weights(points: &mut [f32], config: &SpectrumConfig) {
    let len = points.len();
    let weight = |slope: f32, distance: usize| {
        (slope * ((distance + 1) as f32).powf(config.margin_decay) + config.min_margin_weight)
            .max(0.0)
    };

    for k in 0..config.head_margin.min(len) {
        points[k] *= weight(config.head_margin_slope, k);
    }
    for k in 0..config.tail_margin.min(len) {
        points[len - 1 - k] *= weight(config.tail_margin_slope, k);
    }
}

/// Emphasises peaks with an exponent that falls from `spectrum_max_exponent`
/// at the low end to `spectrum_min_exponent` at the high end.
pub fn exponential_transform(frame: &[f32], config: &SpectrumConfig) -> Vec<f32> {
    let height = config.spectrum_height;
    if height <= 0.0 || frame.is_empty() {
        return frame.to_vec();
    }

    let size = frame.len() as f32;
    let span = config.spectrum_max_exponent - config.spectrum_min_exponent;
    frame
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let exponent = span * (1.0 - (i as f32 / size).powf(config.spectrum_exponent_scale))
                + config.spectrum_min_exponent;
            (v / height).powf(exponent) * height
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SpectrumConfig {
        SpectrumConfig::default()
    }

    #[test]
    fn dropoff_ignores_previous_frame_of_other_length() {
        let out = smooth_dropoff(&[1.0, 2.0], &[10.0], 0.2);
        assert_eq!(out, vec![1.0, 2.0]);
    }

    #[test]
    fn combine_bins_resamples_to_configured_size() {
        let cfg = SpectrumConfig {
            spectrum_size: 4,
            spectrum_start: 0,
            spectrum_end: 8,
            spectrum_scale: 1.0,
            ..config()
        };
        let raw: Vec<f32> = (0..9).map(|v| v as f32).collect();
        assert_eq!(combine_bins(&raw, &cfg), vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn combine_bins_clamps_range_to_input_length() {
        let cfg = SpectrumConfig {
            spectrum_size: 3,
            spectrum_end: 10_000,
            ..config()
        };
        let out = combine_bins(&[5.0; 16], &cfg);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|v| (v - 5.0).abs() < 1e-5));
    }

    #[test]
    fn log_transform_keeps_full_scale_fixed() {
        let out = log_transform(&[0.0, 255.0], &config());
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 255.0).abs() < 1e-3);
    }

    #[test]
    fn normalize_caps_when_requested() {
        let cfg = SpectrumConfig {
            should_cap_height: true,
            spectrum_height: 100.0,
            ..config()
        };
        let out = normalize_amplitude(&[255.0, 510.0], &cfg);
        assert_eq!(out, vec![100.0, 100.0]);
    }

    #[test]
    fn average_weights_previous_frame_by_time_constant() {
        let cfg = SpectrumConfig {
            smoothing_time_constant: 0.25,
            ..config()
        };
        let out = average_transform(&[8.0, 0.0], &[0.0, 8.0], &cfg);
        assert_eq!(out, vec![6.0, 2.0]);

        let held = SpectrumConfig {
            smoothing_time_constant: 3.0,
            ..config()
        };
        assert_eq!(average_transform(&[8.0], &[4.0], &held), vec![4.0]);
    }

    #[test]
    fn average_passes_frame_through_without_matching_history() {
        let out = average_transform(&[1.0, 2.0], &[], &config());
        assert_eq!(out, vec![1.0, 2.0]);
        let out = average_transform(&[1.0, 2.0], &[5.0], &config());
        assert_eq!(out, vec![1.0, 2.0]);
    }

    #[test]
    fn tail_only_slows_falling_bins() {
        let cfg = SpectrumConfig {
            tail_decay: 0.5,
            ..config()
        };
        let out = tail_transform(&[10.0, 1.0], &[5.0, 10.0], &cfg);
        assert_eq!(out, vec![10.0, 5.0]);
    }

    #[test]
    fn smoothing_with_zero_points_is_identity() {
        let cfg = SpectrumConfig {
            smoothing_points: 0,
            ..config()
        };
        let frame = vec![3.0, 9.0, 1.0, 4.0];
        assert_eq!(smooth(&frame, &cfg), frame);
    }

    #[test]
    fn moving_average_keeps_edges() {
        let out = moving_average(&[0.0, 3.0, 6.0, 0.0], 1);
        assert_eq!(out, vec![0.0, 3.0, 3.0, 0.0]);
    }

    #[test]
    fn head_margin_attenuates_first_bins() {
        let cfg = SpectrumConfig {
            smoothing_points: 1,
            head_margin: 2,
            tail_margin: 0,
            head_margin_slope: 0.0,
            min_margin_weight: 0.5,
            ..config()
        };
        assert_eq!(smooth(&[4.0, 4.0, 4.0], &cfg), vec![2.0, 2.0, 4.0]);
    }

    #[test]
    fn exponential_leaves_full_height_bins_in_place() {
        let cfg = SpectrumConfig {
            spectrum_height: 100.0,
            ..config()
        };
        let out = exponential_transform(&[100.0, 50.0], &cfg);
        assert!((out[0] - 100.0).abs() < 1e-3);
        assert!(out[1] < 50.0);
    }
}
