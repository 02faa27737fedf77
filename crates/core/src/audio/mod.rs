use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::config::{validate_fft_size, AudioConfig};
use crate::Result;

/// Byte-scaled magnitude range produced for each frequency bin.
const BYTE_CEILING: f32 = 255.0;

/// Per-frame record handed from the audio collaborator to the orchestrator.
/// An empty `frequency_data` means no new audio arrived for this frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFrame {
    pub frequency_data: Vec<f32>,
    pub time_data: Vec<f32>,
}

impl AudioFrame {
    pub fn new(frequency_data: Vec<f32>, time_data: Vec<f32>) -> Self {
        Self {
            frequency_data,
            time_data,
        }
    }

    /// Frame without audio, used by seeking and redraws.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Zeroed frame with the layout the analyser produces for `fft_size`.
    pub fn silent(fft_size: usize) -> Self {
        Self::new(vec![0.0; fft_size / 2], vec![0.0; fft_size])
    }

    pub fn has_audio(&self) -> bool {
        !self.frequency_data.is_empty()
    }
}

/// Analyser that turns blocks of time-domain samples into [`AudioFrame`]s the
/// way a browser analyser node does: windowed real FFT, temporal smoothing of
/// the magnitudes, then decibels mapped onto `0..=255`.
pub struct AudioEngine {
    config: AudioConfig,
    fft_size: usize,
    smoothed: Vec<f32>,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl AudioEngine {
    pub fn new(config: AudioConfig, fft_size: usize) -> Result<Self> {
        let fft_size = validate_fft_size(fft_size)?;
        Ok(Self {
            config,
            fft_size,
            smoothed: vec![0.0; fft_size / 2],
            fft_planner: RealFftPlanner::new(),
            fft: None,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of frequency bins per frame (`fft_size / 2`).
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Changes the transform size. Cached buffers are re-derived and the
    /// smoothing history is dropped since bins no longer line up.
    pub fn set_fft_size(&mut self, fft_size: usize) -> Result<()> {
        self.fft_size = validate_fft_size(fft_size)?;
        self.smoothed = vec![0.0; fft_size / 2];
        Ok(())
    }

    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Analyses the most recent `fft_size` samples of `samples`; shorter
    /// blocks are zero-padded at the front.
    pub fn analyse(&mut self, samples: &[f32]) -> Result<AudioFrame> {
        let size = self.fft_size;
        let mut time_data = vec![0.0; size];
        let take = samples.len().min(size);
        time_data[size - take..].copy_from_slice(&samples[samples.len() - take..]);

        let smoothing = self.config.smoothing_time_constant.clamp(0.0, 0.999);
        let (min_db, max_db) = (self.config.min_decibels, self.config.max_decibels);
        let db_range = (max_db - min_db).max(f32::EPSILON);

        let fft = Self::prepare_fft(&mut self.fft, &mut self.fft_planner, size);
        for (index, value) in time_data.iter().enumerate() {
            fft.input[index] = *value * hann_value(index, size);
        }
        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let bins = size / 2;
        let scale = 1.0 / size as f32;
        let mut frequency_data = Vec::with_capacity(bins);
        for (bin, smoothed) in fft.spectrum.iter().take(bins).zip(self.smoothed.iter_mut()) {
            let magnitude = bin.norm() * scale;
            *smoothed = smoothing * *smoothed + (1.0 - smoothing) * magnitude;
            let db = 20.0 * smoothed.max(1e-12).log10();
            let byte = ((db - min_db) / db_range * BYTE_CEILING).clamp(0.0, BYTE_CEILING);
            frequency_data.push(byte.floor());
        }

        Ok(AudioFrame::new(frequency_data, time_data))
    }

    fn prepare_fft<'a>(
        slot: &'a mut Option<FftResources>,
        planner: &mut RealFftPlanner<f32>,
        size: usize,
    ) -> &'a mut FftResources {
        if slot.as_ref().map(|fft| fft.size != size).unwrap_or(true) {
            *slot = None;
        }

        slot.get_or_insert_with(|| {
            let plan = planner.plan_fft_forward(size);
            FftResources {
                size,
                scratch: plan.make_scratch_vec(),
                spectrum: plan.make_output_vec(),
                input: plan.make_input_vec(),
                plan,
            }
        })
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioEngine")
            .field("config", &self.config)
            .field("fft_size", &self.fft_size)
            .field("fft", &self.fft)
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(fft_size: usize) -> AudioEngine {
        let config = AudioConfig {
            smoothing_time_constant: 0.0,
            max_decibels: 0.0,
            ..AudioConfig::default()
        };
        AudioEngine::new(config, fft_size).unwrap()
    }

    #[test]
    fn silence_maps_to_zero_bins() {
        let mut audio = engine(256);
        let frame = audio.analyse(&[0.0; 256]).unwrap();
        assert_eq!(frame.frequency_data.len(), 128);
        assert_eq!(frame.time_data.len(), 256);
        assert!(frame.frequency_data.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let mut audio = engine(1024);
        let rate = audio.sample_rate() as f32;
        let bin = 40;
        let freq = bin as f32 * rate / 1024.0;
        let samples: Vec<f32> = (0..1024)
            .map(|i| (2.0 * PI * freq * i as f32 / rate).sin())
            .collect();

        let frame = audio.analyse(&samples).unwrap();
        let peak = frame
            .frequency_data
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, bin);
    }

    #[test]
    fn short_blocks_are_padded_and_size_changes_rebuild_buffers() {
        let mut audio = engine(512);
        let frame = audio.analyse(&[0.5; 100]).unwrap();
        assert_eq!(frame.time_data.len(), 512);
        assert_eq!(frame.time_data[0], 0.0);
        assert_eq!(frame.time_data[511], 0.5);

        audio.set_fft_size(256).unwrap();
        let frame = audio.analyse(&[0.5; 100]).unwrap();
        assert_eq!(frame.frequency_data.len(), 128);
        assert!(audio.set_fft_size(300).is_err());
    }

    #[test]
    fn silent_frame_matches_analyser_layout() {
        let frame = AudioFrame::silent(2048);
        assert_eq!(frame.frequency_data.len(), 1024);
        assert!(frame.has_audio());
        assert!(!AudioFrame::empty().has_audio());
    }
}
