use serde::{Deserialize, Serialize};

/// Tuning for [`ImpactAnalyser`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImpactSettings {
    /// First frequency bin of the watched band.
    pub bin_start: usize,
    /// One past the last watched bin; clamped to the frame length.
    pub bin_end: usize,
    pub gain: f32,
    pub threshold: f32,
    /// Seconds that must pass before another impact can trigger.
    pub min_interval: f32,
    /// Envelope retention per incremented frame.
    pub decay: f32,
    pub amplitude: f32,
    pub input_ceiling: f32,
}

impl Default for ImpactSettings {
    fn default() -> Self {
        Self {
            bin_start: 0,
            bin_end: 32,
            gain: 12.0,
            threshold: 0.6,
            min_interval: 0.2,
            decay: 0.9,
            amplitude: 1.0,
            input_ceiling: 255.0,
        }
    }
}

/// Turns rising band energy into a decaying impact envelope. Only the
/// envelope state lives here; the tuning is passed in on every update so it
/// can be persisted separately.
#[derive(Debug, Clone, Default)]
pub struct ImpactAnalyser {
    last_energy: f32,
    envelope: f32,
    last_trigger: Option<f32>,
}

impl ImpactAnalyser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advances the envelope with a new frame. Without new audio, or when the
    /// frame must not advance accumulators, the current envelope is returned
    /// untouched.
    pub fn update(
        &mut self,
        settings: &ImpactSettings,
        time: f32,
        frequency_data: &[f32],
        should_increment: bool,
    ) -> f32 {
        if !should_increment || frequency_data.is_empty() {
            return self.envelope;
        }

        let energy = band_energy(settings, frequency_data);
        let delta = (energy - self.last_energy).max(0.0);
        self.last_energy = energy;
        let confidence = (delta * settings.gain).clamp(0.0, 1.0);

        self.envelope *= settings.decay.clamp(0.0, 1.0);

        if confidence >= settings.threshold {
            let ready = self
                .last_trigger
                .map(|last| time < last || time - last >= settings.min_interval)
                .unwrap_or(true);
            if ready {
                self.envelope = self.envelope.max(settings.amplitude * confidence);
                self.last_trigger = Some(time);
            }
        }

        self.envelope
    }
}

fn band_energy(settings: &ImpactSettings, frequency_data: &[f32]) -> f32 {
    let end = settings.bin_end.min(frequency_data.len());
    let start = settings.bin_start.min(end);
    let band = &frequency_data[start..end];
    if band.is_empty() || settings.input_ceiling <= 0.0 {
        return 0.0;
    }

    let sum: f32 = band
        .iter()
        .filter(|v| v.is_finite())
        .map(|v| v.max(0.0))
        .sum();
    sum / band.len() as f32 / settings.input_ceiling
}
