use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, SpectraError};

/// Smallest and largest FFT sizes accepted by the audio analyser.
pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32_768;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub render: RenderConfig,
}

impl AppConfig {
    pub fn offline_defaults() -> Self {
        Self::default()
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Temporal smoothing applied to FFT magnitudes, in `[0, 1)`.
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

/// Output surface the scenes are laid out against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 60,
        }
    }
}

impl RenderConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width as f32, self.height as f32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: f32,
    pub height: f32,
}

impl Resolution {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(1280.0, 720.0)
    }
}

/// Project-global settings persisted under the `settings` key of a project
/// document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    pub clear_color: String,
    pub clear_alpha: f64,
    pub postprocessing_enabled: bool,
    pub fft_size: usize,
    pub project_name: String,
    pub project_id: Uuid,
    pub available_public: bool,
    pub draw_attribution: bool,
    /// How many times per second UI controllers refresh automated values.
    pub config_update_frequency: u32,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            clear_color: "#000000".to_string(),
            clear_alpha: 1.0,
            postprocessing_enabled: false,
            fft_size: 16_384,
            project_name: "ProjectName".to_string(),
            project_id: Uuid::new_v4(),
            available_public: false,
            draw_attribution: false,
            config_update_frequency: 30,
        }
    }
}

/// Accepts FFT sizes the way a browser analyser node does: powers of two
/// between [`MIN_FFT_SIZE`] and [`MAX_FFT_SIZE`].
pub fn validate_fft_size(size: usize) -> Result<usize> {
    if size.is_power_of_two() && (MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&size) {
        Ok(size)
    } else {
        Err(SpectraError::config(format!(
            "fft size {size} must be a power of two between {MIN_FFT_SIZE} and {MAX_FFT_SIZE}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fft_size_must_be_power_of_two_in_range() {
        assert_eq!(validate_fft_size(2048).unwrap(), 2048);
        assert!(validate_fft_size(1000).is_err());
        assert!(validate_fft_size(16).is_err());
        assert!(validate_fft_size(65_536).is_err());
    }

    #[test]
    fn settings_use_camel_case_keys() {
        let json = serde_json::to_value(ProjectSettings::default()).unwrap();
        assert_eq!(json["clearColor"], "#000000");
        assert_eq!(json["fftSize"], 16_384);
        assert!(json.get("postprocessingEnabled").is_some());
    }

    #[test]
    fn app_config_fills_missing_sections() {
        let config: AppConfig = serde_json::from_str(r#"{"render": {"fps": 30}}"#).unwrap();
        assert_eq!(config.render.fps, 30);
        assert_eq!(config.render.width, 1280);
        assert_eq!(config.audio.sample_rate, 48_000);
    }
}
