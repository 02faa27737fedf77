//! Spectrum transform pipeline: raw frequency bins in, a visually tuned and
//! temporally stable spectrum out.

mod impact;
pub mod transforms;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use impact::{ImpactAnalyser, ImpactSettings};

use crate::params::{Controllable, ParamValue, Parameter};
use crate::{Result, SpectraError};

/// Options read by every transform stage. Field names follow the project
/// file format (camelCase) and every field falls back to its default when a
/// document omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpectrumConfig {
    pub spectrum_size: usize,
    pub should_cap_height: bool,
    pub spectrum_height: f32,
    pub spectrum_start: usize,
    pub spectrum_end: usize,
    pub spectrum_scale: f32,
    /// Magnitude treated as full scale by the log and normalize stages.
    pub input_ceiling: f32,

    pub enable_dropoff_smoothing_transform: bool,
    pub enable_combine_bins: bool,
    pub enable_log_transform: bool,
    pub enable_normalize_transform: bool,
    pub enable_average_transform: bool,
    pub enable_tail_transform: bool,
    pub enable_smoothing_transform: bool,
    pub enable_exponential_transform: bool,

    pub spectrum_max_exponent: f32,
    pub spectrum_min_exponent: f32,
    pub spectrum_exponent_scale: f32,

    pub smoothing_points: usize,
    pub smoothing_passes: usize,
    pub head_margin: usize,
    pub tail_margin: usize,
    pub min_margin_weight: f32,
    pub margin_decay: f32,
    pub head_margin_slope: f32,
    pub tail_margin_slope: f32,

    pub dropoff_amount: f32,
    /// Weight of the previous output frame in the average stage.
    pub smoothing_time_constant: f32,
    /// Share of the previous value a falling bin retains in the tail stage.
    pub tail_decay: f32,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            spectrum_size: 64,
            should_cap_height: false,
            spectrum_height: 280.0,
            spectrum_start: 0,
            spectrum_end: 1200,
            spectrum_scale: 2.5,
            input_ceiling: 255.0,
            enable_dropoff_smoothing_transform: true,
            enable_combine_bins: true,
            enable_log_transform: true,
            enable_normalize_transform: true,
            enable_average_transform: true,
            enable_tail_transform: true,
            enable_smoothing_transform: true,
            enable_exponential_transform: false,
            spectrum_max_exponent: 6.0,
            spectrum_min_exponent: 3.0,
            spectrum_exponent_scale: 2.0,
            smoothing_points: 3,
            smoothing_passes: 1,
            head_margin: 7,
            tail_margin: 0,
            min_margin_weight: 0.7,
            margin_decay: 1.6,
            head_margin_slope: 0.013_334_121,
            tail_margin_slope: 1.0,
            dropoff_amount: 0.2,
            smoothing_time_constant: 0.1,
            tail_decay: 0.85,
        }
    }
}

impl SpectrumConfig {
    /// Configuration with every stage switched off: frames are only fitted to
    /// `spectrum_size`.
    pub fn passthrough(spectrum_size: usize) -> Self {
        Self {
            spectrum_size,
            enable_dropoff_smoothing_transform: false,
            enable_combine_bins: false,
            enable_log_transform: false,
            enable_normalize_transform: false,
            enable_average_transform: false,
            enable_tail_transform: false,
            enable_smoothing_transform: false,
            enable_exponential_transform: false,
            ..Self::default()
        }
    }

    fn fields(&self) -> serde_json::Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => fields,
            _ => serde_json::Map::new(),
        }
    }
}

impl Controllable for SpectrumConfig {
    fn controllers(&self) -> Vec<Parameter> {
        self.fields()
            .into_iter()
            .filter_map(|(name, value)| match value {
                Value::Bool(flag) => Some(Parameter::flag(&name, flag)),
                Value::Number(number) => number
                    .as_f64()
                    .map(|n| Parameter::number(&name, n).min(0.0)),
                _ => None,
            })
            .collect()
    }

    fn set_controller(&mut self, name: &str, value: ParamValue) -> Result<()> {
        let mut fields = self.fields();
        let slot = fields
            .get_mut(name)
            .ok_or_else(|| SpectraError::config(format!("unknown spectrum setting `{name}`")))?;

        let replacement = match (&*slot, value) {
            (Value::Bool(_), ParamValue::Bool(flag)) => Value::Bool(flag),
            (Value::Number(current), ParamValue::Number(n)) if n.is_finite() && n >= 0.0 => {
                if current.is_u64() {
                    if n.fract() != 0.0 {
                        return Err(SpectraError::config(format!(
                            "spectrum setting `{name}` takes whole numbers"
                        )));
                    }
                    Value::from(n as u64)
                } else {
                    Value::from(n)
                }
            }
            (_, other) => {
                return Err(SpectraError::config(format!(
                    "spectrum setting `{name}` cannot take {other:?}"
                )))
            }
        };

        *slot = replacement;
        *self = serde_json::from_value(Value::Object(fields))?;
        Ok(())
    }
}

/// One analyser per audio-bound visual item. Holds the configuration and the
/// two frames needed by the temporal stages.
#[derive(Debug, Clone, Default)]
pub struct SpectrumAnalyser {
    config: SpectrumConfig,
    prev_arr: Vec<f32>,
    prev_res_arr: Vec<f32>,
}

impl SpectrumAnalyser {
    pub fn new(config: SpectrumConfig) -> Self {
        Self {
            config,
            prev_arr: Vec::new(),
            prev_res_arr: Vec::new(),
        }
    }

    pub fn config(&self) -> &SpectrumConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SpectrumConfig {
        &mut self.config
    }

    /// Input frame (after dropoff smoothing) seen on the last update.
    pub fn previous_input(&self) -> &[f32] {
        &self.prev_arr
    }

    /// Output of the last update.
    pub fn previous_output(&self) -> &[f32] {
        &self.prev_res_arr
    }

    /// Drops the temporal history; configuration is untouched.
    pub fn reset(&mut self) {
        self.prev_arr.clear();
        self.prev_res_arr.clear();
    }

    /// Runs every enabled stage in the fixed order and remembers the frames
    /// the temporal stages need next time.
    pub fn transform(&mut self, raw: &[f32]) -> Vec<f32> {
        let config = &self.config;
        let mut frame = transforms::sanitize(raw);

        if config.enable_dropoff_smoothing_transform {
            frame = transforms::smooth_dropoff(&frame, &self.prev_arr, config.dropoff_amount);
        }
        let input = frame.clone();

        frame = if config.enable_combine_bins {
            transforms::combine_bins(&frame, config)
        } else {
            transforms::fit_to_size(frame, config.spectrum_size)
        };

        if config.enable_log_transform {
            frame = transforms::log_transform(&frame, config);
        }
        if config.enable_normalize_transform {
            frame = transforms::normalize_amplitude(&frame, config);
        }
        if config.enable_average_transform {
            frame = transforms::average_transform(&frame, &self.prev_res_arr, config);
        }
        if config.enable_tail_transform {
            frame = transforms::tail_transform(&frame, &self.prev_res_arr, config);
        }
        if config.enable_smoothing_transform {
            frame = transforms::smooth(&frame, config);
        }
        if config.enable_exponential_transform {
            frame = transforms::exponential_transform(&frame, config);
        }

        let frame = transforms::sanitize(&frame);
        self.prev_arr = input;
        self.prev_res_arr = frame.clone();
        frame
    }
}
