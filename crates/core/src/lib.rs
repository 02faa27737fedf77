//! Core library for the Spectra audio-reactive visual engine.
//!
//! Each module owns one subsystem. Raw frequency bins pass through the
//! [`spectrum`] transform chain, [`automation`] values modulate the parameters
//! exposed by the [`scene`] graph, and the [`engine`] drives both once per
//! frame to produce backend-neutral [`render`] output. [`project`] persists
//! and restores the whole arrangement.

pub mod audio;
pub mod automation;
pub mod config;
pub mod engine;
pub mod error;
pub mod params;
pub mod project;
pub mod render;
pub mod scene;
pub mod spectrum;
pub mod timeline;

pub use audio::{AudioEngine, AudioFrame};
pub use automation::{Automation, AutomationId, AutomationKind, AutomationRegistry, Binding};
pub use config::{AppConfig, AudioConfig, ProjectSettings, RenderConfig, Resolution};
pub use engine::{Orchestrator, ParamOwner};
pub use error::{Result, SpectraError};
pub use params::{ParamValue, Parameter, ParameterSet};
pub use project::{LoadReport, ProjectCodec, ProjectDocument};
pub use render::{FrameOutput, LayerOutput, RenderGraph, RenderOp, RenderTarget};
pub use scene::{Direction, ItemId, ItemKind, Layer, LayerId, SceneGraph, SceneKind};
pub use spectrum::{ImpactAnalyser, ImpactSettings, SpectrumAnalyser, SpectrumConfig};
pub use timeline::{PlaybackClock, PlaybackState};
