use std::collections::BTreeMap;

use serde::Serialize;

use crate::params::ParamValue;
use crate::scene::{CameraState, EffectKind, LayerId, SceneKind};
use crate::Result;

/// Backend-neutral drawing instruction emitted by visual items. Coordinates
/// are in output pixels with the origin at the top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum RenderOp {
    /// Closed outline through `points`, filled or stroked.
    Shape {
        color: String,
        alpha: f32,
        fill: bool,
        #[serde(rename = "lineWidth")]
        line_width: f32,
        points: Vec<[f32; 2]>,
    },
    Bars {
        color: String,
        alpha: f32,
        origin: [f32; 2],
        width: f32,
        heights: Vec<f32>,
    },
    Particles {
        color: String,
        alpha: f32,
        size: f32,
        positions: Vec<[f32; 2]>,
    },
    Image {
        source: String,
        alpha: f32,
        center: [f32; 2],
        scale: f32,
    },
    Emblem {
        center: [f32; 2],
        radius: f32,
        alpha: f32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "layer", rename_all = "camelCase")]
pub enum LayerOutput {
    Scene {
        id: LayerId,
        kind: SceneKind,
        opacity: f32,
        camera: CameraState,
        ops: Vec<RenderOp>,
    },
    Effect {
        id: LayerId,
        kind: EffectKind,
        parameters: BTreeMap<String, ParamValue>,
    },
}

/// A scene whose update failed this frame and was left out of the output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneFailure {
    pub layer: LayerId,
    pub message: String,
}

/// Everything the render collaborator needs for one frame, in composition
/// order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameOutput {
    pub time: f64,
    pub layers: Vec<LayerOutput>,
    pub attribution: Vec<String>,
    pub failures: Vec<SceneFailure>,
}

impl FrameOutput {
    pub fn op_count(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| match layer {
                LayerOutput::Scene { ops, .. } => ops.len(),
                LayerOutput::Effect { .. } => 0,
            })
            .sum()
    }
}

/// Implemented by whatever turns frame outputs into pixels, files or logs.
pub trait RenderTarget {
    fn render(&mut self, frame: &FrameOutput) -> Result<()>;
}

/// In-memory target that keeps the latest frame and running totals. Used by
/// the command line front end and by tests.
#[derive(Debug, Default)]
pub struct RenderGraph {
    frames_rendered: u64,
    ops_rendered: u64,
    failures: u64,
    last_frame: Option<FrameOutput>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn ops_rendered(&self) -> u64 {
        self.ops_rendered
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn last_frame(&self) -> Option<&FrameOutput> {
        self.last_frame.as_ref()
    }
}

impl RenderTarget for RenderGraph {
    fn render(&mut self, frame: &FrameOutput) -> Result<()> {
        self.frames_rendered += 1;
        self.ops_rendered += frame.op_count() as u64;
        self.failures += frame.failures.len() as u64;
        self.last_frame = Some(frame.clone());
        Ok(())
    }
}
