use serde::{Deserialize, Serialize};

use super::item::{
    apply_bindings, attach_binding, detach_binding, FrameContext, Item, ItemId, ItemKind,
};
use super::{Direction, LayerId};
use crate::automation::{AutomationRegistry, Binding};
use crate::config::Resolution;
use crate::params::{Parameter, ParameterSet};
use crate::render::LayerOutput;
use crate::{AudioFrame, Result, SpectraError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SceneKind {
    /// 2D canvas composited onto a full-screen quad.
    #[serde(rename = "canvas")]
    Canvas,
    #[serde(rename = "ortho")]
    Orthographic,
    #[serde(rename = "perspective")]
    Perspective,
}

impl SceneKind {
    pub const TAGS: [&'static str; 3] = ["canvas", "ortho", "perspective"];

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "canvas" => Some(Self::Canvas),
            "ortho" => Some(Self::Orthographic),
            "perspective" => Some(Self::Perspective),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Canvas => "canvas",
            Self::Orthographic => "ortho",
            Self::Perspective => "perspective",
        }
    }

    /// Items a scene of this kind can host.
    pub fn supports(self, item: ItemKind) -> bool {
        match self {
            Self::Canvas => matches!(item, ItemKind::SpectrumRing | ItemKind::Bars),
            Self::Orthographic => {
                matches!(item, ItemKind::Bars | ItemKind::Particles | ItemKind::Image)
            }
            Self::Perspective => matches!(item, ItemKind::Particles | ItemKind::Image),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraState {
    pub position: [f32; 3],
    pub rotation: [f32; 3],
    pub zoom: f32,
    pub fov: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 1.0],
            rotation: [0.0; 3],
            zoom: 1.0,
            fov: 75.0,
        }
    }
}

impl CameraState {
    pub fn for_kind(kind: SceneKind) -> Self {
        match kind {
            SceneKind::Perspective => Self {
                position: [0.0, 0.0, 5.0],
                ..Self::default()
            },
            SceneKind::Canvas | SceneKind::Orthographic => Self::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scene {
    id: LayerId,
    kind: SceneKind,
    params: ParameterSet,
    bindings: Vec<Binding>,
    pub camera: CameraState,
    pub controls_enabled: bool,
    items: Vec<Item>,
    resolution: Resolution,
    next_item_id: ItemId,
}

impl Scene {
    pub(crate) fn new(id: LayerId, kind: SceneKind, resolution: Resolution) -> Self {
        Self {
            id,
            kind,
            params: ParameterSet::new(vec![Parameter::number("opacity", 1.0).range(0.0, 1.0)]),
            bindings: Vec::new(),
            camera: CameraState::for_kind(kind),
            controls_enabled: true,
            items: Vec::new(),
            resolution,
            next_item_id: 1,
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn kind(&self) -> SceneKind {
        self.kind
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| item.id() == id)
    }

    pub fn add_item(&mut self, tag: &str) -> Result<ItemId> {
        let kind = ItemKind::from_tag(tag)?;
        if !self.kind.supports(kind) {
            let context = format!("{tag} in {} scene", self.kind.tag());
            return Err(SpectraError::unsupported("item", context));
        }
        let id = self.next_item_id;
        self.next_item_id += 1;
        self.items.push(Item::new(id, kind, self.resolution));
        Ok(id)
    }

    pub fn remove_item(&mut self, id: ItemId) -> Option<Item> {
        let index = self.items.iter().position(|item| item.id() == id)?;
        Some(self.items.remove(index))
    }

    /// Swaps the item with its neighbour; `false` at either end.
    pub fn move_item(&mut self, id: ItemId, direction: Direction) -> bool {
        let Some(index) = self.items.iter().position(|item| item.id() == id) else {
            return false;
        };
        match direction.neighbour(index, self.items.len()) {
            Some(other) => {
                self.items.swap(index, other);
                true
            }
            None => false,
        }
    }

    pub fn reset_camera(&mut self) {
        self.camera = CameraState::for_kind(self.kind);
    }

    pub(crate) fn bind(&mut self, binding: Binding) -> Result<()> {
        attach_binding(&self.params, &mut self.bindings, binding)
    }

    pub(crate) fn unbind(&mut self, parameter: &str) -> Option<Binding> {
        detach_binding(&mut self.bindings, parameter)
    }

    /// Every binding held by the scene or one of its items.
    pub fn all_bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings
            .iter()
            .chain(self.items.iter().flat_map(|item| item.bindings()))
    }

    pub(crate) fn retain_bindings(&mut self, mut keep: impl FnMut(&Binding) -> bool) {
        self.bindings.retain(&mut keep);
        for item in &mut self.items {
            item.retain_bindings(&mut keep);
        }
    }

    pub fn reset_transient(&mut self) {
        self.items.iter_mut().for_each(Item::reset);
    }

    pub(crate) fn update(
        &mut self,
        time: f64,
        audio: &AudioFrame,
        should_increment: bool,
        automations: &AutomationRegistry,
    ) -> Result<LayerOutput> {
        apply_bindings(&mut self.params, &self.bindings, automations);
        let ctx = FrameContext {
            time,
            audio,
            should_increment,
            resolution: self.resolution,
        };

        // Items advance on a copy so a failing item leaves every accumulator
        // in the scene as it was before the frame.
        let mut staged = self.items.clone();
        let mut ops = Vec::new();
        for item in staged.iter_mut().filter(|item| item.is_active(time)) {
            let drawn = item
                .update(&ctx, automations)
                .map_err(|err| SpectraError::msg(format!("item `{}`: {err}", item.name)))?;
            ops.extend(drawn);
        }
        self.items = staged;

        Ok(LayerOutput::Scene {
            id: self.id,
            kind: self.kind,
            opacity: self.params.number_f32("opacity"),
            camera: self.camera,
            ops,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EffectKind {
    Bloom,
    Film,
    Glitch,
    RgbShift,
    Afterimage,
    DotScreen,
}

impl EffectKind {
    pub const TAGS: [&'static str; 6] = [
        "bloom",
        "film",
        "glitch",
        "rgbShift",
        "afterimage",
        "dotScreen",
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "bloom" => Some(Self::Bloom),
            "film" => Some(Self::Film),
            "glitch" => Some(Self::Glitch),
            "rgbShift" => Some(Self::RgbShift),
            "afterimage" => Some(Self::Afterimage),
            "dotScreen" => Some(Self::DotScreen),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Bloom => "bloom",
            Self::Film => "film",
            Self::Glitch => "glitch",
            Self::RgbShift => "rgbShift",
            Self::Afterimage => "afterimage",
            Self::DotScreen => "dotScreen",
        }
    }

    fn parameters(self) -> Vec<Parameter> {
        match self {
            Self::Bloom => vec![
                Parameter::number("strength", 1.5).range(0.0, 3.0),
                Parameter::number("radius", 0.4).range(0.0, 1.0),
                Parameter::number("threshold", 0.85).range(0.0, 1.0),
            ],
            Self::Film => vec![
                Parameter::number("noiseIntensity", 0.35).range(0.0, 1.0),
                Parameter::number("scanlinesIntensity", 0.025).range(0.0, 1.0),
                Parameter::number("scanlinesCount", 648.0).range(0.0, 4096.0).step(1.0),
                Parameter::flag("grayscale", false),
            ],
            Self::Glitch => vec![Parameter::flag("goWild", false)],
            Self::RgbShift => vec![
                Parameter::number("amount", 0.005).range(0.0, 0.1),
                Parameter::number("angle", 0.0).range(0.0, std::f64::consts::TAU),
            ],
            Self::Afterimage => vec![Parameter::number("damp", 0.96).range(0.0, 1.0)],
            Self::DotScreen => vec![
                Parameter::number("centerX", 0.5).range(0.0, 1.0),
                Parameter::number("centerY", 0.5).range(0.0, 1.0),
                Parameter::number("angle", 1.57).range(0.0, std::f64::consts::TAU),
                Parameter::number("scale", 0.8).range(0.0, 4.0),
            ],
        }
    }
}

/// Post-processing pass sharing the ordered layer list with scenes.
#[derive(Debug, Clone)]
pub struct EffectPass {
    id: LayerId,
    kind: EffectKind,
    params: ParameterSet,
}

impl EffectPass {
    pub(crate) fn new(id: LayerId, kind: EffectKind) -> Self {
        Self {
            id,
            kind,
            params: ParameterSet::new(kind.parameters()),
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    pub(crate) fn output(&self) -> LayerOutput {
        LayerOutput::Effect {
            id: self.id,
            kind: self.kind,
            parameters: self.params.values(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas() -> Scene {
        Scene::new(1, SceneKind::Canvas, Resolution::default())
    }

    #[test]
    fn items_are_checked_against_scene_kind() {
        let mut scene = canvas();
        assert!(scene.add_item("spectrumRing").is_ok());
        assert!(matches!(
            scene.add_item("particles"),
            Err(SpectraError::UnsupportedVariant { .. })
        ));
        assert!(scene.add_item("hologram").is_err());
    }

    #[test]
    fn moving_items_stops_at_edges() {
        let mut scene = canvas();
        let a = scene.add_item("spectrumRing").unwrap();
        let b = scene.add_item("bars").unwrap();

        assert!(!scene.move_item(a, Direction::Up));
        assert!(scene.move_item(a, Direction::Down));
        assert_eq!(scene.items()[0].id(), b);
        assert!(!scene.move_item(a, Direction::Down));
        assert!(!scene.move_item(99, Direction::Up));
    }

    #[test]
    fn failing_item_leaves_earlier_items_unadvanced() {
        let mut scene = Scene::new(1, SceneKind::Orthographic, Resolution::default());
        let bars = scene.add_item("bars").unwrap();
        let image = scene.add_item("image").unwrap();
        scene
            .item_mut(image)
            .unwrap()
            .params_mut()
            .set("source", "movie.mkv")
            .unwrap();
        let registry = AutomationRegistry::new();
        let audio = AudioFrame::new(vec![100.0; 1024], Vec::new());

        let history = |scene: &Scene| {
            scene
                .item(bars)
                .and_then(|item| item.visual().analyser())
                .map(|analyser| analyser.previous_output().to_vec())
                .unwrap()
        };

        assert!(scene.update(1.0, &audio, true, &registry).is_err());
        assert!(history(&scene).is_empty());

        scene
            .item_mut(image)
            .unwrap()
            .params_mut()
            .set("source", "cover.png")
            .unwrap();
        assert!(scene.update(1.0, &audio, true, &registry).is_ok());
        assert!(!history(&scene).is_empty());
    }

    #[test]
    fn inactive_items_are_skipped_but_kept() {
        let mut scene = canvas();
        let id = scene.add_item("spectrumRing").unwrap();
        scene.item_mut(id).unwrap().set_window(5.0, 6.0).unwrap();
        let registry = AutomationRegistry::new();
        let audio = AudioFrame::new(vec![100.0; 1024], Vec::new());

        let output = scene.update(1.0, &audio, true, &registry).unwrap();
        let LayerOutput::Scene { ops, .. } = output else {
            panic!("scene output expected");
        };
        assert!(ops.is_empty());
        assert!(scene.item(id).is_some());

        let output = scene.update(5.5, &audio, true, &registry).unwrap();
        let LayerOutput::Scene { ops, .. } = output else {
            panic!("scene output expected");
        };
        assert!(!ops.is_empty());
    }

    #[test]
    fn camera_resets_to_kind_default() {
        let mut scene = Scene::new(2, SceneKind::Perspective, Resolution::default());
        scene.camera.position = [4.0, 4.0, 4.0];
        scene.reset_camera();
        assert_eq!(scene.camera.position, [0.0, 0.0, 5.0]);
    }

    #[test]
    fn effect_tags_round_trip() {
        for tag in EffectKind::TAGS {
            let kind = EffectKind::from_tag(tag).unwrap();
            assert_eq!(kind.tag(), tag);
            assert_eq!(serde_json::to_value(kind).unwrap(), tag);
            assert!(EffectPass::new(1, kind).params().iter().count() > 0);
        }
    }
}
