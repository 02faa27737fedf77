//! Ordered layers (scenes and post-processing passes) plus the parallel
//! composition order handed to the render collaborator.

mod item;
mod layer;
mod ring;
mod visuals;

use std::collections::HashSet;

pub use item::{FrameContext, Item, ItemId, ItemKind, Visual, OPEN_END_TIME};
pub use layer::{CameraState, EffectKind, EffectPass, Scene, SceneKind};
pub use ring::{ColorLayer, SpectrumRing};
pub use visuals::{ImageSprite, ParticleField, SpectrumBars};

use crate::automation::AutomationId;
use crate::config::Resolution;
use crate::{Result, SpectraError};

pub type LayerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Index to swap with, or `None` at the boundary.
    pub(crate) fn neighbour(self, index: usize, len: usize) -> Option<usize> {
        match self {
            Direction::Up => index.checked_sub(1),
            Direction::Down => (index + 1 < len).then_some(index + 1),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Layer {
    Scene(Scene),
    Effect(EffectPass),
}

impl Layer {
    pub fn id(&self) -> LayerId {
        match self {
            Layer::Scene(scene) => scene.id(),
            Layer::Effect(effect) => effect.id(),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Layer::Scene(scene) => scene.kind().tag(),
            Layer::Effect(effect) => effect.kind().tag(),
        }
    }

    pub fn is_scene(&self) -> bool {
        matches!(self, Layer::Scene(_))
    }

    pub fn as_scene(&self) -> Option<&Scene> {
        match self {
            Layer::Scene(scene) => Some(scene),
            Layer::Effect(_) => None,
        }
    }

    pub fn as_scene_mut(&mut self) -> Option<&mut Scene> {
        match self {
            Layer::Scene(scene) => Some(scene),
            Layer::Effect(_) => None,
        }
    }

    /// Automations referenced by this layer's bindings.
    pub fn bound_automations(&self) -> HashSet<AutomationId> {
        self.as_scene()
            .map(|scene| scene.all_bindings().map(|b| b.automation).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct SceneGraph {
    layers: Vec<Layer>,
    composition: Vec<LayerId>,
    next_id: LayerId,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            composition: Vec::new(),
            next_id: 1,
        }
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scene for `canvas`, `ortho` and `perspective`; any other tag
    /// is handed to the effect factory.
    pub fn add_scene(&mut self, tag: &str, resolution: Resolution) -> Result<LayerId> {
        let id = self.next_id;
        let layer = if let Some(kind) = SceneKind::from_tag(tag) {
            Layer::Scene(Scene::new(id, kind, resolution))
        } else if let Some(kind) = EffectKind::from_tag(tag) {
            Layer::Effect(EffectPass::new(id, kind))
        } else {
            return Err(SpectraError::unsupported("scene", tag));
        };

        self.next_id += 1;
        self.layers.push(layer);
        self.composition.push(id);
        tracing::debug!(layer = id, tag, "layer added");
        Ok(id)
    }

    /// Removes `id` from the display list and the composition order. An id
    /// present in only one of them is logged and pruned from it.
    pub fn remove(&mut self, id: LayerId) -> Option<Layer> {
        let display = self.layers.iter().position(|l| l.id() == id);
        let composed = self.composition.iter().position(|c| *c == id);

        if let Some(index) = composed {
            self.composition.remove(index);
        }
        let removed = display.map(|index| self.layers.remove(index));

        if display.is_some() != composed.is_some() {
            let err = SpectraError::StructuralInconsistency(format!(
                "layer {id} was only present in the {} list",
                if display.is_some() { "display" } else { "composition" }
            ));
            tracing::error!(%err, "pruned partially registered layer");
        }
        removed
    }

    /// Swaps the layer with its neighbour in both orderings; `false` at the
    /// boundaries.
    pub fn move_layer(&mut self, id: LayerId, direction: Direction) -> bool {
        let Some(index) = self.layers.iter().position(|l| l.id() == id) else {
            return false;
        };
        let Some(other) = direction.neighbour(index, self.layers.len()) else {
            return false;
        };
        let other_id = self.layers[other].id();
        self.layers.swap(index, other);

        let a = self.composition.iter().position(|c| *c == id);
        let b = self.composition.iter().position(|c| *c == other_id);
        match (a, b) {
            (Some(a), Some(b)) => self.composition.swap(a, b),
            _ => {
                self.verify();
            }
        }
        true
    }

    /// Checks that composition mirrors the display list, rebuilding it from
    /// the display list when they drifted.
    pub fn verify(&mut self) -> bool {
        let consistent = self
            .composition
            .iter()
            .copied()
            .eq(self.layers.iter().map(Layer::id));
        if !consistent {
            let err = SpectraError::StructuralInconsistency(format!(
                "composition {:?} does not match display list",
                self.composition
            ));
            tracing::error!(%err, "rebuilding composition order");
            self.composition = self.layers.iter().map(Layer::id).collect();
        }
        consistent
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn composition(&self) -> &[LayerId] {
        &self.composition
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    pub fn get_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id() == id)
    }

    pub fn scene(&self, id: LayerId) -> Option<&Scene> {
        self.get(id).and_then(Layer::as_scene)
    }

    pub fn scene_mut(&mut self, id: LayerId) -> Option<&mut Scene> {
        self.get_mut(id).and_then(Layer::as_scene_mut)
    }

    pub fn scenes(&self) -> impl Iterator<Item = &Scene> {
        self.layers.iter().filter_map(Layer::as_scene)
    }

    pub fn scenes_mut(&mut self) -> impl Iterator<Item = &mut Scene> {
        self.layers.iter_mut().filter_map(Layer::as_scene_mut)
    }

    pub fn add_item(&mut self, scene: LayerId, tag: &str) -> Result<ItemId> {
        self.scene_mut(scene)
            .ok_or_else(|| SpectraError::config(format!("layer {scene} is not a scene")))?
            .add_item(tag)
    }

    /// Automations referenced by any binding in the graph.
    pub fn bound_automations(&self) -> HashSet<AutomationId> {
        self.scenes()
            .flat_map(|scene| scene.all_bindings().map(|b| b.automation))
            .collect()
    }

    /// Drops bindings for which `keep` returns false.
    pub fn retain_bindings(&mut self, mut keep: impl FnMut(AutomationId) -> bool) {
        for scene in self.scenes_mut() {
            scene.retain_bindings(|b| keep(b.automation));
        }
    }

    /// Unique author names across all items, in display order.
    pub fn authors(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let authors = self
            .scenes()
            .flat_map(|scene| scene.items())
            .flat_map(|item| item.kind().authors());
        for author in authors {
            if !names.iter().any(|n| n == author) {
                names.push(author.to_string());
            }
        }
        names
    }

    pub fn reset_transient(&mut self) {
        self.scenes_mut().for_each(Scene::reset_transient);
    }

    pub fn set_controls_enabled(&mut self, enabled: bool) {
        for scene in self.scenes_mut() {
            scene.controls_enabled = enabled;
        }
    }

    pub fn reset_cameras(&mut self) {
        self.scenes_mut().for_each(Scene::reset_camera);
    }

    pub fn clear(&mut self) {
        self.layers.clear();
        self.composition.clear();
    }
}
