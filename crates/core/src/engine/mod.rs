//! Per-frame driver: automations first, then scenes in composition order,
//! then composition into a [`FrameOutput`].

use std::collections::HashSet;

use crate::automation::{Automation, AutomationId, AutomationRegistry, Binding};
use crate::config::{validate_fft_size, ProjectSettings, Resolution};
use crate::render::{FrameOutput, SceneFailure};
use crate::scene::{Direction, Item, ItemId, Layer, LayerId, Scene, SceneGraph};
use crate::timeline::PlaybackState;
use crate::{AudioFrame, Result, SpectraError};

/// Heading placed above the author list when attribution is drawn.
pub const ATTRIBUTION_HEADING: &str = "Visuals by:";

/// Owner of a bindable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamOwner {
    Scene(LayerId),
    Item(LayerId, ItemId),
}

#[derive(Debug)]
pub struct Orchestrator {
    settings: ProjectSettings,
    resolution: Resolution,
    automations: AutomationRegistry,
    graph: SceneGraph,
    state: PlaybackState,
    last_time: f64,
    last_audio: AudioFrame,
    output: FrameOutput,
}

impl Orchestrator {
    pub fn new(resolution: Resolution) -> Self {
        Self::with_settings(resolution, ProjectSettings::default())
    }

    pub fn with_settings(resolution: Resolution, settings: ProjectSettings) -> Self {
        let last_audio = AudioFrame::silent(settings.fft_size);
        Self {
            settings,
            resolution,
            automations: AutomationRegistry::new(),
            graph: SceneGraph::new(),
            state: PlaybackState::Stopped,
            last_time: 0.0,
            last_audio,
            output: FrameOutput::default(),
        }
    }

    pub fn settings(&self) -> &ProjectSettings {
        &self.settings
    }

    /// Direct access for plain fields. The FFT size goes through
    /// [`Orchestrator::set_fft_size`].
    pub fn settings_mut(&mut self) -> &mut ProjectSettings {
        &mut self.settings
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn automations(&self) -> &AutomationRegistry {
        &self.automations
    }

    pub fn automations_mut(&mut self) -> &mut AutomationRegistry {
        &mut self.automations
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn last_time(&self) -> f64 {
        self.last_time
    }

    pub fn last_audio(&self) -> &AudioFrame {
        &self.last_audio
    }

    /// Output of the most recent frame.
    pub fn output(&self) -> &FrameOutput {
        &self.output
    }

    pub fn play(&mut self, time: f64) {
        tracing::info!(time, "playback started");
        self.state = PlaybackState::Running;
        self.last_time = time;
    }

    /// Runs one frame. `should_increment = false` redraws without advancing
    /// any accumulator.
    pub fn update(&mut self, time: f64, audio: AudioFrame, should_increment: bool) -> &FrameOutput {
        if self.state == PlaybackState::Seeking {
            self.state = PlaybackState::Running;
        }
        self.tick(time, audio, should_increment)
    }

    /// Repeats the last frame in place, e.g. after a parameter edit.
    pub fn redo_update(&mut self) -> &FrameOutput {
        let audio = std::mem::take(&mut self.last_audio);
        self.tick(self.last_time, audio, false)
    }

    /// Time-only update used while scrubbing.
    pub fn seek_time(&mut self, time: f64) -> &FrameOutput {
        self.state = PlaybackState::Seeking;
        self.tick(time, AudioFrame::empty(), false)
    }

    /// Resets every transient accumulator. Configuration is left alone.
    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.last_time = 0.0;
        self.last_audio = AudioFrame::empty();
        self.graph.reset_transient();
        self.automations.reset_transient();
        self.output = FrameOutput::default();
        tracing::info!("playback stopped");
    }

    fn tick(&mut self, time: f64, audio: AudioFrame, should_increment: bool) -> &FrameOutput {
        let time = if time.is_finite() {
            time
        } else {
            let err = SpectraError::InvalidInput("frame time is not finite");
            tracing::warn!(%err, time, last = self.last_time, "reusing the last frame time");
            self.last_time
        };

        self.automations.update_all(time, &audio, should_increment);

        let mut layers = Vec::with_capacity(self.graph.len());
        let mut failures = Vec::new();
        let postprocessing = self.settings.postprocessing_enabled;
        let composition = self.graph.composition().to_vec();
        let mut dangling = false;

        for id in composition {
            match self.graph.get_mut(id) {
                Some(Layer::Scene(scene)) => {
                    match scene.update(time, &audio, should_increment, &self.automations) {
                        Ok(output) => layers.push(output),
                        Err(err) => {
                            tracing::error!(layer = id, time, %err, "scene update failed");
                            failures.push(SceneFailure {
                                layer: id,
                                message: err.to_string(),
                            });
                        }
                    }
                }
                Some(Layer::Effect(effect)) => {
                    if postprocessing {
                        layers.push(effect.output());
                    }
                }
                None => {
                    tracing::error!(layer = id, "composition references a missing layer");
                    dangling = true;
                }
            }
        }
        if dangling {
            self.graph.verify();
        }

        let attribution = if self.settings.draw_attribution {
            self.attribution()
        } else {
            Vec::new()
        };

        self.output = FrameOutput {
            time,
            layers,
            attribution,
            failures,
        };
        self.last_time = time;
        self.last_audio = audio;
        &self.output
    }

    /// Attribution lines: a heading followed by unique author names.
    pub fn attribution(&self) -> Vec<String> {
        std::iter::once(ATTRIBUTION_HEADING.to_string())
            .chain(self.graph.authors())
            .collect()
    }

    pub fn set_fft_size(&mut self, size: usize) -> Result<()> {
        self.settings.fft_size = validate_fft_size(size)?;
        self.last_audio = AudioFrame::silent(size);
        Ok(())
    }

    pub fn add_scene(&mut self, tag: &str) -> Result<LayerId> {
        self.graph.add_scene(tag, self.resolution)
    }

    /// Removes a layer along with the automations only it was bound to.
    pub fn remove_layer(&mut self, id: LayerId) -> Option<Layer> {
        let layer = self.graph.remove(id)?;
        self.drop_orphans(layer.bound_automations());
        Some(layer)
    }

    pub fn move_layer(&mut self, id: LayerId, direction: Direction) -> bool {
        self.graph.move_layer(id, direction)
    }

    pub fn add_item(&mut self, scene: LayerId, tag: &str) -> Result<ItemId> {
        self.graph.add_item(scene, tag)
    }

    pub fn remove_item(&mut self, scene: LayerId, item: ItemId) -> Option<Item> {
        let removed = self.graph.scene_mut(scene)?.remove_item(item)?;
        self.drop_orphans(removed.bindings().iter().map(|b| b.automation).collect());
        Some(removed)
    }

    pub fn add_automation(&mut self, tag: &str) -> Result<AutomationId> {
        self.automations.create(tag)
    }

    pub fn insert_automation(&mut self, automation: Automation) -> AutomationId {
        self.automations.insert(automation)
    }

    /// Deletes an automation and every binding that pointed at it.
    pub fn remove_automation(&mut self, id: AutomationId) -> Option<Automation> {
        let removed = self.automations.remove(id)?;
        self.graph.retain_bindings(|automation| automation != id);
        Some(removed)
    }

    pub fn bind(
        &mut self,
        owner: ParamOwner,
        parameter: &str,
        automation: AutomationId,
    ) -> Result<()> {
        if !self.automations.contains(automation) {
            return Err(SpectraError::config(format!(
                "unknown automation {automation}"
            )));
        }

        let binding = Binding::new(parameter, automation);
        let replaced = self.binding(owner, parameter)?;
        match owner {
            ParamOwner::Scene(scene) => self.scene_or_err(scene)?.bind(binding)?,
            ParamOwner::Item(scene, item) => self
                .scene_or_err(scene)?
                .item_mut(item)
                .ok_or_else(|| SpectraError::config(format!("scene {scene} has no item {item}")))?
                .bind(binding)?,
        }

        if let Some(previous) = replaced.filter(|previous| *previous != automation) {
            self.drop_orphans(HashSet::from([previous]));
        }
        Ok(())
    }

    /// Detaches a binding; its automation goes too when nothing else uses it.
    pub fn unbind(&mut self, owner: ParamOwner, parameter: &str) -> Option<Binding> {
        let scene = self.graph.scene_mut(owner.scene())?;
        let removed = match owner {
            ParamOwner::Scene(_) => scene.unbind(parameter),
            ParamOwner::Item(_, item) => scene.item_mut(item)?.unbind(parameter),
        }?;
        self.drop_orphans(HashSet::from([removed.automation]));
        Some(removed)
    }

    pub fn enable_all_controls(&mut self) {
        self.graph.set_controls_enabled(true);
    }

    pub fn disable_all_controls(&mut self) {
        self.graph.set_controls_enabled(false);
    }

    pub fn reset_all_cameras(&mut self) {
        self.graph.reset_cameras();
    }

    /// Empties scenes and automations and returns to the stopped state.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.automations.clear();
        self.stop();
    }

    fn scene_or_err(&mut self, id: LayerId) -> Result<&mut Scene> {
        self.graph
            .scene_mut(id)
            .ok_or_else(|| SpectraError::config(format!("layer {id} is not a scene")))
    }

    fn binding(&self, owner: ParamOwner, parameter: &str) -> Result<Option<AutomationId>> {
        let scene = self
            .graph
            .scene(owner.scene())
            .ok_or_else(|| SpectraError::config(format!("layer {} is not a scene", owner.scene())))?;
        let bindings = match owner {
            ParamOwner::Scene(_) => scene.bindings(),
            ParamOwner::Item(_, item) => scene.item(item).map(Item::bindings).unwrap_or_default(),
        };
        Ok(bindings
            .iter()
            .find(|b| b.parameter == parameter)
            .map(|b| b.automation))
    }

    /// Removes candidates that no remaining binding references.
    fn drop_orphans(&mut self, candidates: HashSet<AutomationId>) {
        if candidates.is_empty() {
            return;
        }
        let in_use = self.graph.bound_automations();
        for id in candidates.difference(&in_use) {
            if self.automations.remove(*id).is_some() {
                tracing::debug!(automation = %id, "removed automation with no remaining binding");
            }
        }
    }
}

impl ParamOwner {
    fn scene(self) -> LayerId {
        match self {
            ParamOwner::Scene(scene) | ParamOwner::Item(scene, _) => scene,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{AutomationKind, ControlPoint};

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(Resolution::default())
    }

    fn loud() -> AudioFrame {
        AudioFrame::new((0..1024).map(|i| (i % 255) as f32).collect(), Vec::new())
    }

    #[test]
    fn state_machine_transitions() {
        let mut engine = orchestrator();
        assert_eq!(engine.state(), PlaybackState::Stopped);
        engine.play(0.0);
        assert_eq!(engine.state(), PlaybackState::Running);
        engine.seek_time(3.0);
        assert_eq!(engine.state(), PlaybackState::Seeking);
        engine.update(3.1, AudioFrame::empty(), true);
        assert_eq!(engine.state(), PlaybackState::Running);
        engine.stop();
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(engine.last_time(), 0.0);
        assert!(!engine.last_audio().has_audio());
    }

    #[test]
    fn automations_run_before_scenes_in_the_same_tick() {
        let mut engine = orchestrator();
        let scene = engine.add_scene("canvas").unwrap();
        let auto = engine.add_automation("math").unwrap();
        let automation = engine.automations_mut().get_mut(auto).unwrap();
        if let AutomationKind::Math(expr) = automation.kind_mut() {
            expr.set_expression("t / 10.0");
        }
        engine.bind(ParamOwner::Scene(scene), "opacity", auto).unwrap();

        let output = engine.update(4.0, AudioFrame::empty(), true);
        let crate::render::LayerOutput::Scene { opacity, .. } = &output.layers[0] else {
            panic!("scene output expected");
        };
        assert!((opacity - 0.4).abs() < 1e-6);
    }

    #[test]
    fn effects_only_compose_with_postprocessing() {
        let mut engine = orchestrator();
        engine.add_scene("canvas").unwrap();
        engine.add_scene("bloom").unwrap();
        assert_eq!(engine.update(0.0, AudioFrame::empty(), true).layers.len(), 1);
        engine.settings_mut().postprocessing_enabled = true;
        assert_eq!(engine.redo_update().layers.len(), 2);
    }

    #[test]
    fn attribution_is_appended_when_enabled() {
        let mut engine = orchestrator();
        let scene = engine.add_scene("canvas").unwrap();
        engine.add_item(scene, "spectrumRing").unwrap();
        assert!(engine.update(0.0, loud(), true).attribution.is_empty());
        engine.settings_mut().draw_attribution = true;
        assert_eq!(
            engine.redo_update().attribution,
            vec!["Visuals by:", "caseif", "Incept"]
        );
    }

    #[test]
    fn removing_an_item_drops_its_exclusive_automations() {
        let mut engine = orchestrator();
        let scene = engine.add_scene("canvas").unwrap();
        let a = engine.add_item(scene, "spectrumRing").unwrap();
        let b = engine.add_item(scene, "bars").unwrap();
        let shared = engine.add_automation("point").unwrap();
        let own = engine.add_automation("math").unwrap();

        engine.bind(ParamOwner::Item(scene, a), "scale", own).unwrap();
        engine.bind(ParamOwner::Item(scene, a), "alpha", shared).unwrap();
        engine.bind(ParamOwner::Item(scene, b), "alpha", shared).unwrap();

        engine.remove_item(scene, a).unwrap();
        assert!(!engine.automations().contains(own));
        assert!(engine.automations().contains(shared));

        engine.remove_layer(scene).unwrap();
        assert!(engine.automations().is_empty());
    }

    #[test]
    fn removing_an_automation_prunes_bindings() {
        let mut engine = orchestrator();
        let scene = engine.add_scene("ortho").unwrap();
        let auto = engine.add_automation("audio").unwrap();
        engine.bind(ParamOwner::Scene(scene), "opacity", auto).unwrap();
        engine.remove_automation(auto).unwrap();
        assert!(engine.graph().scene(scene).unwrap().bindings().is_empty());
    }

    #[test]
    fn rebinding_and_unbinding_release_automations() {
        let mut engine = orchestrator();
        let scene = engine.add_scene("canvas").unwrap();
        let first = engine.add_automation("point").unwrap();
        let second = engine.add_automation("point").unwrap();
        let owner = ParamOwner::Scene(scene);

        engine.bind(owner, "opacity", first).unwrap();
        engine.bind(owner, "opacity", second).unwrap();
        assert!(!engine.automations().contains(first));

        assert_eq!(engine.unbind(owner, "opacity").unwrap().automation, second);
        assert!(engine.automations().is_empty());
        assert!(engine.bind(owner, "opacity", first).is_err());
    }

    #[test]
    fn failing_scene_is_isolated() {
        let mut engine = orchestrator();
        let broken = engine.add_scene("ortho").unwrap();
        let healthy = engine.add_scene("canvas").unwrap();
        let image = engine.add_item(broken, "image").unwrap();
        engine.add_item(healthy, "spectrumRing").unwrap();
        engine
            .graph_mut()
            .scene_mut(broken)
            .and_then(|s| s.item_mut(image))
            .unwrap()
            .params_mut()
            .set("source", "movie.mkv")
            .unwrap();

        for frame in 0..3 {
            let output = engine.update(frame as f64 / 60.0, loud(), true);
            assert_eq!(output.layers.len(), 1);
            assert_eq!(output.failures.len(), 1);
            assert_eq!(output.failures[0].layer, broken);
        }
    }

    #[test]
    fn non_finite_times_reuse_the_last_frame_time() {
        let mut engine = orchestrator();
        let scene = engine.add_scene("canvas").unwrap();
        let curve = engine.add_automation("point").unwrap();
        let automation = engine.automations_mut().get_mut(curve).unwrap();
        if let AutomationKind::Point(points) = automation.kind_mut() {
            points.add_point(ControlPoint::new(0.0, 1.0));
            points.add_point(ControlPoint::new(2.0, 3.0));
        }
        engine.bind(ParamOwner::Scene(scene), "opacity", curve).unwrap();

        engine.play(0.0);
        engine.update(1.0, AudioFrame::empty(), true);
        assert_eq!(engine.seek_time(f64::NAN).time, 1.0);
        assert_eq!(engine.automations().value(curve), Some(2.0));
        assert_eq!(engine.update(f64::INFINITY, AudioFrame::empty(), true).time, 1.0);
        assert_eq!(engine.last_time(), 1.0);
    }

    #[test]
    fn fft_size_is_validated() {
        let mut engine = orchestrator();
        assert!(engine.set_fft_size(1000).is_err());
        engine.set_fft_size(2048).unwrap();
        assert_eq!(engine.settings().fft_size, 2048);
        assert_eq!(engine.last_audio().frequency_data.len(), 1024);
    }

    #[test]
    fn camera_helpers_touch_every_scene() {
        let mut engine = orchestrator();
        let a = engine.add_scene("perspective").unwrap();
        engine.add_scene("dotScreen").unwrap();
        engine.graph_mut().scene_mut(a).unwrap().camera.zoom = 3.0;

        engine.disable_all_controls();
        assert!(engine.graph().scenes().all(|s| !s.controls_enabled));
        engine.enable_all_controls();
        assert!(engine.graph().scenes().all(|s| s.controls_enabled));
        engine.reset_all_cameras();
        assert_eq!(engine.graph().scene(a).unwrap().camera.zoom, 1.0);
    }
}
