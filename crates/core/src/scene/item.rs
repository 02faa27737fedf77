use serde::{Deserialize, Serialize};

use super::ring::SpectrumRing;
use super::visuals::{ImageSprite, ParticleField, SpectrumBars};
use crate::automation::{AutomationRegistry, Binding};
use crate::config::Resolution;
use crate::params::{Parameter, ParameterSet};
use crate::render::RenderOp;
use crate::spectrum::SpectrumAnalyser;
use crate::{AudioFrame, Result, SpectraError};

pub type ItemId = u64;

/// Items without an explicit window stay active for the whole timeline.
pub const OPEN_END_TIME: f64 = f64::MAX;

/// Per-frame inputs shared by every item of a scene.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    pub time: f64,
    pub audio: &'a AudioFrame,
    pub should_increment: bool,
    pub resolution: Resolution,
}

impl FrameContext<'_> {
    /// True when this frame carries audio that may be folded into
    /// accumulators.
    pub fn has_new_audio(&self) -> bool {
        self.should_increment && self.audio.has_audio()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    #[serde(rename = "spectrumRing")]
    SpectrumRing,
    #[serde(rename = "bars")]
    Bars,
    #[serde(rename = "particles")]
    Particles,
    #[serde(rename = "image")]
    Image,
}

impl ItemKind {
    pub const TAGS: [&'static str; 4] = ["spectrumRing", "bars", "particles", "image"];

    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "spectrumRing" => Ok(Self::SpectrumRing),
            "bars" => Ok(Self::Bars),
            "particles" => Ok(Self::Particles),
            "image" => Ok(Self::Image),
            other => Err(SpectraError::unsupported("item", other)),
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::SpectrumRing => "spectrumRing",
            Self::Bars => "bars",
            Self::Particles => "particles",
            Self::Image => "image",
        }
    }

    pub fn default_name(self) -> &'static str {
        match self {
            Self::SpectrumRing => "Spectrum Ring",
            Self::Bars => "Spectrum Bars",
            Self::Particles => "Particles",
            Self::Image => "Image",
        }
    }

    /// People credited when attribution is drawn.
    pub fn authors(self) -> &'static [&'static str] {
        match self {
            Self::SpectrumRing => &["caseif", "Incept"],
            Self::Bars | Self::Particles | Self::Image => &[],
        }
    }
}

/// The drawing half of an item together with its transient state.
#[derive(Debug, Clone)]
pub enum Visual {
    SpectrumRing(SpectrumRing),
    Bars(SpectrumBars),
    Particles(ParticleField),
    Image(ImageSprite),
}

impl Visual {
    fn new(kind: ItemKind, seed: u64) -> Self {
        match kind {
            ItemKind::SpectrumRing => Visual::SpectrumRing(SpectrumRing::new(seed)),
            ItemKind::Bars => Visual::Bars(SpectrumBars::new()),
            ItemKind::Particles => Visual::Particles(ParticleField::new(seed)),
            ItemKind::Image => Visual::Image(ImageSprite),
        }
    }

    fn parameters(kind: ItemKind, resolution: Resolution) -> Vec<Parameter> {
        match kind {
            ItemKind::SpectrumRing => SpectrumRing::parameters(resolution),
            ItemKind::Bars => SpectrumBars::parameters(),
            ItemKind::Particles => ParticleField::parameters(),
            ItemKind::Image => ImageSprite::parameters(),
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Visual::SpectrumRing(_) => ItemKind::SpectrumRing,
            Visual::Bars(_) => ItemKind::Bars,
            Visual::Particles(_) => ItemKind::Particles,
            Visual::Image(_) => ItemKind::Image,
        }
    }

    pub fn analyser(&self) -> Option<&SpectrumAnalyser> {
        match self {
            Visual::SpectrumRing(ring) => Some(ring.analyser()),
            Visual::Bars(bars) => Some(bars.analyser()),
            _ => None,
        }
    }

    pub fn analyser_mut(&mut self) -> Option<&mut SpectrumAnalyser> {
        match self {
            Visual::SpectrumRing(ring) => Some(ring.analyser_mut()),
            Visual::Bars(bars) => Some(bars.analyser_mut()),
            _ => None,
        }
    }

    /// Seed behind the item's randomness, for visuals that have any.
    pub fn seed(&self) -> Option<u64> {
        match self {
            Visual::SpectrumRing(ring) => Some(ring.seed()),
            Visual::Particles(field) => Some(field.seed()),
            _ => None,
        }
    }

    pub fn set_seed(&mut self, seed: u64) {
        match self {
            Visual::SpectrumRing(ring) => ring.set_seed(seed),
            Visual::Particles(field) => field.set_seed(seed),
            _ => {}
        }
    }

    fn update(&mut self, ctx: &FrameContext<'_>, params: &ParameterSet) -> Result<Vec<RenderOp>> {
        match self {
            Visual::SpectrumRing(ring) => Ok(ring.update(ctx, params)),
            Visual::Bars(bars) => Ok(bars.update(ctx, params)),
            Visual::Particles(field) => Ok(field.update(ctx, params)),
            Visual::Image(image) => image.update(ctx, params),
        }
    }

    fn reset(&mut self) {
        match self {
            Visual::SpectrumRing(ring) => ring.reset(),
            Visual::Bars(bars) => bars.reset(),
            Visual::Particles(field) => field.reset(),
            Visual::Image(_) => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct Item {
    id: ItemId,
    pub name: String,
    start_time: f64,
    end_time: f64,
    params: ParameterSet,
    bindings: Vec<Binding>,
    visual: Visual,
}

impl Item {
    pub(crate) fn new(id: ItemId, kind: ItemKind, resolution: Resolution) -> Self {
        Self {
            id,
            name: kind.default_name().to_string(),
            start_time: 0.0,
            end_time: OPEN_END_TIME,
            params: ParameterSet::new(Visual::parameters(kind, resolution)),
            bindings: Vec::new(),
            visual: Visual::new(kind, rand::random()),
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn kind(&self) -> ItemKind {
        self.visual.kind()
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    /// Sets the activation window `[start, end]`.
    pub fn set_window(&mut self, start: f64, end: f64) -> Result<()> {
        if start.is_nan() || end.is_nan() || start > end {
            return Err(SpectraError::config(format!(
                "invalid activation window [{start}, {end}] for `{}`",
                self.name
            )));
        }
        self.start_time = start;
        self.end_time = end;
        Ok(())
    }

    pub fn is_active(&self, time: f64) -> bool {
        self.start_time <= time && time <= self.end_time
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

    pub fn visual(&self) -> &Visual {
        &self.visual
    }

    pub fn visual_mut(&mut self) -> &mut Visual {
        &mut self.visual
    }

    pub(crate) fn bind(&mut self, binding: Binding) -> Result<()> {
        attach_binding(&self.params, &mut self.bindings, binding)
    }

    pub(crate) fn unbind(&mut self, parameter: &str) -> Option<Binding> {
        detach_binding(&mut self.bindings, parameter)
    }

    pub(crate) fn retain_bindings(&mut self, keep: impl FnMut(&Binding) -> bool) {
        self.bindings.retain(keep);
    }

    pub(crate) fn update(
        &mut self,
        ctx: &FrameContext<'_>,
        automations: &AutomationRegistry,
    ) -> Result<Vec<RenderOp>> {
        apply_bindings(&mut self.params, &self.bindings, automations);
        self.visual.update(ctx, &self.params)
    }

    /// Drops caches, history and motion; parameters are untouched.
    pub fn reset(&mut self) {
        self.visual.reset();
    }
}

/// Adds `binding`, replacing an earlier binding of the same parameter.
/// Only numeric parameters can be automated.
pub(crate) fn attach_binding(
    params: &ParameterSet,
    bindings: &mut Vec<Binding>,
    binding: Binding,
) -> Result<()> {
    if !params.is_numeric(&binding.parameter) {
        return Err(SpectraError::config(format!(
            "`{}` is not a numeric parameter and cannot be automated",
            binding.parameter
        )));
    }
    bindings.retain(|b| b.parameter != binding.parameter);
    bindings.push(binding);
    Ok(())
}

pub(crate) fn detach_binding(bindings: &mut Vec<Binding>, parameter: &str) -> Option<Binding> {
    let index = bindings.iter().position(|b| b.parameter == parameter)?;
    Some(bindings.remove(index))
}

/// Writes the current automation values into their bound parameters.
pub(crate) fn apply_bindings(
    params: &mut ParameterSet,
    bindings: &[Binding],
    automations: &AutomationRegistry,
) {
    for binding in bindings {
        let Some(value) = automations.value(binding.automation) else {
            tracing::warn!(
                parameter = %binding.parameter,
                automation = %binding.automation,
                "binding points at a missing automation"
            );
            continue;
        };
        if let Err(err) = params.set(&binding.parameter, value) {
            tracing::warn!(parameter = %binding.parameter, %err, "automation value rejected");
        }
    }
}
