//! Automations: scalar producers re-evaluated once per frame, before scenes
//! update, so bound parameters read the value produced for the same frame.

mod expression;
mod point;

use std::collections::HashMap;
use std::fmt;

use rhai::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use expression::MathExpression;
pub use point::{ControlPoint, PointCurve};

use crate::spectrum::{ImpactAnalyser, ImpactSettings};
use crate::{AudioFrame, Result, SpectraError};

pub type AutomationId = Uuid;

/// Links a named numeric parameter of a scene or item to an automation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Binding {
    pub parameter: String,
    pub automation: AutomationId,
}

impl Binding {
    pub fn new(parameter: impl Into<String>, automation: AutomationId) -> Self {
        Self {
            parameter: parameter.into(),
            automation,
        }
    }
}

/// Spectrum driven automation: band energy turned into an impact envelope
/// added on top of `base`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioImpact {
    pub base: f64,
    pub impact: ImpactSettings,
    #[serde(skip)]
    analyser: ImpactAnalyser,
}

impl PartialEq for AudioImpact {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base && self.impact == other.impact
    }
}

impl AudioImpact {
    pub fn new(base: f64, impact: ImpactSettings) -> Self {
        Self {
            base,
            impact,
            analyser: ImpactAnalyser::new(),
        }
    }

    fn evaluate(&mut self, time: f64, audio: &AudioFrame, should_increment: bool) -> f64 {
        let envelope = self.analyser.update(
            &self.impact,
            time as f32,
            &audio.frequency_data,
            should_increment,
        );
        self.base + envelope as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AutomationKind {
    Point(PointCurve),
    Math(MathExpression),
    Audio(AudioImpact),
}

impl AutomationKind {
    pub const TAGS: [&'static str; 3] = ["point", "math", "audio"];

    /// Default variant for a wire tag.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "point" => Ok(Self::Point(PointCurve::default())),
            "math" => Ok(Self::Math(MathExpression::default())),
            "audio" => Ok(Self::Audio(AudioImpact::default())),
            other => Err(SpectraError::unsupported("automation", other)),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Point(_) => "point",
            Self::Math(_) => "math",
            Self::Audio(_) => "audio",
        }
    }

    fn default_name(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point Automation",
            Self::Math(_) => "Input Based Automation",
            Self::Audio(_) => "Audio Impact Automation",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Automation {
    id: AutomationId,
    pub name: String,
    value: f64,
    kind: AutomationKind,
}

impl Automation {
    pub fn new(kind: AutomationKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: kind.default_name().to_string(),
            value: 0.0,
            kind,
        }
    }

    /// Factory keyed by wire tag (`point`, `math`, `audio`).
    pub fn from_tag(tag: &str) -> Result<Self> {
        AutomationKind::from_tag(tag).map(Self::new)
    }

    /// Keeps an identity that was assigned elsewhere, e.g. in a project file.
    pub fn with_id(mut self, id: AutomationId) -> Self {
        self.id = id;
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        if value.is_finite() {
            self.value = value;
        }
        self
    }

    pub fn id(&self) -> AutomationId {
        self.id
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn kind(&self) -> &AutomationKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut AutomationKind {
        &mut self.kind
    }

    pub fn tag(&self) -> &'static str {
        self.kind.tag()
    }

    /// Recomputes the value. Failures never escape: the previous value is
    /// retained and the problem is logged.
    pub fn update(&mut self, engine: &Engine, time: f64, audio: &AudioFrame, should_increment: bool) {
        match &mut self.kind {
            AutomationKind::Point(curve) => {
                if let Some(value) = curve.evaluate(time) {
                    self.value = value;
                }
            }
            AutomationKind::Math(expression) => match expression.evaluate(engine, time) {
                Ok(value) => self.value = value,
                Err(err) => {
                    tracing::debug!(automation = %self.id, %err, "keeping previous automation value");
                }
            },
            AutomationKind::Audio(impact) => {
                self.value = impact.evaluate(time, audio, should_increment);
            }
        }
    }

    /// Clears runtime accumulators (impact envelopes). Persisted settings and
    /// the current value stay as they are.
    pub fn reset_transient(&mut self) {
        if let AutomationKind::Audio(impact) = &mut self.kind {
            impact.analyser.reset();
        }
    }
}

/// Flat identity → automation mapping owned by the orchestrator, together
/// with the expression engine shared by every math automation.
pub struct AutomationRegistry {
    automations: HashMap<AutomationId, Automation>,
    engine: Engine,
}

impl Default for AutomationRegistry {
    fn default() -> Self {
        Self {
            automations: HashMap::new(),
            engine: expression::expression_engine(),
        }
    }
}

impl fmt::Debug for AutomationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutomationRegistry")
            .field("automations", &self.automations)
            .finish()
    }
}

impl AutomationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, tag: &str) -> Result<AutomationId> {
        let automation = Automation::from_tag(tag)?;
        Ok(self.insert(automation))
    }

    /// Registers `automation`, replacing any automation with the same id.
    pub fn insert(&mut self, automation: Automation) -> AutomationId {
        let id = automation.id();
        if self.automations.insert(id, automation).is_some() {
            tracing::warn!(automation = %id, "replaced automation with duplicate id");
        }
        id
    }

    pub fn get(&self, id: AutomationId) -> Option<&Automation> {
        self.automations.get(&id)
    }

    pub fn get_mut(&mut self, id: AutomationId) -> Option<&mut Automation> {
        self.automations.get_mut(&id)
    }

    pub fn remove(&mut self, id: AutomationId) -> Option<Automation> {
        self.automations.remove(&id)
    }

    pub fn contains(&self, id: AutomationId) -> bool {
        self.automations.contains_key(&id)
    }

    pub fn value(&self, id: AutomationId) -> Option<f64> {
        self.automations.get(&id).map(Automation::value)
    }

    pub fn len(&self) -> usize {
        self.automations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.automations.is_empty()
    }

    /// Automations ordered by id so that serialized output is stable.
    pub fn iter(&self) -> impl Iterator<Item = &Automation> {
        let mut all: Vec<_> = self.automations.values().collect();
        all.sort_by_key(|a| a.id());
        all.into_iter()
    }

    pub fn ids(&self) -> Vec<AutomationId> {
        self.iter().map(Automation::id).collect()
    }

    pub fn update_all(&mut self, time: f64, audio: &AudioFrame, should_increment: bool) {
        for automation in self.automations.values_mut() {
            automation.update(&self.engine, time, audio, should_increment);
        }
    }

    pub fn reset_transient(&mut self) {
        self.automations
            .values_mut()
            .for_each(Automation::reset_transient);
    }

    pub fn clear(&mut self) {
        self.automations.clear();
    }
}
