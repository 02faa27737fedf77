//! Project documents: the persisted snapshot of settings, automations and
//! layers, plus the codec moving live state in and out of them.
//!
//! Loading never aborts on bad content. Malformed records are dropped,
//! unknown tags are skipped and ill-typed fields fall back to their defaults;
//! every such decision ends up in the [`LoadReport`].

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::automation::{Automation, AutomationId, AutomationKind, Binding};
use crate::config::{validate_fft_size, ProjectSettings};
use crate::engine::Orchestrator;
use crate::params::ParameterSet;
use crate::scene::{CameraState, ColorLayer, Item, Layer, Scene, Visual, OPEN_END_TIME};
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectDocument {
    pub settings: Map<String, Value>,
    #[serde(deserialize_with = "lenient_seq")]
    pub automations: Vec<AutomationRecord>,
    #[serde(deserialize_with = "lenient_seq")]
    pub scenes: Vec<LayerRecord>,
}

/// `{id, type, name, value, ...type-specific fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub value: f64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// A scene or, with `isScene: false`, a post-processing pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayerRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub is_scene: bool,
    pub controllers: BTreeMap<String, Value>,
    #[serde(deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub automations: Vec<Binding>,
    #[serde(deserialize_with = "lenient_option", skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraState>,
    #[serde(deserialize_with = "lenient_option", skip_serializing_if = "Option::is_none")]
    pub controls_enabled: Option<bool>,
    #[serde(deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ItemRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub start_time: f64,
    pub end_time: f64,
    pub controllers: BTreeMap<String, Value>,
    #[serde(deserialize_with = "lenient_seq", skip_serializing_if = "Vec::is_empty")]
    pub automations: Vec<Binding>,
    #[serde(deserialize_with = "lenient_option", skip_serializing_if = "Option::is_none")]
    pub analyser: Option<Map<String, Value>>,
    #[serde(deserialize_with = "lenient_option", skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<ColorLayer>>,
    #[serde(deserialize_with = "lenient_option", skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for ItemRecord {
    fn default() -> Self {
        Self {
            kind: String::new(),
            name: String::new(),
            start_time: 0.0,
            end_time: OPEN_END_TIME,
            controllers: BTreeMap::new(),
            automations: Vec::new(),
            analyser: None,
            colors: None,
            seed: None,
        }
    }
}

/// What a load did besides succeeding.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub automations: usize,
    pub layers: usize,
    pub issues: Vec<String>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    fn issue(&mut self, message: String) {
        tracing::warn!(%message, "project load");
        self.issues.push(message);
    }
}

pub struct ProjectCodec;

impl ProjectCodec {
    pub fn serialize(engine: &Orchestrator) -> ProjectDocument {
        ProjectDocument {
            settings: object_fields(engine.settings()),
            automations: engine.automations().iter().map(automation_record).collect(),
            scenes: engine.graph().layers().iter().map(layer_record).collect(),
        }
    }

    /// Replaces the engine's state with `document`. Automations are rebuilt
    /// before layers so that bindings can be checked against them.
    pub fn load(engine: &mut Orchestrator, document: &ProjectDocument) -> LoadReport {
        let mut report = LoadReport::default();
        engine.clear();

        let mut settings = ProjectSettings::default();
        restore_fields(&mut settings, &document.settings, "settings", &mut report);
        if let Err(err) = validate_fft_size(settings.fft_size) {
            report.issue(format!("settings: {err}; using the default"));
            settings.fft_size = ProjectSettings::default().fft_size;
        }
        let fft_size = settings.fft_size;
        *engine.settings_mut() = settings;
        if let Err(err) = engine.set_fft_size(fft_size) {
            report.issue(format!("settings: {err}"));
        }

        for (index, record) in document.automations.iter().enumerate() {
            let Some(automation) = restore_automation(index, record, &mut report) else {
                continue;
            };
            if engine.automations().contains(automation.id()) {
                report.issue(format!(
                    "automation {}: duplicate id; skipped",
                    automation.id()
                ));
                continue;
            }
            engine.insert_automation(automation);
            report.automations += 1;
        }

        let known: HashSet<AutomationId> = engine.automations().ids().into_iter().collect();
        for (index, record) in document.scenes.iter().enumerate() {
            restore_layer(engine, index, record, &known, &mut report);
        }
        engine.graph_mut().verify();

        tracing::info!(
            automations = report.automations,
            layers = report.layers,
            issues = report.issues.len(),
            "project loaded"
        );
        report
    }

    pub fn to_json(document: &ProjectDocument) -> Result<String> {
        Ok(serde_json::to_string_pretty(document)?)
    }

    pub fn from_json(json: &str) -> Result<ProjectDocument> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(engine: &Orchestrator, path: impl AsRef<Path>) -> Result<()> {
        let json = Self::to_json(&Self::serialize(engine))?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load_file(engine: &mut Orchestrator, path: impl AsRef<Path>) -> Result<LoadReport> {
        let json = fs::read_to_string(path)?;
        let document = Self::from_json(&json)?;
        Ok(Self::load(engine, &document))
    }
}

fn automation_record(automation: &Automation) -> AutomationRecord {
    let fields = match automation.kind() {
        AutomationKind::Point(curve) => object_fields(curve),
        AutomationKind::Math(expression) => object_fields(expression),
        AutomationKind::Audio(impact) => object_fields(impact),
    };
    AutomationRecord {
        id: Some(automation.id()),
        kind: automation.tag().to_string(),
        name: Some(automation.name.clone()),
        value: automation.value(),
        fields,
    }
}

fn layer_record(layer: &Layer) -> LayerRecord {
    match layer {
        Layer::Scene(scene) => LayerRecord {
            kind: scene.kind().tag().to_string(),
            is_scene: true,
            controllers: controller_values(scene.params()),
            automations: scene.bindings().to_vec(),
            camera: Some(scene.camera),
            controls_enabled: Some(scene.controls_enabled),
            items: scene.items().iter().map(item_record).collect(),
        },
        Layer::Effect(effect) => LayerRecord {
            kind: effect.kind().tag().to_string(),
            is_scene: false,
            controllers: controller_values(effect.params()),
            ..LayerRecord::default()
        },
    }
}

fn item_record(item: &Item) -> ItemRecord {
    let visual = item.visual();
    ItemRecord {
        kind: item.kind().tag().to_string(),
        name: item.name.clone(),
        start_time: item.start_time(),
        end_time: item.end_time(),
        controllers: controller_values(item.params()),
        automations: item.bindings().to_vec(),
        analyser: visual.analyser().map(|a| object_fields(a.config())),
        colors: match visual {
            Visual::SpectrumRing(ring) => Some(ring.colors().to_vec()),
            _ => None,
        },
        seed: visual.seed(),
    }
}

fn restore_automation(
    index: usize,
    record: &AutomationRecord,
    report: &mut LoadReport,
) -> Option<Automation> {
    let automation = match Automation::from_tag(&record.kind) {
        Ok(automation) => automation,
        Err(err) => {
            report.issue(format!("automation {index}: {err}; skipped"));
            return None;
        }
    };

    let mut automation = match record.id {
        Some(id) => automation.with_id(id),
        None => {
            report.issue(format!("automation {index}: missing id; assigned a new one"));
            automation
        }
    }
    .with_value(record.value);
    if let Some(name) = &record.name {
        automation.name = name.clone();
    }

    let context = format!("automation {}", automation.id());
    match automation.kind_mut() {
        AutomationKind::Point(curve) => {
            restore_fields(curve, &record.fields, &context, report);
            curve.normalize();
        }
        AutomationKind::Math(expression) => {
            restore_fields(expression, &record.fields, &context, report)
        }
        AutomationKind::Audio(impact) => restore_fields(impact, &record.fields, &context, report),
    }
    Some(automation)
}

fn restore_layer(
    engine: &mut Orchestrator,
    index: usize,
    record: &LayerRecord,
    known: &HashSet<AutomationId>,
    report: &mut LoadReport,
) {
    let id = match engine.add_scene(&record.kind) {
        Ok(id) => id,
        Err(err) => {
            report.issue(format!("layer {index}: {err}; skipped"));
            return;
        }
    };
    report.layers += 1;

    let context = format!("layer {index} ({})", record.kind);
    match engine.graph_mut().get_mut(id) {
        Some(Layer::Scene(scene)) => restore_scene(scene, record, known, &context, report),
        Some(Layer::Effect(effect)) => {
            restore_params(effect.params_mut(), &record.controllers, &context, report);
        }
        None => {}
    }
}

fn restore_scene(
    scene: &mut Scene,
    record: &LayerRecord,
    known: &HashSet<AutomationId>,
    context: &str,
    report: &mut LoadReport,
) {
    if let Some(camera) = record.camera {
        scene.camera = camera;
    }
    if let Some(enabled) = record.controls_enabled {
        scene.controls_enabled = enabled;
    }
    restore_params(scene.params_mut(), &record.controllers, context, report);
    restore_bindings(&record.automations, known, context, report, |b| scene.bind(b));

    for (index, item_record) in record.items.iter().enumerate() {
        let item_context = format!("{context} item {index} ({})", item_record.kind);
        let item = match scene.add_item(&item_record.kind) {
            Ok(id) => scene.item_mut(id),
            Err(err) => {
                report.issue(format!("{item_context}: {err}; skipped"));
                continue;
            }
        };
        if let Some(item) = item {
            restore_item(item, item_record, known, &item_context, report);
        }
    }
}

fn restore_item(
    item: &mut Item,
    record: &ItemRecord,
    known: &HashSet<AutomationId>,
    context: &str,
    report: &mut LoadReport,
) {
    if !record.name.is_empty() {
        item.name = record.name.clone();
    }
    if let Err(err) = item.set_window(record.start_time, record.end_time) {
        report.issue(format!("{context}: {err}"));
    }
    restore_params(item.params_mut(), &record.controllers, context, report);
    restore_bindings(&record.automations, known, context, report, |b| item.bind(b));

    let visual = item.visual_mut();
    if let Some(seed) = record.seed {
        visual.set_seed(seed);
    }
    if let Some(config) = &record.analyser {
        match visual.analyser_mut() {
            Some(analyser) => {
                restore_fields(analyser.config_mut(), config, context, report);
                analyser.reset();
            }
            None => report.issue(format!("{context}: has no analyser; settings ignored")),
        }
    }
    if let Some(colors) = &record.colors {
        match visual {
            Visual::SpectrumRing(ring) => *ring.colors_mut() = colors.clone(),
            _ => report.issue(format!("{context}: has no colour layers; colours ignored")),
        }
    }
}

fn restore_params(
    params: &mut ParameterSet,
    values: &BTreeMap<String, Value>,
    context: &str,
    report: &mut LoadReport,
) {
    for issue in params.restore(values) {
        report.issue(format!("{context}: {issue}"));
    }
}

fn restore_bindings(
    bindings: &[Binding],
    known: &HashSet<AutomationId>,
    context: &str,
    report: &mut LoadReport,
    mut attach: impl FnMut(Binding) -> Result<()>,
) {
    for binding in bindings {
        if !known.contains(&binding.automation) {
            report.issue(format!(
                "{context}: pruned binding of `{}` to missing automation {}",
                binding.parameter, binding.automation
            ));
            continue;
        }
        if let Err(err) = attach(binding.clone()) {
            report.issue(format!("{context}: {err}"));
        }
    }
}

fn controller_values(params: &ParameterSet) -> BTreeMap<String, Value> {
    params
        .values()
        .into_iter()
        .map(|(name, value)| (name, serde_json::to_value(value).unwrap_or(Value::Null)))
        .collect()
}

fn object_fields<T: Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => fields,
        _ => Map::new(),
    }
}

/// Applies `values` onto `target` one key at a time, so one bad field only
/// costs that field.
fn restore_fields<T>(target: &mut T, values: &Map<String, Value>, context: &str, report: &mut LoadReport)
where
    T: Serialize + DeserializeOwned,
{
    let mut current = object_fields(target);
    for (key, value) in values {
        if !current.contains_key(key) {
            report.issue(format!("{context}: unknown field `{key}` ignored"));
            continue;
        }
        let mut candidate = current.clone();
        candidate.insert(key.clone(), value.clone());
        match serde_json::from_value::<T>(Value::Object(candidate)) {
            Ok(_) => {
                current.insert(key.clone(), value.clone());
            }
            Err(err) => report.issue(format!("{context}: `{key}` kept its default ({err})")),
        }
    }

    match serde_json::from_value(Value::Object(current)) {
        Ok(restored) => *target = restored,
        Err(err) => report.issue(format!("{context}: {err}")),
    }
}

fn lenient_seq<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let entries = match Value::deserialize(deserializer)? {
        Value::Array(entries) => entries,
        Value::Null => Vec::new(),
        other => {
            tracing::warn!(found = %other, "expected a list; ignoring it");
            Vec::new()
        }
    };

    Ok(entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(index, %err, "dropping malformed record");
                None
            }
        })
        .collect())
}

fn lenient_option<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => Ok(serde_json::from_value(value)
            .map_err(|err| tracing::warn!(%err, "ignoring malformed value"))
            .ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resolution;
    use serde_json::json;

    fn engine() -> Orchestrator {
        Orchestrator::new(Resolution::default())
    }

    #[test]
    fn bad_settings_fields_fall_back_individually() {
        let document = ProjectCodec::from_json(
            r##"{"settings": {"clearColor": "#112233", "clearAlpha": "opaque", "fftSize": 1000, "zoom": 2}}"##,
        )
        .unwrap();
        let mut engine = engine();
        let report = ProjectCodec::load(&mut engine, &document);

        assert_eq!(engine.settings().clear_color, "#112233");
        assert_eq!(engine.settings().clear_alpha, 1.0);
        assert_eq!(engine.settings().fft_size, 16_384);
        assert_eq!(report.issues.len(), 3);
    }

    #[test]
    fn unknown_tags_are_reported_and_skipped() {
        let document = ProjectCodec::from_json(
            &json!({
                "automations": [{"type": "lfo", "id": Uuid::new_v4()}],
                "scenes": [
                    {"type": "hologram", "isScene": true},
                    {"type": "canvas", "isScene": true, "items": [{"type": "teapot"}, {"type": "bars"}]},
                    {"type": "film", "isScene": false, "controllers": {"grayscale": true}}
                ]
            })
            .to_string(),
        )
        .unwrap();
        let mut engine = engine();
        let report = ProjectCodec::load(&mut engine, &document);

        assert_eq!(report.automations, 0);
        assert_eq!(report.layers, 2);
        assert_eq!(report.issues.len(), 3);
        assert_eq!(engine.graph().scenes().next().unwrap().items().len(), 1);
    }

    #[test]
    fn malformed_records_are_dropped_at_parse_time() {
        let document = ProjectCodec::from_json(
            r#"{"automations": [42, {"type": "math", "inputString": "t"}], "scenes": "nope"}"#,
        )
        .unwrap();
        assert_eq!(document.automations.len(), 1);
        assert!(document.scenes.is_empty());

        let mut engine = engine();
        let report = ProjectCodec::load(&mut engine, &document);
        assert_eq!(report.automations, 1);
        assert!(report.issues[0].contains("missing id"));
    }

    #[test]
    fn bindings_to_missing_automations_are_pruned() {
        let ghost = Uuid::new_v4();
        let document = ProjectCodec::from_json(
            &json!({
                "scenes": [{
                    "type": "canvas",
                    "isScene": true,
                    "automations": [{"parameter": "opacity", "automation": ghost}]
                }]
            })
            .to_string(),
        )
        .unwrap();
        let mut engine = engine();
        let report = ProjectCodec::load(&mut engine, &document);

        assert!(engine.graph().scenes().next().unwrap().bindings().is_empty());
        assert!(report.issues[0].contains("pruned binding"));
    }

    #[test]
    fn analyser_settings_restore_field_by_field() {
        let document = ProjectCodec::from_json(
            &json!({
                "scenes": [{
                    "type": "canvas",
                    "isScene": true,
                    "items": [{
                        "type": "spectrumRing",
                        "analyser": {"spectrumSize": 12, "smoothingPoints": -3},
                        "seed": 77
                    }]
                }]
            })
            .to_string(),
        )
        .unwrap();
        let mut engine = engine();
        let report = ProjectCodec::load(&mut engine, &document);

        let scene = engine.graph().scenes().next().unwrap();
        let visual = scene.items()[0].visual();
        let config = visual.analyser().unwrap().config();
        assert_eq!(config.spectrum_size, 12);
        assert_eq!(config.smoothing_points, 3);
        assert_eq!(visual.seed(), Some(77));
        assert_eq!(report.issues.len(), 1);
    }
}
