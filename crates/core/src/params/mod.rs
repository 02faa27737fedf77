//! Parameter controllers: the introspectable surface every scene, item and
//! effect exposes to the UI collaborator and that automations bind to.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Result, SpectraError};

/// Concrete value held by a controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(value) => Some(value),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "boolean",
            ParamValue::Number(_) => "number",
            ParamValue::Text(_) => "text",
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

/// A single tunable field: `{name, currentValue, min?, max?, step?, enumValues?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    pub value: ParamValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl Parameter {
    fn new(name: &str, value: ParamValue) -> Self {
        Self {
            name: name.to_string(),
            value,
            min: None,
            max: None,
            step: None,
            enum_values: None,
        }
    }

    pub fn number(name: &str, value: f64) -> Self {
        Self::new(name, ParamValue::Number(value))
    }

    pub fn flag(name: &str, value: bool) -> Self {
        Self::new(name, ParamValue::Bool(value))
    }

    pub fn text(name: &str, value: &str) -> Self {
        Self::new(name, ParamValue::Text(value.to_string()))
    }

    pub fn choice(name: &str, value: &str, options: &[&str]) -> Self {
        Self {
            enum_values: Some(options.iter().map(|o| o.to_string()).collect()),
            ..Self::text(name, value)
        }
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    fn accept(&mut self, value: ParamValue) -> Result<()> {
        if self.value.kind() != value.kind() {
            return Err(SpectraError::config(format!(
                "parameter `{}` expects a {} value, got a {}",
                self.name,
                self.value.kind(),
                value.kind()
            )));
        }
        if let (Some(options), ParamValue::Text(text)) = (&self.enum_values, &value) {
            if !options.iter().any(|o| o == text) {
                return Err(SpectraError::config(format!(
                    "`{text}` is not one of {options:?} for parameter `{}`",
                    self.name
                )));
            }
        }
        if let ParamValue::Number(number) = value {
            if !number.is_finite() {
                return Err(SpectraError::config(format!(
                    "parameter `{}` only accepts finite numbers",
                    self.name
                )));
            }
        }
        self.value = value;
        Ok(())
    }
}

/// Anything that exposes named controllers to the UI collaborator.
pub trait Controllable {
    fn controllers(&self) -> Vec<Parameter>;

    fn set_controller(&mut self, name: &str, value: ParamValue) -> Result<()>;
}

/// Ordered collection of parameters. Declaration order is preserved so the
/// UI can lay controllers out the way the owning entity declared them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    pub fn new(params: Vec<Parameter>) -> Self {
        Self { params }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Numeric value of `name`, or `0.0` when it does not exist. Visual items
    /// only ask for the names they declared themselves.
    pub fn number(&self, name: &str) -> f64 {
        self.get(name)
            .and_then(|p| p.value.as_number())
            .unwrap_or_default()
    }

    pub fn number_f32(&self, name: &str) -> f32 {
        self.number(name) as f32
    }

    pub fn flag(&self, name: &str) -> bool {
        self.get(name)
            .and_then(|p| p.value.as_bool())
            .unwrap_or_default()
    }

    pub fn text(&self, name: &str) -> &str {
        self.get(name)
            .and_then(|p| p.value.as_text())
            .unwrap_or_default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) -> Result<()> {
        let param = self
            .params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| SpectraError::config(format!("unknown parameter `{name}`")))?;
        param.accept(value.into())
    }

    pub fn is_numeric(&self, name: &str) -> bool {
        matches!(
            self.get(name).map(|p| &p.value),
            Some(ParamValue::Number(_))
        )
    }

    /// Snapshot of current values keyed by name, used for persistence.
    pub fn values(&self) -> BTreeMap<String, ParamValue> {
        self.params
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }

    /// Restores persisted values one field at a time. Unknown names and
    /// ill-typed values are skipped so the declared default survives; every
    /// skipped entry is returned as a human readable issue.
    pub fn restore(&mut self, values: &BTreeMap<String, Value>) -> Vec<String> {
        let mut issues = Vec::new();
        for (name, raw) in values {
            let outcome = serde_json::from_value::<ParamValue>(raw.clone())
                .map_err(SpectraError::from)
                .and_then(|value| self.set(name, value));
            if let Err(err) = outcome {
                tracing::warn!(parameter = %name, %err, "keeping default parameter value");
                issues.push(format!("{name}: {err}"));
            }
        }
        issues
    }
}

impl Controllable for ParameterSet {
    fn controllers(&self) -> Vec<Parameter> {
        self.params.clone()
    }

    fn set_controller(&mut self, name: &str, value: ParamValue) -> Result<()> {
        self.set(name, value)
    }
}
