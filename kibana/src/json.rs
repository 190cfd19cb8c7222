//! Opaque JSON documents and semantic comparison
//!
//! Rule and action `params` are free-form JSON owned by the rule or connector
//! type. They travel as raw text and are only parsed to compare them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use serde_json::Value;
use tfplug::plan_modifier::{PlanModifier, PlanModifyRequest, PlanModifyResponse};
use tfplug::types::{AttributePath, Diagnostic, Dynamic};
use tfplug::validator::Validator;

/// JSON text carried verbatim into and out of request bodies.
///
/// Construction does not check well-formedness; malformed text fails when
/// the enclosing body is serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawJson(String);

impl RawJson {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn parse(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.0)
    }
}

impl Serialize for RawJson {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = RawValue::from_string(self.0.clone()).map_err(serde::ser::Error::custom)?;
        raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RawJson {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        Ok(Self(raw.get().to_string()))
    }
}

/// Whether two JSON texts hold the same document.
///
/// Key order and whitespace are ignored, array order is not, and numbers
/// compare as `f64`, so integers beyond 2^53 match their nearest double.
/// Text that fails to parse never matches, not even itself.
pub fn semantic_eq(old: &str, new: &str) -> bool {
    let (Ok(old), Ok(new)) = (
        serde_json::from_str::<Value>(old),
        serde_json::from_str::<Value>(new),
    ) else {
        return false;
    };
    values_eq(&old, &new)
}

fn values_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_eq(x, y),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_eq(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(key, x)| y.get(key).is_some_and(|y| values_eq(x, y)))
        }
        _ => a == b,
    }
}

fn numbers_eq(x: &serde_json::Number, y: &serde_json::Number) -> bool {
    x.as_f64() == y.as_f64()
}

/// Keeps the prior JSON text when the planned text is the same document,
/// so reformatting `params` does not plan an update
pub struct SuppressEquivalentJson;

impl PlanModifier for SuppressEquivalentJson {
    fn description(&self) -> String {
        "ignores JSON formatting and key order changes".to_string()
    }

    fn modify_plan(&self, request: PlanModifyRequest) -> PlanModifyResponse {
        match (&request.state, &request.plan) {
            (Dynamic::String(old), Dynamic::String(new)) if old != new && semantic_eq(old, new) => {
                tracing::debug!(attribute = %request.attribute_path, "suppressing equivalent JSON diff");
                PlanModifyResponse {
                    plan_value: request.state.clone(),
                    requires_replace: false,
                    diagnostics: Vec::new(),
                }
            }
            _ => PlanModifyResponse::unchanged(request),
        }
    }
}

/// Requires a string attribute to hold a JSON document
pub struct ValidJson;

impl ValidJson {
    pub(crate) fn check(text: &str, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        if let Err(e) = serde_json::from_str::<Value>(text) {
            diagnostics.push(
                Diagnostic::error(format!("{} must be valid JSON", path), e.to_string())
                    .with_attribute(path.clone()),
            );
        }
    }
}

impl Validator for ValidJson {
    fn description(&self) -> String {
        "a valid JSON document".to_string()
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        if let Some(text) = value.as_string() {
            Self::check(text, path, diagnostics);
        }
    }
}
