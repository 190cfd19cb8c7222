//! Attribute validators and schema-level config validation

use crate::schema::Schema;
use crate::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use regex::Regex;

/// Validator performs validation on attribute values during planning
/// Null and unknown values are skipped; requiredness is checked by the schema
pub trait Validator: Send + Sync {
    fn description(&self) -> String;
    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>);
}

pub struct StringLength {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl StringLength {
    pub fn at_least(min: usize) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }
}

impl Validator for StringLength {
    fn description(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("string length between {} and {}", min, max),
            (Some(min), None) => format!("string length at least {}", min),
            (None, Some(max)) => format!("string length at most {}", max),
            (None, None) => "any string length".to_string(),
        }
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        let Some(s) = value.as_string() else {
            return;
        };
        let len = s.chars().count();
        if let Some(min) = self.min {
            if len < min {
                diagnostics.push(
                    Diagnostic::error(
                        format!("{} must have minimum length of {}", path, min),
                        format!("Got length {}", len),
                    )
                    .with_attribute(path.clone()),
                );
            }
        }
        if let Some(max) = self.max {
            if len > max {
                diagnostics.push(
                    Diagnostic::error(
                        format!("{} must have maximum length of {}", path, max),
                        format!("Got length {}", len),
                    )
                    .with_attribute(path.clone()),
                );
            }
        }
    }
}

/// Accepts only strings from a fixed set
pub struct StringOneOf {
    allowed: Vec<String>,
}

impl StringOneOf {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl Validator for StringOneOf {
    fn description(&self) -> String {
        format!("one of: {}", self.allowed.join(", "))
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        let Some(s) = value.as_string() else {
            return;
        };
        if !self.allowed.iter().any(|a| a == s) {
            diagnostics.push(
                Diagnostic::error(
                    format!("Invalid value for {}", path),
                    format!("expected {}, got '{}'", self.description(), s),
                )
                .with_attribute(path.clone()),
            );
        }
    }
}

/// Requires a map attribute to hold `key`, with a string value matching `pattern`
pub struct MapEntryPattern {
    pub key: String,
    pub pattern: Regex,
    pub description: String,
}

impl MapEntryPattern {
    pub fn new(key: &str, pattern: Regex, description: &str) -> Self {
        Self {
            key: key.to_string(),
            pattern,
            description: description.to_string(),
        }
    }
}

impl Validator for MapEntryPattern {
    fn description(&self) -> String {
        format!("'{}' must be {}", self.key, self.description)
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        let Some(entries) = value.as_map() else {
            return;
        };
        let entry_path = path.clone().key(&self.key);
        match entries.get(&self.key) {
            None | Some(Dynamic::Null) => diagnostics.push(
                Diagnostic::error(
                    format!("{} must contain '{}'", path, self.key),
                    self.description(),
                )
                .with_attribute(path.clone()),
            ),
            Some(Dynamic::Unknown) => {}
            Some(Dynamic::String(s)) if self.pattern.is_match(s) => {}
            Some(other) => diagnostics.push(
                Diagnostic::error(
                    format!("{} must be {}", entry_path, self.description),
                    format!("Value {:?} does not match pattern", other),
                )
                .with_attribute(entry_path),
            ),
        }
    }
}

/// Validate `config` against `schema`: required attributes, unknown attributes,
/// computed-only attributes set by the user, value types and attribute validators
pub fn validate_config(schema: &Schema, config: &DynamicValue) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let entries = match &config.value {
        Dynamic::Map(entries) => Some(entries),
        Dynamic::Null => None,
        // Whole config unknown; nothing to check yet
        Dynamic::Unknown => return diagnostics,
        other => {
            diagnostics.push(Diagnostic::error(
                "Invalid configuration",
                format!("expected an object, got {}", other.type_name()),
            ));
            return diagnostics;
        }
    };

    if let Some(entries) = entries {
        for name in entries.keys() {
            if schema.attribute(name).is_none() {
                diagnostics.push(
                    Diagnostic::error(
                        format!("Unknown field: {}", name),
                        format!("The field '{}' is not defined in the schema", name),
                    )
                    .with_attribute(AttributePath::new(name)),
                );
            }
        }
    }

    for attr in &schema.block.attributes {
        let path = AttributePath::new(&attr.name);
        let value = entries
            .and_then(|e| e.get(&attr.name))
            .unwrap_or(&Dynamic::Null);

        if value.is_null() {
            if attr.required {
                diagnostics.push(
                    Diagnostic::error(
                        format!("Missing required field: {}", attr.name),
                        format!("The field '{}' is required but was not provided", attr.name),
                    )
                    .with_attribute(path),
                );
            }
            continue;
        }

        if attr.computed && !attr.optional && !attr.required {
            diagnostics.push(
                Diagnostic::error(
                    format!("Invalid configuration for computed field: {}", attr.name),
                    format!("The field '{}' is read-only and cannot be set", attr.name),
                )
                .with_attribute(path),
            );
            continue;
        }

        if !attr.r#type.accepts(value) {
            diagnostics.push(
                Diagnostic::error(
                    format!("Type mismatch for field: {}", attr.name),
                    format!(
                        "Field '{}' expects type {:?} but got {}",
                        attr.name,
                        attr.r#type,
                        value.type_name()
                    ),
                )
                .with_attribute(path),
            );
            continue;
        }

        if value.is_unknown() {
            continue;
        }

        if attr.deprecated {
            diagnostics.push(
                Diagnostic::warning(
                    format!("Deprecated field: {}", attr.name),
                    attr.description.clone(),
                )
                .with_attribute(path.clone()),
            );
        }

        for validator in &attr.validators {
            validator.validate(value, &path, &mut diagnostics);
        }
    }

    diagnostics
}
