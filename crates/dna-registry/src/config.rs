//! Module configuration: defaults, schema validation, and merging.
//!
//! Each module ships default settings plus a static schema (required
//! fields and typed rules). Composition merges defaults with request
//! overrides and then validates every merged module config against its
//! schema, producing field-level diagnostics instead of failing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::module::Module;

/// Per-module configuration block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleConfig {
    /// Default settings.
    #[serde(default)]
    pub defaults: Map<String, Value>,
    /// Fields that must be present after merging.
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Typed per-field rules.
    #[serde(default)]
    pub rules: Vec<ValidationRule>,
}

/// A rule attached to one config field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Field the rule applies to.
    pub field: String,
    /// The check to perform.
    #[serde(flatten)]
    pub rule: RuleKind,
}

/// The check performed by a [`ValidationRule`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum RuleKind {
    /// Value must be of the given JSON kind.
    Type { expected: ValueKind },
    /// Numeric value must lie in `[min, max]`.
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    /// String or array length must lie in `[min, max]`.
    Length {
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
    /// Value must equal one of the listed values.
    OneOf { values: Vec<Value> },
}

/// JSON value kinds usable in a [`RuleKind::Type`] check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ValueKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            ValueKind::String => value.is_string(),
            ValueKind::Number => value.is_number(),
            ValueKind::Integer => value.is_i64() || value.is_u64(),
            ValueKind::Boolean => value.is_boolean(),
            ValueKind::Object => value.is_object(),
            ValueKind::Array => value.is_array(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Number => "number",
            ValueKind::Integer => "integer",
            ValueKind::Boolean => "boolean",
            ValueKind::Object => "object",
            ValueKind::Array => "array",
        }
    }
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDiagnostic {
    /// Module whose config failed.
    pub module_id: String,
    /// Offending field.
    pub field: String,
    /// What went wrong.
    pub message: String,
}

/// Shallow merge: every top-level key in `overrides` replaces the default.
///
/// Nested objects are replaced wholesale, never merged recursively.
pub fn shallow_merge(defaults: &Map<String, Value>, overrides: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = defaults.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Build the merged configuration map for a resolved module set.
///
/// Global settings are seeded at the top level; each module then gets an
/// entry keyed by its id holding its defaults merged with the override
/// supplied for it (if any).
pub fn merge_configs<'a, F>(
    modules: &[std::sync::Arc<Module>],
    global: &Map<String, Value>,
    override_for: F,
) -> Map<String, Value>
where
    F: Fn(&str) -> Option<&'a Map<String, Value>>,
{
    let mut merged = global.clone();
    let empty = Map::new();
    for module in modules {
        let overrides = override_for(&module.id).unwrap_or(&empty);
        let config = shallow_merge(&module.config.defaults, overrides);
        merged.insert(module.id.clone(), Value::Object(config));
    }
    merged
}

/// Validate one module's merged config against its schema.
pub fn validate_config(module_id: &str, schema: &ModuleConfig, config: &Map<String, Value>) -> Vec<FieldDiagnostic> {
    let mut diagnostics = Vec::new();
    let mut report = |field: &str, message: String| {
        diagnostics.push(FieldDiagnostic {
            module_id: module_id.to_string(),
            field: field.to_string(),
            message,
        });
    };

    for field in &schema.required_fields {
        if config.get(field).map_or(true, Value::is_null) {
            report(field, "required field is missing".to_string());
        }
    }

    for rule in &schema.rules {
        // Optional fields are only checked when present.
        let Some(value) = config.get(&rule.field) else {
            continue;
        };
        if let Some(message) = check_rule(&rule.rule, value) {
            report(&rule.field, message);
        }
    }

    diagnostics
}

fn check_rule(rule: &RuleKind, value: &Value) -> Option<String> {
    match rule {
        RuleKind::Type { expected } => {
            (!expected.matches(value)).then(|| format!("expected {}, found {}", expected.label(), kind_of(value)))
        }
        RuleKind::Range { min, max } => {
            let Some(n) = value.as_f64() else {
                return Some(format!("expected number, found {}", kind_of(value)));
            };
            if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                Some(format!("{n} is outside {}", bounds(*min, *max)))
            } else {
                None
            }
        }
        RuleKind::Length { min, max } => {
            let len = match value {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                other => return Some(format!("expected string or array, found {}", kind_of(other))),
            };
            if min.is_some_and(|m| len < m) || max.is_some_and(|m| len > m) {
                Some(format!(
                    "length {len} is outside {}",
                    bounds(min.map(|m| m as f64), max.map(|m| m as f64))
                ))
            } else {
                None
            }
        }
        RuleKind::OneOf { values } => (!values.contains(value)).then(|| {
            let allowed: Vec<String> = values.iter().map(Value::to_string).collect();
            format!("{value} is not one of [{}]", allowed.join(", "))
        }),
    }
}

fn bounds(min: Option<f64>, max: Option<f64>) -> String {
    let lo = min.map(|m| m.to_string()).unwrap_or_else(|| "-inf".to_string());
    let hi = max.map(|m| m.to_string()).unwrap_or_else(|| "inf".to_string());
    format!("[{lo}, {hi}]")
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
