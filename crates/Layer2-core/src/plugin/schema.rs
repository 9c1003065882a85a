//! Config Schema - typed plugin configuration fields
//!
//! A manifest's `configSchema` is an ordered object of `key -> field`. Field
//! order is preserved so settings forms list fields the way the author wrote
//! them.

use serde::Serialize;
use serde_json::{Map, Value};

// ============================================================================
// FieldKind
// ============================================================================

/// Field type with its type-specific constraints
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number {
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<f64>,
    },
    Boolean,
    Choice { options: Vec<ChoiceOption> },
}

impl FieldKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number { .. } => "number",
            Self::Boolean => "boolean",
            Self::Choice { .. } => "choice",
        }
    }
}

/// One allowed value of a choice field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoiceOption {
    pub value: Value,
    pub label: String,
}

// ============================================================================
// ConfigField
// ============================================================================

/// A single configuration field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigField {
    pub key: String,
    pub label: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl ConfigField {
    /// Check a value against the field's type and constraints
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match &self.kind {
            FieldKind::String => {
                if !value.is_string() {
                    return Err(format!("expected a string, got {}", json_type(value)));
                }
            }
            FieldKind::Boolean => {
                if !value.is_boolean() {
                    return Err(format!("expected a boolean, got {}", json_type(value)));
                }
            }
            FieldKind::Number { min, max, .. } => {
                let n = value
                    .as_f64()
                    .ok_or_else(|| format!("expected a number, got {}", json_type(value)))?;
                if let Some(min) = min {
                    if n < *min {
                        return Err(format!("{} is below the minimum {}", n, min));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(format!("{} is above the maximum {}", n, max));
                    }
                }
            }
            FieldKind::Choice { options } => {
                if !options.iter().any(|o| values_equal(&o.value, value)) {
                    let allowed: Vec<String> =
                        options.iter().map(|o| o.value.to_string()).collect();
                    return Err(format!(
                        "{} is not one of [{}]",
                        value,
                        allowed.join(", ")
                    ));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// ConfigSchema
// ============================================================================

/// Ordered set of config fields
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConfigSchema {
    fields: Vec<ConfigField>,
}

impl ConfigSchema {
    pub fn new(fields: Vec<ConfigField>) -> Self {
        Self { fields }
    }

    /// Parse the raw `configSchema` object, collecting every problem found
    pub fn from_value(raw: &Value) -> Result<Self, Vec<String>> {
        let object = match raw {
            Value::Object(object) => object,
            other => {
                return Err(vec![format!(
                    "configSchema must be an object, got {}",
                    json_type(other)
                )])
            }
        };

        let mut fields = Vec::with_capacity(object.len());
        let mut issues = Vec::new();

        for (key, spec) in object {
            match parse_field(key, spec) {
                Ok(field) => fields.push(field),
                Err(mut field_issues) => issues.append(&mut field_issues),
            }
        }

        if issues.is_empty() {
            Ok(Self { fields })
        } else {
            Err(issues)
        }
    }

    pub fn field(&self, key: &str) -> Option<&ConfigField> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn fields(&self) -> &[ConfigField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn parse_field(key: &str, spec: &Value) -> Result<ConfigField, Vec<String>> {
    let at = |msg: String| format!("configSchema.{}: {}", key, msg);

    let spec = spec
        .as_object()
        .ok_or_else(|| vec![at("field must be an object".into())])?;

    let mut issues = Vec::new();

    let type_name = match spec.get("type") {
        Some(Value::String(t)) => t.as_str(),
        Some(other) => {
            return Err(vec![at(format!(
                "type must be a string, got {}",
                json_type(other)
            ))])
        }
        None => return Err(vec![at("missing type".into())]),
    };

    let kind = match type_name {
        "string" => FieldKind::String,
        "boolean" => FieldKind::Boolean,
        "number" => {
            let min = optional_number(spec, "min").map_err(|e| vec![at(e)])?;
            let max = optional_number(spec, "max").map_err(|e| vec![at(e)])?;
            let step = optional_number(spec, "step").map_err(|e| vec![at(e)])?;
            if let (Some(lo), Some(hi)) = (min, max) {
                if lo > hi {
                    issues.push(at(format!("min ({}) is greater than max ({})", lo, hi)));
                }
            }
            if let Some(step) = step {
                if step <= 0.0 {
                    issues.push(at(format!("step must be positive, got {}", step)));
                }
            }
            FieldKind::Number { min, max, step }
        }
        "choice" => {
            let options = parse_options(spec).map_err(|e| vec![at(e)])?;
            if options.is_empty() {
                issues.push(at("choice field requires a non-empty options set".into()));
            }
            FieldKind::Choice { options }
        }
        other => return Err(vec![at(format!("unknown field type '{}'", other))]),
    };

    let label = match spec.get("label") {
        Some(Value::String(label)) => label.clone(),
        None => key.to_string(),
        Some(other) => {
            issues.push(at(format!("label must be a string, got {}", json_type(other))));
            key.to_string()
        }
    };

    let description = match spec.get("description") {
        Some(Value::String(desc)) => desc.clone(),
        None => String::new(),
        Some(other) => {
            issues.push(at(format!(
                "description must be a string, got {}",
                json_type(other)
            )));
            String::new()
        }
    };

    let field = ConfigField {
        key: key.to_string(),
        label,
        description,
        default: spec.get("default").filter(|v| !v.is_null()).cloned(),
        kind,
    };

    if issues.is_empty() {
        if let Some(default) = &field.default {
            if let Err(e) = field.check(default) {
                issues.push(at(format!("invalid default: {}", e)));
            }
        }
    }

    if issues.is_empty() {
        Ok(field)
    } else {
        Err(issues)
    }
}

fn optional_number(spec: &Map<String, Value>, name: &str) -> Result<Option<f64>, String> {
    match spec.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("{} must be a number, got {}", name, json_type(v))),
    }
}

fn parse_options(spec: &Map<String, Value>) -> Result<Vec<ChoiceOption>, String> {
    let raw = match spec.get("options") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(format!("options must be an array, got {}", json_type(other)))
        }
    };

    let mut options: Vec<ChoiceOption> = Vec::with_capacity(raw.len());
    for item in raw {
        let option = match item {
            Value::Object(obj) => {
                let value = obj
                    .get("value")
                    .filter(|v| is_primitive(v))
                    .cloned()
                    .ok_or_else(|| "option objects need a primitive `value`".to_string())?;
                let label = obj
                    .get("label")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| display_value(&value));
                ChoiceOption { value, label }
            }
            v if is_primitive(v) => ChoiceOption {
                value: v.clone(),
                label: display_value(v),
            },
            other => return Err(format!("invalid option {}", other)),
        };
        if options.iter().any(|o| values_equal(&o.value, &option.value)) {
            return Err(format!("duplicate option {}", option.value));
        }
        options.push(option);
    }
    Ok(options)
}

fn is_primitive(v: &Value) -> bool {
    v.is_string() || v.is_number() || v.is_boolean()
}

fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Equality that treats `1` and `1.0` as the same number
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

pub(crate) fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
