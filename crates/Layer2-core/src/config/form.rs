//! Config form descriptors
//!
//! The host turns these into input widgets; nothing here renders.

use plughost_foundation::ConfigValues;
use serde::Serialize;
use serde_json::Value;

use crate::plugin::{ChoiceOption, ConfigSchema, FieldKind};

/// Input widget suggested for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Widget {
    Text,
    Number,
    Toggle,
    Select,
}

/// One settings form row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub key: String,
    pub label: String,
    pub description: String,
    /// `string`, `number`, `boolean` or `choice`
    pub field_type: &'static str,
    pub widget: Widget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ChoiceOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Effective value, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<Value>,
}

/// Ordered descriptors, one per field in declaration order
pub fn describe_schema(schema: &ConfigSchema, current: Option<&ConfigValues>) -> Vec<FieldDescriptor> {
    schema
        .fields()
        .iter()
        .map(|field| {
            let (widget, min, max, step, options) = match &field.kind {
                FieldKind::String => (Widget::Text, None, None, None, Vec::new()),
                FieldKind::Boolean => (Widget::Toggle, None, None, None, Vec::new()),
                FieldKind::Number { min, max, step } => (Widget::Number, *min, *max, *step, Vec::new()),
                FieldKind::Choice { options } => (Widget::Select, None, None, None, options.clone()),
            };
            FieldDescriptor {
                key: field.key.clone(),
                label: field.label.clone(),
                description: field.description.clone(),
                field_type: field.kind.type_name(),
                widget,
                min,
                max,
                step,
                options,
                default: field.default.clone(),
                current: current.and_then(|values| values.get(&field.key).cloned()),
            }
        })
        .collect()
}
