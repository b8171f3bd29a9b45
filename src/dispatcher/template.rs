//! Payload templates
//!
//! Relay payloads are built from a fixed JSON template whose string
//! leaves may reference named event-context fields as `{field}`.
//! Templates are validated at configuration load; there is no runtime
//! code evaluation anywhere in payload construction.

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Context fields a template may reference
pub const FIELDS: &[&str] = &[
    "device",
    "device_name",
    "event_type",
    "channel",
    "detection_target",
    "ip",
    "serial",
    "timestamp",
    "file_base",
    "xml",
    "image",
];

/// Named values substituted into a template
#[derive(Debug, Default)]
pub struct TemplateContext {
    values: HashMap<&'static str, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a known field; unknown names are a programming error
    pub fn set(mut self, field: &'static str, value: impl Into<String>) -> Self {
        debug_assert!(FIELDS.contains(&field));
        self.values.insert(field, value.into());
        self
    }

    fn get(&self, field: &str) -> &str {
        self.values.get(field).map(String::as_str).unwrap_or("")
    }
}

/// Validated payload template
#[derive(Debug, Clone)]
pub struct PayloadTemplate {
    template: Value,
}

impl PayloadTemplate {
    /// Validate every placeholder against the known field list
    pub fn compile(template: Value) -> Result<Self> {
        validate(&template)?;
        Ok(Self { template })
    }

    /// Substitute context fields into a copy of the template
    pub fn render(&self, context: &TemplateContext) -> Value {
        render_value(&self.template, context)
    }
}

fn validate(value: &Value) -> Result<()> {
    match value {
        Value::String(text) => {
            for name in placeholders(text) {
                let name = name?;
                if !FIELDS.contains(&name) {
                    return Err(Error::Template(format!(
                        "Unknown placeholder {{{}}}",
                        name
                    )));
                }
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(validate),
        Value::Object(map) => map.values().try_for_each(validate),
        _ => Ok(()),
    }
}

fn render_value(value: &Value, context: &TemplateContext) -> Value {
    match value {
        Value::String(text) => Value::String(render_string(text, context)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| render_value(v, context)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn render_string(text: &str, context: &TemplateContext) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        rest = &rest[open + 1..];
        match rest.find('}') {
            Some(close) => {
                out.push_str(context.get(&rest[..close]));
                rest = &rest[close + 1..];
            }
            None => {
                // Validated templates never get here
                out.push('{');
            }
        }
    }
    out.push_str(rest);
    out
}

/// Iterate placeholder names inside one string
fn placeholders(text: &str) -> impl Iterator<Item = Result<&str>> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let open = rest.find('{')?;
        rest = &rest[open + 1..];
        match rest.find('}') {
            Some(close) => {
                let name = &rest[..close];
                rest = &rest[close + 1..];
                Some(Ok(name))
            }
            None => {
                rest = "";
                Some(Err(Error::Template(
                    "Unterminated placeholder".to_string(),
                )))
            }
        }
    })
}
