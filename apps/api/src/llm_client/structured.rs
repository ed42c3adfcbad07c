//! Structured output: pulls one JSON object out of a free-form model reply and
//! checks it against the caller's schema.
//!
//! Parse order:
//! 1. strict parse of the whole reply (after stripping markdown code fences)
//! 2. the first balanced `{...}` span in the reply
//!
//! If neither yields an object the call fails with `UnparseableResponse`. There is
//! no "empty payload" fallback: a defaulted score of 0 would be indistinguishable
//! from a real zero.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::LlmError;

// ────────────────────────────────────────────────────────────────────────────
// Schema
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    String,
    /// Out-of-range values are clamped, not rejected.
    Number {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Integer {
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
    },
    Boolean,
    StringArray,
    /// Array of anything (strings or objects).
    Array,
    Object,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default = "required_by_default")]
    pub required: bool,
}

fn required_by_default() -> bool {
    true
}

/// Flat or shallow-nested mapping of field names to primitive/array types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub fields: Vec<FieldSpec>,
}

impl ResponseSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, kind: FieldKind, required: bool) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            required,
        });
        self
    }

    pub fn string(self, name: &str) -> Self {
        self.field(name, FieldKind::String, true)
    }

    pub fn number(self, name: &str, min: f64, max: f64) -> Self {
        self.field(
            name,
            FieldKind::Number {
                min: Some(min),
                max: Some(max),
            },
            true,
        )
    }

    pub fn string_array(self, name: &str) -> Self {
        self.field(name, FieldKind::StringArray, true)
    }

    pub fn array(self, name: &str) -> Self {
        self.field(name, FieldKind::Array, true)
    }

    pub fn object(self, name: &str) -> Self {
        self.field(name, FieldKind::Object, true)
    }

    pub fn optional(self, name: &str, kind: FieldKind) -> Self {
        self.field(name, kind, false)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// JSON skeleton for prompts, e.g. `"match_score": <number 0-100>`.
    pub fn describe(&self) -> String {
        let lines: Vec<String> = self
            .fields
            .iter()
            .map(|f| {
                let shape = match &f.kind {
                    FieldKind::String => "<string>".to_string(),
                    FieldKind::Number { min, max } => match (min, max) {
                        (Some(lo), Some(hi)) => format!("<number {lo}-{hi}>"),
                        _ => "<number>".to_string(),
                    },
                    FieldKind::Integer { min, max } => match (min, max) {
                        (Some(lo), Some(hi)) => format!("<integer {lo}-{hi}>"),
                        _ => "<integer>".to_string(),
                    },
                    FieldKind::Boolean => "<true|false>".to_string(),
                    FieldKind::StringArray => "[<string>, ...]".to_string(),
                    FieldKind::Array => "[...]".to_string(),
                    FieldKind::Object => "{...}".to_string(),
                };
                let optional = if f.required { "" } else { " (optional)" };
                format!("    \"{}\": {shape}{optional}", f.name)
            })
            .collect();
        format!("{{\n{}\n}}", lines.join(",\n"))
    }

    /// Validates and normalises `object`. Declared fields are type-checked and numbers
    /// clamped; undeclared fields are dropped.
    pub fn validate(&self, mut object: Map<String, Value>) -> Result<Map<String, Value>, LlmError> {
        let mut out = Map::new();

        for spec in &self.fields {
            let value = match object.remove(&spec.name) {
                Some(Value::Null) | None if spec.required => {
                    return Err(LlmError::SchemaValidation(format!(
                        "missing required field `{}`",
                        spec.name
                    )));
                }
                Some(Value::Null) | None => continue,
                Some(v) => v,
            };

            out.insert(spec.name.clone(), check_field(spec, value)?);
        }

        Ok(out)
    }
}

fn type_error(spec: &FieldSpec, expected: &str, got: &Value) -> LlmError {
    let got = match got {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    LlmError::SchemaValidation(format!(
        "field `{}` should be {expected}, got {got}",
        spec.name
    ))
}

fn check_field(spec: &FieldSpec, value: Value) -> Result<Value, LlmError> {
    match &spec.kind {
        FieldKind::String => match value {
            Value::String(_) => Ok(value),
            other => Err(type_error(spec, "a string", &other)),
        },
        FieldKind::Number { min, max } => {
            let n = value
                .as_f64()
                .ok_or_else(|| type_error(spec, "a number", &value))?;
            let clamped = clamp_f64(n, *min, *max);
            if clamped == n {
                return Ok(value);
            }
            Number::from_f64(clamped)
                .map(Value::Number)
                .ok_or_else(|| type_error(spec, "a finite number", &value))
        }
        FieldKind::Integer { min, max } => {
            let n = match value.as_i64() {
                Some(n) => n,
                None => match value.as_f64() {
                    Some(f) if f.fract() == 0.0 => f as i64,
                    _ => return Err(type_error(spec, "an integer", &value)),
                },
            };
            let mut clamped = n;
            if let Some(lo) = min {
                clamped = clamped.max(*lo);
            }
            if let Some(hi) = max {
                clamped = clamped.min(*hi);
            }
            Ok(Value::from(clamped))
        }
        FieldKind::Boolean => match value {
            Value::Bool(_) => Ok(value),
            other => Err(type_error(spec, "a boolean", &other)),
        },
        FieldKind::StringArray => match value {
            Value::Array(ref items) if items.iter().all(Value::is_string) => Ok(value),
            Value::Array(_) => Err(LlmError::SchemaValidation(format!(
                "field `{}` should contain only strings",
                spec.name
            ))),
            other => Err(type_error(spec, "an array of strings", &other)),
        },
        FieldKind::Array => match value {
            Value::Array(_) => Ok(value),
            other => Err(type_error(spec, "an array", &other)),
        },
        FieldKind::Object => match value {
            Value::Object(_) => Ok(value),
            other => Err(type_error(spec, "an object", &other)),
        },
    }
}

fn clamp_f64(n: f64, min: Option<f64>, max: Option<f64>) -> f64 {
    let mut n = n;
    if let Some(lo) = min {
        n = n.max(lo);
    }
    if let Some(hi) = max {
        n = n.min(hi);
    }
    n
}

// ────────────────────────────────────────────────────────────────────────────
// Extraction
// ────────────────────────────────────────────────────────────────────────────

/// Extracts a schema-conforming object from a raw model reply.
pub fn extract(raw: &str, schema: &ResponseSchema) -> Result<Map<String, Value>, LlmError> {
    let object = parse_json_object(raw)?;
    schema.validate(object)
}

/// Finds the JSON object in `raw`: strict parse first, then the first balanced span.
pub fn parse_json_object(raw: &str) -> Result<Map<String, Value>, LlmError> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(strip_json_fences(raw)) {
        return Ok(map);
    }

    if let Some(span) = first_balanced_object(raw) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(span) {
            return Ok(map);
        }
    }

    let preview: String = raw.trim().chars().take(120).collect();
    Err(LlmError::UnparseableResponse(if preview.is_empty() {
        "empty reply".to_string()
    } else {
        format!("no JSON object found in reply starting with {preview:?}")
    }))
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

/// The first `{...}` span whose braces balance, ignoring braces inside strings.
/// Returns `None` if the first object is never closed.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}
