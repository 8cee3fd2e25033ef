use crate::config::SanitizerConfig;
use serde_json::{Map, Number, Value};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Location of a field inside tool arguments, rendered as `user.tags[2]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(Vec<Segment>);

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Number of containers between the root and this field.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn key(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Key(key.to_string()));
        Self(segments)
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Index(index));
        Self(segments)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{key}")?,
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    #[error("input is {size} bytes, limit is {limit}")]
    InputTooLarge { size: usize, limit: usize },

    #[error("{path}: expected {expected}, got {found}")]
    TypeMismatch {
        path: FieldPath,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{path}: missing required field(s): {}", missing.join(", "))]
    MissingRequired { path: FieldPath, missing: Vec<String> },

    #[error("{path}: string is {len} bytes, limit is {limit}")]
    StringTooLong {
        path: FieldPath,
        len: usize,
        limit: usize,
    },

    #[error("{path}: array has {len} items, limit is {limit}")]
    TooManyItems {
        path: FieldPath,
        len: usize,
        limit: usize,
    },

    #[error("{path}: nesting exceeds maximum depth of {limit}")]
    TooDeep { path: FieldPath, limit: usize },
}

impl SanitizeError {
    pub fn path(&self) -> Option<&FieldPath> {
        match self {
            Self::MalformedJson(_) | Self::InputTooLarge { .. } => None,
            Self::TypeMismatch { path, .. }
            | Self::MissingRequired { path, .. }
            | Self::StringTooLong { path, .. }
            | Self::TooManyItems { path, .. }
            | Self::TooDeep { path, .. } => Some(path),
        }
    }
}

/// Validates and coerces model-generated tool arguments against a tool's
/// JSON-schema-like input shape.
///
/// Coercion only ever converts between representations of the same value
/// (`"42"` to `42`, `"true"` to `true`). Values over a limit are rejected, never
/// truncated.
#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    config: SanitizerConfig,
}

impl Sanitizer {
    pub fn new(config: SanitizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SanitizerConfig {
        &self.config
    }

    pub fn sanitize(&self, raw: &Value, shape: Option<&Value>) -> Result<Value, SanitizeError> {
        let input = self.decode(raw)?;
        self.check_limits(&input, &FieldPath::root(), 1)?;

        match shape {
            Some(shape) => self.coerce(input, shape, &FieldPath::root()),
            None => Ok(input),
        }
    }

    fn decode(&self, raw: &Value) -> Result<Value, SanitizeError> {
        match raw {
            Value::Null => Ok(Value::Object(Map::new())),
            Value::String(text) => {
                if text.len() > self.config.max_input_bytes {
                    return Err(SanitizeError::InputTooLarge {
                        size: text.len(),
                        limit: self.config.max_input_bytes,
                    });
                }
                if text.trim().is_empty() {
                    return Ok(Value::Object(Map::new()));
                }
                match serde_json::from_str(text) {
                    Ok(Value::Null) => Ok(Value::Object(Map::new())),
                    Ok(value) => Ok(value),
                    Err(e) => Err(SanitizeError::MalformedJson(e.to_string())),
                }
            }
            other => Ok(other.clone()),
        }
    }

    /// Walks the whole input regardless of shape. The root container sits at
    /// depth 1.
    fn check_limits(&self, value: &Value, path: &FieldPath, depth: usize) -> Result<(), SanitizeError> {
        match value {
            Value::String(s) => self.check_string(s, path),
            Value::Array(items) => {
                self.check_depth(path, depth)?;
                if items.len() > self.config.max_array_items {
                    return Err(SanitizeError::TooManyItems {
                        path: path.clone(),
                        len: items.len(),
                        limit: self.config.max_array_items,
                    });
                }
                for (i, item) in items.iter().enumerate() {
                    self.check_limits(item, &path.index(i), depth + 1)?;
                }
                Ok(())
            }
            Value::Object(map) => {
                self.check_depth(path, depth)?;
                for (key, item) in map {
                    self.check_limits(item, &path.key(key), depth + 1)?;
                }
                Ok(())
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
        }
    }

    fn check_depth(&self, path: &FieldPath, depth: usize) -> Result<(), SanitizeError> {
        if depth > self.config.max_depth {
            return Err(SanitizeError::TooDeep {
                path: path.clone(),
                limit: self.config.max_depth,
            });
        }
        Ok(())
    }

    fn check_string(&self, s: &str, path: &FieldPath) -> Result<(), SanitizeError> {
        if s.len() > self.config.max_string_bytes {
            return Err(SanitizeError::StringTooLong {
                path: path.clone(),
                len: s.len(),
                limit: self.config.max_string_bytes,
            });
        }
        Ok(())
    }

    fn coerce(&self, value: Value, shape: &Value, path: &FieldPath) -> Result<Value, SanitizeError> {
        if value.is_null() {
            return Ok(value);
        }

        match declared_type(shape) {
            Some("string") => self.coerce_string(value, path),
            Some("integer") => coerce_integer(value, path),
            Some("number") => coerce_number(value, path),
            Some("boolean") => coerce_boolean(value, path),
            Some("object") => self.coerce_object(value, shape, path),
            Some("array") => self.coerce_array(value, shape, path),
            _ => Ok(value),
        }
    }

    fn coerce_string(&self, value: Value, path: &FieldPath) -> Result<Value, SanitizeError> {
        let text = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        self.check_string(&text, path)?;
        Ok(Value::String(text))
    }

    fn coerce_object(&self, value: Value, shape: &Value, path: &FieldPath) -> Result<Value, SanitizeError> {
        let map = match self.decode_embedded(value, path)? {
            Value::Object(map) => map,
            other => return Err(mismatch(path, "object", &other)),
        };

        let properties = shape.get("properties").and_then(Value::as_object);
        let additional = shape.get("additionalProperties");
        let closed = matches!(additional, Some(Value::Bool(false)));
        let extra_shape = additional.filter(|a| a.is_object());

        let mut out = Map::new();
        for (key, item) in map {
            let declared = properties.and_then(|p| p.get(&key));
            if closed && declared.is_none() {
                continue;
            }

            let item = match declared.or(extra_shape) {
                Some(sub) => self.coerce(item, sub, &path.key(&key))?,
                None => item,
            };
            out.insert(key, item);
        }

        if let Some(required) = shape.get("required").and_then(Value::as_array) {
            let missing: Vec<String> = required
                .iter()
                .filter_map(Value::as_str)
                .filter(|name| !out.contains_key(*name))
                .map(str::to_string)
                .collect();
            if !missing.is_empty() {
                return Err(SanitizeError::MissingRequired {
                    path: path.clone(),
                    missing,
                });
            }
        }

        Ok(Value::Object(out))
    }

    fn coerce_array(&self, value: Value, shape: &Value, path: &FieldPath) -> Result<Value, SanitizeError> {
        let items = match self.decode_embedded(value, path)? {
            Value::Array(items) => items,
            other => return Err(mismatch(path, "array", &other)),
        };

        if items.len() > self.config.max_array_items {
            return Err(SanitizeError::TooManyItems {
                path: path.clone(),
                len: items.len(),
                limit: self.config.max_array_items,
            });
        }

        let Some(item_shape) = shape.get("items").filter(|s| s.is_object()) else {
            return Ok(Value::Array(items));
        };

        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| self.coerce(item, item_shape, &path.index(i)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    /// Models often send nested objects or arrays as JSON text. Decoded
    /// containers are re-checked against the limits at their position.
    fn decode_embedded(&self, value: Value, path: &FieldPath) -> Result<Value, SanitizeError> {
        let Value::String(text) = &value else {
            return Ok(value);
        };

        match serde_json::from_str::<Value>(text.trim()) {
            Ok(decoded @ (Value::Object(_) | Value::Array(_))) => {
                self.check_limits(&decoded, path, path.len() + 1)?;
                Ok(decoded)
            }
            _ => Ok(value),
        }
    }
}

fn declared_type(shape: &Value) -> Option<&str> {
    match shape.get("type") {
        Some(Value::String(kind)) => Some(kind.as_str()),
        Some(Value::Array(kinds)) => kinds
            .iter()
            .filter_map(Value::as_str)
            .find(|kind| *kind != "null"),
        _ if ["properties", "required", "additionalProperties"]
            .iter()
            .any(|key| shape.get(key).is_some()) =>
        {
            Some("object")
        }
        _ if shape.get("items").is_some() => Some("array"),
        _ => None,
    }
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

fn mismatch(path: &FieldPath, expected: &'static str, found: &Value) -> SanitizeError {
    SanitizeError::TypeMismatch {
        path: path.clone(),
        expected,
        found: kind_of(found),
    }
}

/// Whole floats that fit in `i64`, or in `u64` above the signed range.
fn integral(f: f64) -> Option<Value> {
    if !f.is_finite() || f.fract() != 0.0 {
        return None;
    }
    if f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(Value::from(f as i64))
    } else if f >= 0.0 && f < u64::MAX as f64 {
        Some(Value::from(f as u64))
    } else {
        None
    }
}

fn coerce_integer(value: Value, path: &FieldPath) -> Result<Value, SanitizeError> {
    let coerced = match &value {
        Value::Number(n) if n.is_i64() || n.is_u64() => return Ok(value),
        Value::Number(n) => n.as_f64().and_then(integral),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Value::from)
                .or_else(|_| s.parse::<u64>().map(Value::from))
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        Value::Bool(b) => Some(Value::from(i64::from(*b))),
        _ => None,
    };

    coerced.ok_or_else(|| mismatch(path, "integer", &value))
}

fn coerce_number(value: Value, path: &FieldPath) -> Result<Value, SanitizeError> {
    let coerced = match &value {
        Value::Number(_) => return Ok(value),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Value::from)
                .or_else(|_| s.parse::<u64>().map(Value::from))
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .and_then(Number::from_f64)
                        .map(Value::Number)
                })
        }
        Value::Bool(b) => Some(Value::from(i64::from(*b))),
        _ => None,
    };

    coerced.ok_or_else(|| mismatch(path, "number", &value))
}

fn coerce_boolean(value: Value, path: &FieldPath) -> Result<Value, SanitizeError> {
    let coerced = match &value {
        Value::Bool(_) => return Ok(value),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 1.0 => Some(true),
            Some(f) if f == 0.0 => Some(false),
            _ => None,
        },
        _ => None,
    };

    coerced
        .map(Value::Bool)
        .ok_or_else(|| mismatch(path, "boolean", &value))
}
