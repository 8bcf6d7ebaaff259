//! Typed request schema and validation for `POST /generate`.
//!
//! The schema is a small JSON Schema document (object with `properties`
//! and `required`). It is parsed once at startup into [`RequestSchema`];
//! request bodies are then checked against the typed record, producing a
//! [`GenerationRequest`] with defaults filled in. Violation messages use
//! the phrasing of the Python `jsonschema` package; offending values are
//! rendered as JSON (`true`, `"big"`), not as Python reprs.
//!
//! Only the keywords this module enforces are accepted in a schema
//! document. Anything else fails at load time rather than being ignored.
//! As in draft-07, an integer property accepts numbers with a zero
//! fractional part (`512.0`).

use std::collections::HashMap;

use rand::Rng;
use serde::Deserialize;
use serde_json::{Map, Number, Value};

use crate::error::CoreError;
use crate::request::GenerationRequest;

/// The request schema shipped with the service.
pub const BUNDLED_SCHEMA: &str = include_str!("../schemas/generate.json");

/// Problems found while loading a schema document at startup.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Schema is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Schema property '{0}' is missing")]
    MissingProperty(&'static str),

    #[error("Schema property '{property}' must have type '{expected}'")]
    WrongType {
        property: &'static str,
        expected: &'static str,
    },

    #[error("Schema property '{0}' needs a default")]
    MissingDefault(&'static str),

    #[error("Schema property '{property}' is invalid: {reason}")]
    Invalid {
        property: &'static str,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Schema document (wire shape)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaDocument {
    #[serde(rename = "$schema")]
    _dialect: Option<String>,
    #[serde(rename = "title")]
    _title: Option<String>,
    #[serde(rename = "type")]
    _kind: Option<String>,
    #[serde(default)]
    properties: HashMap<String, PropertyDocument>,
    #[serde(default)]
    required: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PropertyDocument {
    #[serde(rename = "description")]
    _description: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    minimum: Option<Number>,
    maximum: Option<Number>,
    #[serde(rename = "minLength")]
    min_length: Option<usize>,
    default: Option<Value>,
}

// ---------------------------------------------------------------------------
// Typed schema
// ---------------------------------------------------------------------------

/// Constraints for a string property.
#[derive(Debug, Clone, PartialEq)]
pub struct StringField {
    pub required: bool,
    pub min_length: usize,
    pub default: String,
}

/// Constraints for an integer property. Bounds are inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegerField {
    pub required: bool,
    pub minimum: u64,
    pub maximum: u64,
    pub default: Option<u64>,
}

/// Constraints for a floating-point property. Bounds are inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberField {
    pub required: bool,
    pub minimum: f64,
    pub maximum: f64,
    pub default: Option<f64>,
}

/// The `POST /generate` body schema, resolved into typed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSchema {
    pub prompt: StringField,
    pub seed: IntegerField,
    pub width: IntegerField,
    pub height: IntegerField,
    pub steps: IntegerField,
    pub cfg: NumberField,
    pub denoise: NumberField,
    /// Required property names in document order, for error reporting.
    required: Vec<String>,
}

impl RequestSchema {
    /// Parse the schema bundled with the crate.
    pub fn bundled() -> Result<Self, SchemaError> {
        Self::from_json_str(BUNDLED_SCHEMA)
    }

    /// Parse a JSON Schema document into a typed schema.
    ///
    /// Every known property must be declared. Dimension, step and guidance
    /// properties must carry a default; `seed` may omit one, in which case
    /// a seed is drawn uniformly from its bounds per request.
    pub fn from_json_str(text: &str) -> Result<Self, SchemaError> {
        let doc: SchemaDocument = serde_json::from_str(text)?;

        let prompt = string_field(&doc, "prompt")?;
        let seed = integer_field(&doc, "seed", u64::MAX)?;
        let width = integer_field(&doc, "width", u64::from(u32::MAX))?;
        let height = integer_field(&doc, "height", u64::from(u32::MAX))?;
        let steps = integer_field(&doc, "steps", u64::from(u32::MAX))?;
        let cfg = number_field(&doc, "cfg")?;
        let denoise = number_field(&doc, "denoise")?;

        for (name, missing_default) in [
            ("width", !width.required && width.default.is_none()),
            ("height", !height.required && height.default.is_none()),
            ("steps", !steps.required && steps.default.is_none()),
            ("cfg", !cfg.required && cfg.default.is_none()),
            ("denoise", !denoise.required && denoise.default.is_none()),
        ] {
            if missing_default {
                return Err(SchemaError::MissingDefault(name));
            }
        }

        Ok(Self {
            prompt,
            seed,
            width,
            height,
            steps,
            cfg,
            denoise,
            required: doc.required,
        })
    }

    /// Validate a request body and apply defaults.
    pub fn validate(&self, body: &Value) -> Result<GenerationRequest, CoreError> {
        self.validate_with_rng(body, &mut rand::rng())
    }

    /// Same as [`validate`](Self::validate) with an explicit random source
    /// for the generated seed.
    pub fn validate_with_rng<R: Rng>(
        &self,
        body: &Value,
        rng: &mut R,
    ) -> Result<GenerationRequest, CoreError> {
        let Value::Object(obj) = body else {
            return Err(type_error(body, "object"));
        };

        for name in &self.required {
            if present(obj, name).is_none() {
                return Err(CoreError::Validation(format!(
                    "'{name}' is a required property"
                )));
            }
        }

        let prompt = match present(obj, "prompt") {
            Some(v) => read_string(v, &self.prompt)?,
            None => self.prompt.default.clone(),
        };

        let seed = match present(obj, "seed") {
            Some(v) => read_integer(v, &self.seed)?,
            None => match self.seed.default {
                Some(seed) => seed,
                None => self.generate_seed(rng),
            },
        };

        Ok(GenerationRequest {
            prompt,
            seed,
            width: read_dimension(obj, "width", &self.width)?,
            height: read_dimension(obj, "height", &self.height)?,
            steps: read_dimension(obj, "steps", &self.steps)?,
            cfg: read_number_or_default(obj, "cfg", &self.cfg)?,
            denoise: read_number_or_default(obj, "denoise", &self.denoise)?,
        })
    }

    /// Draw a seed uniformly from the schema's inclusive seed range.
    pub fn generate_seed<R: Rng>(&self, rng: &mut R) -> u64 {
        rng.random_range(self.seed.minimum..=self.seed.maximum)
    }
}

// ---------------------------------------------------------------------------
// Schema loading helpers
// ---------------------------------------------------------------------------

fn property<'a>(
    doc: &'a SchemaDocument,
    name: &'static str,
    expected: &'static str,
) -> Result<&'a PropertyDocument, SchemaError> {
    let prop = doc
        .properties
        .get(name)
        .ok_or(SchemaError::MissingProperty(name))?;
    if prop.kind.as_deref() != Some(expected) {
        return Err(SchemaError::WrongType {
            property: name,
            expected,
        });
    }
    Ok(prop)
}

fn is_required(doc: &SchemaDocument, name: &str) -> bool {
    doc.required.iter().any(|r| r == name)
}

fn string_field(doc: &SchemaDocument, name: &'static str) -> Result<StringField, SchemaError> {
    let prop = property(doc, name, "string")?;
    let default = match &prop.default {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(SchemaError::Invalid {
                property: name,
                reason: format!("default {other} is not a string"),
            })
        }
    };
    Ok(StringField {
        required: is_required(doc, name),
        min_length: prop.min_length.unwrap_or(0),
        default,
    })
}

fn integer_field(
    doc: &SchemaDocument,
    name: &'static str,
    ceiling: u64,
) -> Result<IntegerField, SchemaError> {
    let prop = property(doc, name, "integer")?;
    let bound = |n: &Option<Number>, fallback: u64| -> Result<u64, SchemaError> {
        match n {
            None => Ok(fallback),
            Some(n) => n.as_u64().ok_or_else(|| SchemaError::Invalid {
                property: name,
                reason: format!("bound {n} is not a non-negative integer"),
            }),
        }
    };
    let minimum = bound(&prop.minimum, 0)?;
    let maximum = bound(&prop.maximum, ceiling)?;
    if minimum > maximum || maximum > ceiling {
        return Err(SchemaError::Invalid {
            property: name,
            reason: format!("range [{minimum}, {maximum}] is out of order or too large"),
        });
    }
    let default = match &prop.default {
        None => None,
        Some(v) => match v.as_u64() {
            Some(d) if (minimum..=maximum).contains(&d) => Some(d),
            _ => {
                return Err(SchemaError::Invalid {
                    property: name,
                    reason: format!("default {v} is outside [{minimum}, {maximum}]"),
                })
            }
        },
    };
    Ok(IntegerField {
        required: is_required(doc, name),
        minimum,
        maximum,
        default,
    })
}

fn number_field(doc: &SchemaDocument, name: &'static str) -> Result<NumberField, SchemaError> {
    let prop = property(doc, name, "number")?;
    let minimum = prop
        .minimum
        .as_ref()
        .and_then(Number::as_f64)
        .unwrap_or(f64::MIN);
    let maximum = prop
        .maximum
        .as_ref()
        .and_then(Number::as_f64)
        .unwrap_or(f64::MAX);
    if minimum > maximum {
        return Err(SchemaError::Invalid {
            property: name,
            reason: format!("range [{minimum}, {maximum}] is out of order"),
        });
    }
    let default = match &prop.default {
        None => None,
        Some(v) => match v.as_f64() {
            Some(d) if (minimum..=maximum).contains(&d) => Some(d),
            _ => {
                return Err(SchemaError::Invalid {
                    property: name,
                    reason: format!("default {v} is outside [{minimum}, {maximum}]"),
                })
            }
        },
    };
    Ok(NumberField {
        required: is_required(doc, name),
        minimum,
        maximum,
        default,
    })
}

// ---------------------------------------------------------------------------
// Request validation helpers
// ---------------------------------------------------------------------------

/// Look up a property, treating an explicit `null` as absent.
fn present<'a>(obj: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    obj.get(name).filter(|v| !v.is_null())
}

fn type_error(value: &Value, expected: &str) -> CoreError {
    CoreError::Validation(format!("{value} is not of type '{expected}'"))
}

fn read_string(value: &Value, field: &StringField) -> Result<String, CoreError> {
    let s = value.as_str().ok_or_else(|| type_error(value, "string"))?;
    if s.chars().count() < field.min_length {
        return Err(CoreError::Validation(format!("{value} is too short")));
    }
    Ok(s.to_string())
}

/// The integer a JSON number denotes, if any. Floats with a zero
/// fractional part count.
fn integer_value(value: &Value) -> Option<i128> {
    if let Some(n) = value.as_u64() {
        return Some(i128::from(n));
    }
    if let Some(n) = value.as_i64() {
        return Some(i128::from(n));
    }
    let f = value.as_f64()?;
    // Saturating cast; anything that large fails the range check anyway.
    (f.is_finite() && f.fract() == 0.0).then_some(f as i128)
}

fn read_integer(value: &Value, field: &IntegerField) -> Result<u64, CoreError> {
    let n = integer_value(value).ok_or_else(|| type_error(value, "integer"))?;
    if n < i128::from(field.minimum) {
        return Err(CoreError::Validation(format!(
            "{value} is less than the minimum of {}",
            field.minimum
        )));
    }
    if n > i128::from(field.maximum) {
        return Err(CoreError::Validation(format!(
            "{value} is greater than the maximum of {}",
            field.maximum
        )));
    }
    // Non-negative and within `maximum`, so it fits.
    Ok(n as u64)
}

/// Read a `u32`-sized integer property or fall back to its default.
///
/// Schema loading guarantees `maximum <= u32::MAX` and a default for
/// non-required fields.
fn read_dimension(
    obj: &Map<String, Value>,
    name: &str,
    field: &IntegerField,
) -> Result<u32, CoreError> {
    let value = match present(obj, name) {
        Some(v) => read_integer(v, field)?,
        None => field.default.unwrap_or(field.minimum),
    };
    u32::try_from(value)
        .map_err(|_| CoreError::Validation(format!("{value} is out of range for '{name}'")))
}

fn read_number_or_default(
    obj: &Map<String, Value>,
    name: &str,
    field: &NumberField,
) -> Result<f64, CoreError> {
    let Some(value) = present(obj, name) else {
        return Ok(field.default.unwrap_or(field.minimum));
    };
    let n = value.as_f64().ok_or_else(|| type_error(value, "number"))?;
    if n < field.minimum {
        return Err(CoreError::Validation(format!(
            "{value} is less than the minimum of {}",
            field.minimum
        )));
    }
    if n > field.maximum {
        return Err(CoreError::Validation(format!(
            "{value} is greater than the maximum of {}",
            field.maximum
        )));
    }
    Ok(n)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
