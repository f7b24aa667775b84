//! Value descriptors.
//!
//! A [`Meta`] describes and validates the values an attribute may hold or a
//! method parameter may take. The full descriptor system lives outside this
//! crate; the controller only needs the narrow [`Meta`] interface. A handful
//! of scalar descriptors are provided for built-in endpoints and tests.

use core::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value, json};

use crate::error::ValidationError;

/// Shared handle to a descriptor.
pub type MetaRef = Arc<dyn Meta>;

/// Describes and validates a value.
pub trait Meta: fmt::Debug + Send + Sync + 'static {
    /// Type identifier used as the `typeid` discriminator when serialized.
    fn typeid(&self) -> &'static str;

    /// Human readable description.
    fn description(&self) -> &str;

    /// Checks `value`, returning the (possibly coerced) value to store.
    fn validate(&self, value: Value) -> Result<Value, ValidationError>;

    /// Value a freshly created attribute holds.
    fn default_value(&self) -> Value {
        Value::Null
    }

    /// Structured representation of this descriptor.
    fn to_value(&self) -> Value {
        json!({
            "typeid": self.typeid(),
            "description": self.description(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scalar descriptors
// ─────────────────────────────────────────────────────────────────────────────

/// Accepts any value unchanged.
#[derive(Debug, Clone, Default)]
pub struct AnyMeta {
    description: String,
}

impl AnyMeta {
    /// Creates the descriptor.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

impl Meta for AnyMeta {
    fn typeid(&self) -> &'static str {
        "tessera:core/AnyMeta:1.0"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        Ok(value)
    }
}

/// Accepts strings; `null` becomes the empty string.
#[derive(Debug, Clone, Default)]
pub struct StringMeta {
    description: String,
}

impl StringMeta {
    /// Creates the descriptor.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

impl Meta for StringMeta {
    fn typeid(&self) -> &'static str {
        "tessera:core/StringMeta:1.0"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        match value {
            Value::Null => Ok(Value::String(String::new())),
            Value::String(_) => Ok(value),
            other => Err(ValidationError::invalid(
                self.typeid(),
                format!("expected a string, got {other}"),
            )),
        }
    }

    fn default_value(&self) -> Value {
        Value::String(String::new())
    }
}

/// Accepts booleans; `null` becomes `false`.
#[derive(Debug, Clone, Default)]
pub struct BooleanMeta {
    description: String,
}

impl BooleanMeta {
    /// Creates the descriptor.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

impl Meta for BooleanMeta {
    fn typeid(&self) -> &'static str {
        "tessera:core/BooleanMeta:1.0"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        match value {
            Value::Null => Ok(Value::Bool(false)),
            Value::Bool(_) => Ok(value),
            other => Err(ValidationError::invalid(
                self.typeid(),
                format!("expected a boolean, got {other}"),
            )),
        }
    }

    fn default_value(&self) -> Value {
        Value::Bool(false)
    }
}

/// Numeric representation accepted by a [`NumberMeta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberType {
    /// Signed 32 bit integer.
    Int32,
    /// Signed 64 bit integer.
    Int64,
    /// 64 bit float.
    Float64,
}

impl NumberType {
    fn as_str(self) -> &'static str {
        match self {
            NumberType::Int32 => "int32",
            NumberType::Int64 => "int64",
            NumberType::Float64 => "float64",
        }
    }
}

/// Accepts numbers of a given representation; `null` becomes zero.
#[derive(Debug, Clone)]
pub struct NumberMeta {
    description: String,
    dtype: NumberType,
}

impl NumberMeta {
    /// Creates the descriptor.
    #[must_use]
    pub fn new(dtype: NumberType, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            dtype,
        }
    }

    /// Returns the accepted representation.
    #[must_use]
    pub fn dtype(&self) -> NumberType {
        self.dtype
    }
}

impl Meta for NumberMeta {
    fn typeid(&self) -> &'static str {
        "tessera:core/NumberMeta:1.0"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        let number = match value {
            Value::Null => return Ok(self.default_value()),
            Value::Number(number) => number,
            other => {
                return Err(ValidationError::invalid(
                    self.typeid(),
                    format!("expected a number, got {other}"),
                ));
            }
        };
        match self.dtype {
            NumberType::Float64 => Ok(Value::Number(number)),
            NumberType::Int32 => number
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .map(Value::from)
                .ok_or_else(|| {
                    ValidationError::invalid(self.typeid(), format!("{number} is not an int32"))
                }),
            NumberType::Int64 => number.as_i64().map(Value::from).ok_or_else(|| {
                ValidationError::invalid(self.typeid(), format!("{number} is not an int64"))
            }),
        }
    }

    fn default_value(&self) -> Value {
        match self.dtype {
            NumberType::Float64 => json!(0.0),
            NumberType::Int32 | NumberType::Int64 => json!(0),
        }
    }

    fn to_value(&self) -> Value {
        json!({
            "typeid": self.typeid(),
            "description": self.description,
            "dtype": self.dtype.as_str(),
        })
    }
}

/// Accepts one of a fixed list of strings.
#[derive(Debug, Clone)]
pub struct ChoiceMeta {
    description: String,
    choices: Vec<String>,
}

impl ChoiceMeta {
    /// Creates the descriptor.
    pub fn new<I, S>(description: impl Into<String>, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            description: description.into(),
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the allowed values.
    #[must_use]
    pub fn choices(&self) -> &[String] {
        &self.choices
    }
}

impl Meta for ChoiceMeta {
    fn typeid(&self) -> &'static str {
        "tessera:core/ChoiceMeta:1.0"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        match &value {
            Value::String(choice) if self.choices.contains(choice) => Ok(value),
            other => Err(ValidationError::invalid(
                self.typeid(),
                format!("{other} is not a valid value"),
            )),
        }
    }

    fn default_value(&self) -> Value {
        self.choices
            .first()
            .map_or(Value::Null, |c| Value::String(c.clone()))
    }

    fn to_value(&self) -> Value {
        json!({
            "typeid": self.typeid(),
            "description": self.description,
            "choices": self.choices,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MapMeta
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered set of named element descriptors, with a list of required names.
///
/// Used for method parameters (`takes`) and method results (`returns`).
#[derive(Debug, Clone, Default)]
pub struct MapMeta {
    elements: IndexMap<String, MetaRef>,
    required: Vec<String>,
}

impl MapMeta {
    /// Creates an empty map descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an optional element.
    #[must_use]
    pub fn element(mut self, name: impl Into<String>, meta: impl Meta) -> Self {
        self.elements.insert(name.into(), Arc::new(meta));
        self
    }

    /// Adds a required element.
    #[must_use]
    pub fn required(mut self, name: impl Into<String>, meta: impl Meta) -> Self {
        let name = name.into();
        self.required.push(name.clone());
        self.elements.insert(name, Arc::new(meta));
        self
    }

    /// Returns the element descriptors in declaration order.
    #[must_use]
    pub fn elements(&self) -> &IndexMap<String, MetaRef> {
        &self.elements
    }

    /// Returns `true` if `name` is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.elements.contains_key(name)
    }

    /// Returns `true` if `name` must be supplied.
    #[must_use]
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// Returns `true` if no elements are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Validates every field of `map` against its element descriptor.
    ///
    /// Fields not declared are rejected, required fields must be present.
    pub fn validate_map(
        &self,
        mut map: Map<String, Value>,
    ) -> Result<Map<String, Value>, ValidationError> {
        if let Some(unknown) = map.keys().find(|k| !self.elements.contains_key(*k)) {
            return Err(ValidationError::invalid(
                "tessera:core/MapMeta:1.0",
                format!("unexpected field '{unknown}'"),
            ));
        }
        if let Some(missing) = self.required.iter().find(|r| !map.contains_key(*r)) {
            return Err(ValidationError::invalid(
                "tessera:core/MapMeta:1.0",
                format!("missing required field '{missing}'"),
            ));
        }
        let mut validated = Map::new();
        for (name, meta) in &self.elements {
            if let Some(value) = map.remove(name) {
                validated.insert(name.clone(), meta.validate(value)?);
            }
        }
        Ok(validated)
    }

    /// Structured representation of this descriptor.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let elements: Map<String, Value> = self
            .elements
            .iter()
            .map(|(name, meta)| (name.clone(), meta.to_value()))
            .collect();
        json!({
            "typeid": "tessera:core/MapMeta:1.0",
            "elements": elements,
            "required": self.required,
        })
    }
}
