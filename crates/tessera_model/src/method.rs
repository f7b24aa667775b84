//! Method endpoints and call-argument preparation.

use serde_json::{Map, Value, json};

use crate::error::ValidationError;
use crate::meta::{MapMeta, Meta};

/// An invokable endpoint with declared parameters and return shape.
#[derive(Debug, Clone, Default)]
pub struct MethodModel {
    name: String,
    description: String,
    takes: MapMeta,
    defaults: Map<String, Value>,
    returns: MapMeta,
    writeable: bool,
}

impl MethodModel {
    /// Creates a writeable method taking no parameters and returning nothing.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            writeable: true,
            ..Self::default()
        }
    }

    /// Declares the accepted parameters.
    #[must_use]
    pub fn with_takes(mut self, takes: MapMeta) -> Self {
        self.takes = takes;
        self
    }

    /// Declares a default for an optional parameter.
    #[must_use]
    pub fn with_default(mut self, name: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(name.into(), value);
        self
    }

    /// Declares the result fields.
    #[must_use]
    pub fn with_returns(mut self, returns: MapMeta) -> Self {
        self.returns = returns;
        self
    }

    /// Declares a single required return field.
    #[must_use]
    pub fn returning(mut self, name: impl Into<String>, meta: impl Meta) -> Self {
        self.returns = self.returns.required(name, meta);
        self
    }

    /// Sets whether the method may currently be invoked.
    #[must_use]
    pub fn writeable(mut self, writeable: bool) -> Self {
        self.writeable = writeable;
        self
    }

    /// Returns the method name used in error messages.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parameter descriptors.
    #[must_use]
    pub fn takes(&self) -> &MapMeta {
        &self.takes
    }

    /// Returns the declared defaults.
    #[must_use]
    pub fn defaults(&self) -> &Map<String, Value> {
        &self.defaults
    }

    /// Returns the result descriptors.
    #[must_use]
    pub fn returns(&self) -> &MapMeta {
        &self.returns
    }

    /// Returns `true` if the method may be invoked.
    #[must_use]
    pub fn is_writeable(&self) -> bool {
        self.writeable
    }

    /// Maps named `params` onto positional arguments in declared order.
    ///
    /// Supplied values are validated by their element descriptor, missing
    /// ones fall back to declared defaults, and missing required ones are
    /// an error. Optional parameters without a default become `null`.
    pub fn prepare_call_args(
        &self,
        params: &Map<String, Value>,
    ) -> Result<Vec<Value>, ValidationError> {
        if let Some(unknown) = params.keys().find(|k| !self.takes.contains(k)) {
            return Err(ValidationError::UnknownParameter {
                method: self.name.clone(),
                name: unknown.clone(),
            });
        }

        let mut args = Vec::with_capacity(self.takes.elements().len());
        for (name, meta) in self.takes.elements() {
            let arg = if let Some(value) = params.get(name) {
                meta.validate(value.clone())?
            } else if let Some(default) = self.defaults.get(name) {
                default.clone()
            } else if self.takes.is_required(name) {
                return Err(ValidationError::MissingParameter {
                    method: self.name.clone(),
                    name: name.clone(),
                });
            } else {
                Value::Null
            };
            args.push(arg);
        }
        Ok(args)
    }

    /// Checks a handler's raw result against the declared returns.
    ///
    /// With no declared return fields the result passes through untouched.
    /// Otherwise it must be a map, and every field is re-validated.
    pub fn validate_result(&self, result: Value) -> Result<Value, ValidationError> {
        if self.returns.is_empty() {
            return Ok(result);
        }
        let fields = match result {
            Value::Object(fields) => fields,
            other => {
                return Err(ValidationError::InvalidReturn {
                    method: self.name.clone(),
                    reason: format!("expected a map, got {other}"),
                });
            }
        };
        self.returns
            .validate_map(fields)
            .map(Value::Object)
            .map_err(|err| ValidationError::InvalidReturn {
                method: self.name.clone(),
                reason: err.to_string(),
            })
    }

    /// Structured representation with a `typeid` discriminator.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "typeid": "tessera:core/Method:1.0",
            "description": self.description,
            "takes": self.takes.to_value(),
            "defaults": self.defaults,
            "returns": self.returns.to_value(),
            "writeable": self.writeable,
        })
    }
}
