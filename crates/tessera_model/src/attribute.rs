//! Attribute endpoints.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::alarm::{Alarm, TimeStamp};
use crate::error::ValidationError;
use crate::meta::{Meta, MetaRef};

/// A readable, optionally writeable value endpoint.
///
/// Mutated only by its owning part (or the controller for `health`) while
/// the controller's tree lock is held.
#[derive(Debug, Clone)]
pub struct AttributeModel {
    meta: MetaRef,
    value: Value,
    writeable: bool,
    alarm: Alarm,
    timestamp: TimeStamp,
}

impl AttributeModel {
    /// Creates a read-only attribute holding the meta's default value.
    #[must_use]
    pub fn new(meta: impl Meta) -> Self {
        Self::from_meta(Arc::new(meta))
    }

    /// Creates a read-only attribute from a shared descriptor.
    #[must_use]
    pub fn from_meta(meta: MetaRef) -> Self {
        Self {
            value: meta.default_value(),
            meta,
            writeable: false,
            alarm: Alarm::ok(),
            timestamp: TimeStamp::now(),
        }
    }

    /// Marks the attribute as writeable by callers.
    #[must_use]
    pub fn writeable(mut self, writeable: bool) -> Self {
        self.writeable = writeable;
        self
    }

    /// Sets the initial value, validating it through the descriptor.
    pub fn with_value(mut self, value: Value) -> Result<Self, ValidationError> {
        self.value = self.meta.validate(value)?;
        Ok(self)
    }

    /// Returns the current value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns the descriptor.
    #[must_use]
    pub fn meta(&self) -> &MetaRef {
        &self.meta
    }

    /// Returns `true` if callers may write to this attribute.
    #[must_use]
    pub fn is_writeable(&self) -> bool {
        self.writeable
    }

    /// Returns the current alarm.
    #[must_use]
    pub fn alarm(&self) -> &Alarm {
        &self.alarm
    }

    /// Returns the time of the last update.
    #[must_use]
    pub fn timestamp(&self) -> TimeStamp {
        self.timestamp
    }

    /// Validates and stores `value`, refreshing the timestamp.
    pub fn set_value(&mut self, value: Value) -> Result<(), ValidationError> {
        self.value = self.meta.validate(value)?;
        self.timestamp = TimeStamp::now();
        Ok(())
    }

    /// Stores `alarm`.
    pub fn set_alarm(&mut self, alarm: Alarm) {
        self.alarm = alarm;
    }

    /// Structured representation with a `typeid` discriminator.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut meta = self.meta.to_value();
        if let Value::Object(fields) = &mut meta {
            fields.insert("writeable".into(), Value::Bool(self.writeable));
        }
        json!({
            "typeid": "tessera:core/Attribute:1.0",
            "meta": meta,
            "value": self.value,
            "alarm": self.alarm,
            "timeStamp": self.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{NumberMeta, NumberType};

    #[test]
    fn set_value_validates() {
        let mut attr = AttributeModel::new(NumberMeta::new(NumberType::Int32, "count"));
        assert_eq!(attr.value(), &json!(0));

        attr.set_value(json!(5)).unwrap();
        assert_eq!(attr.value(), &json!(5));

        assert!(attr.set_value(json!("five")).is_err());
        assert_eq!(attr.value(), &json!(5), "rejected write leaves value alone");
    }

    #[test]
    fn serialized_meta_carries_writeable() {
        let attr =
            AttributeModel::new(NumberMeta::new(NumberType::Int32, "count")).writeable(true);
        let value = attr.to_value();
        assert_eq!(value["typeid"], "tessera:core/Attribute:1.0");
        assert_eq!(value["meta"]["writeable"], true);
        assert_eq!(value["alarm"]["typeid"], "alarm_t");
        assert_eq!(value["timeStamp"]["typeid"], "time_t");
    }
}
