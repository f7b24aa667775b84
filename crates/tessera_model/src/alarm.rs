//! Alarm and timestamp metadata carried by every attribute.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};

/// How bad an alarm is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum AlarmSeverity {
    /// No alarm.
    #[default]
    NoAlarm = 0,
    /// Minor problem.
    MinorAlarm = 1,
    /// Major problem.
    MajorAlarm = 2,
    /// The value is invalid.
    InvalidAlarm = 3,
    /// The alarm state is not known.
    UndefinedAlarm = 4,
}

/// Where an alarm originates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AlarmStatus {
    /// No status.
    #[default]
    NoStatus = 0,
    /// Raised by the device.
    DeviceStatus = 1,
    /// Raised by the driver.
    DriverStatus = 2,
    /// Raised by a record.
    RecordStatus = 3,
    /// Raised by the database.
    DbStatus = 4,
    /// Raised by configuration.
    ConfStatus = 5,
    /// Origin unknown.
    UndefinedStatus = 6,
    /// Raised by a client.
    ClientStatus = 7,
}

impl Serialize for AlarmSeverity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl Serialize for AlarmStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// Alarm state of an attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "typeid", rename = "alarm_t")]
pub struct Alarm {
    /// Severity of the alarm.
    pub severity: AlarmSeverity,
    /// Origin of the alarm.
    pub status: AlarmStatus,
    /// Human readable message.
    pub message: String,
}

impl Alarm {
    /// Creates an alarm.
    #[must_use]
    pub fn new(severity: AlarmSeverity, status: AlarmStatus, message: impl Into<String>) -> Self {
        Self {
            severity,
            status,
            message: message.into(),
        }
    }

    /// The "no alarm" state.
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    /// A minor alarm with no particular origin.
    #[must_use]
    pub fn minor(message: impl Into<String>) -> Self {
        Self::new(AlarmSeverity::MinorAlarm, AlarmStatus::NoStatus, message)
    }

    /// A major alarm with no particular origin.
    #[must_use]
    pub fn major(message: impl Into<String>) -> Self {
        Self::new(AlarmSeverity::MajorAlarm, AlarmStatus::NoStatus, message)
    }

    /// An invalid alarm with no particular origin.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(AlarmSeverity::InvalidAlarm, AlarmStatus::NoStatus, message)
    }
}

/// Time of the last update of an attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "typeid", rename = "time_t", rename_all = "camelCase")]
pub struct TimeStamp {
    /// Whole seconds since the Unix epoch.
    pub seconds_past_epoch: u64,
    /// Nanoseconds past the whole second.
    pub nanoseconds: u32,
    /// Free-form tag.
    pub user_tag: i32,
}

impl TimeStamp {
    /// The current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        // A clock before the epoch reads as the epoch itself.
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            seconds_past_epoch: elapsed.as_secs(),
            nanoseconds: elapsed.subsec_nanos(),
            user_tag: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn severity_orders_by_badness() {
        assert!(AlarmSeverity::NoAlarm < AlarmSeverity::MinorAlarm);
        assert!(AlarmSeverity::MinorAlarm < AlarmSeverity::MajorAlarm);
        assert!(AlarmSeverity::MajorAlarm < AlarmSeverity::InvalidAlarm);
        assert!(AlarmSeverity::InvalidAlarm < AlarmSeverity::UndefinedAlarm);
    }

    #[test]
    fn alarm_serializes_with_typeid() {
        let alarm = Alarm::new(
            AlarmSeverity::MajorAlarm,
            AlarmStatus::DeviceStatus,
            "overheated",
        );
        let value = serde_json::to_value(&alarm).unwrap();
        assert_eq!(
            value,
            json!({"typeid": "alarm_t", "severity": 2, "status": 1, "message": "overheated"})
        );
    }

    #[test]
    fn timestamp_serializes_camel_case() {
        let ts = TimeStamp {
            seconds_past_epoch: 5,
            nanoseconds: 6,
            user_tag: 0,
        };
        let value = serde_json::to_value(ts).unwrap();
        assert_eq!(value["typeid"], "time_t");
        assert_eq!(value["secondsPastEpoch"], 5);
        assert_eq!(value["nanoseconds"], 6);
        assert_eq!(value["userTag"], 0);
    }
}
