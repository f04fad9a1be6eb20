//! Shared types for the safety-monitoring core

use crate::domain::geo::GeoPoint;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7 id string (time-sortable)
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Newtype wrapper for safe-zone ids to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub String);

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-zone membership as last observed by the monitor.
///
/// A zone with no recorded membership yet is "unknown"; the monitor models
/// that as absence from its membership map. First observation classifies
/// immediately, and an unknown -> outside observation counts as an exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Inside,
    Outside,
}

/// A single device position fix. Transient; never persisted.
#[derive(Debug, Clone, Copy)]
pub struct PositionSample {
    pub point: GeoPoint,
    /// Fix time (epoch ms); defaults to receive time when the device omits it
    pub ts_ms: u64,
}

/// Position message wire format published by the device
#[derive(Debug, Deserialize)]
pub struct PositionMessage {
    pub lat: f64,
    pub lon: f64,
    /// Fix time - can be ISO 8601 string or epoch milliseconds integer
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub ts: TimestampValue,
}

/// Timestamp that can be either ISO 8601 string or epoch milliseconds
#[derive(Debug, Clone, Default)]
pub enum TimestampValue {
    #[default]
    None,
    IsoString(String),
    EpochMs(u64),
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<TimestampValue, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct TimestampVisitor;

    impl<'de> Visitor<'de> for TimestampVisitor {
        type Value = TimestampValue;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer timestamp")
        }

        fn visit_str<E>(self, value: &str) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::IsoString(value.to_string()))
        }

        fn visit_string<E>(self, value: String) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::IsoString(value))
        }

        fn visit_u64<E>(self, value: u64) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::EpochMs(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            let epoch_ms = u64::try_from(value).unwrap_or(0);
            Ok(TimestampValue::EpochMs(epoch_ms))
        }
    }

    deserializer.deserialize_any(TimestampVisitor)
}

/// SOS trigger wire format published by the device
#[derive(Debug, Deserialize)]
pub struct SosMessage {
    /// What fired the trigger on the device ("button", "shake")
    pub trigger: String,
}

/// Parsed ingest event for the monitor loop
#[derive(Debug, Clone)]
pub struct IngestEvent {
    pub kind: IngestKind,
    pub received_at: Instant,
}

#[derive(Debug, Clone)]
pub enum IngestKind {
    Position(PositionSample),
    Sos { trigger: String },
}

/// An emergency contact. Consumed by the delivery path; managed by the app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    /// Phone number, `+` followed by 10-15 digits
    pub number: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_id_is_uuid_v7() {
        let a = new_id();
        let b = new_id();
        assert_eq!(a.len(), 36);
        assert_ne!(a, b);
    }

    #[test]
    fn test_position_message_ts_optional() {
        let msg: PositionMessage = serde_json::from_str(r#"{"lat": 1.0, "lon": 2.0}"#).unwrap();
        assert_eq!(msg.lat, 1.0);
        assert!(matches!(msg.ts, TimestampValue::None));

        let msg: PositionMessage =
            serde_json::from_str(r#"{"lat": 1.0, "lon": 2.0, "ts": 1736012345678}"#).unwrap();
        assert!(matches!(msg.ts, TimestampValue::EpochMs(1736012345678)));

        let msg: PositionMessage = serde_json::from_str(
            r#"{"lat": 1.0, "lon": 2.0, "ts": "2026-01-05T16:41:30.048+00:00"}"#,
        )
        .unwrap();
        assert!(matches!(msg.ts, TimestampValue::IsoString(_)));
    }

    #[test]
    fn test_zone_id_serde_transparent() {
        let id = ZoneId("abc".to_string());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }
}
