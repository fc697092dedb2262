//! Sensor readings - wire payload and normalized record
//!
//! A `SensorPayload` is what collectors push over HTTP. It is converted to a
//! `Reading` exactly once, at ingest: the timestamp is normalized to epoch
//! seconds and the client-supplied total is discarded (the engine always
//! recomputes totals from the three components).

use serde::{Deserialize, Serialize};

/// Raw timestamps with magnitude above this are epoch milliseconds.
const EPOCH_MS_MAGNITUDE: i64 = 1_000_000_000_000;

/// Normalize a raw epoch value to seconds.
///
/// Collectors disagree on units: the ESP32 firmware reports seconds, some
/// dashboard pushes report milliseconds. Anything with magnitude > 10^12 is
/// treated as milliseconds. Applied once at ingest, never per aggregation
/// pass.
pub fn normalize_epoch_seconds(raw: i64) -> i64 {
    if raw.abs() > EPOCH_MS_MAGNITUDE {
        raw / 1000
    } else {
        raw
    }
}

/// Ingest wire format for `POST /sensor-data`.
///
/// Field names match the persisted CSV header and the original collector
/// scripts, hence the non-snake-case renames.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SensorPayload {
    pub time: i64,
    #[serde(rename = "current_A")]
    pub current_a: f64,
    #[serde(rename = "temp_C")]
    pub temp_c: f64,
    pub pressure: f64,
    pub co2_shred: f64,
    pub co2_heating: f64,
    pub co2_mould: f64,
    /// Reported total. Never trusted - kept only so strict payloads
    /// round-trip; the engine recomputes shred + heating + mould.
    #[serde(default)]
    pub co2_total: Option<f64>,
}

/// One normalized sensor record as stored in the record log.
///
/// Immutable once appended. All CO2 values are kilograms of CO2-equivalent;
/// milligram conversion is a presentation concern.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Epoch seconds, already normalized.
    pub timestamp: i64,
    pub current_a: f64,
    pub temp_c: f64,
    pub pressure: f64,
    pub shred_kg: f64,
    pub heat_kg: f64,
    pub mould_kg: f64,
}

impl Reading {
    /// Build a reading from a wire payload, normalizing the timestamp.
    pub fn from_payload(payload: &SensorPayload) -> Self {
        Self {
            timestamp: normalize_epoch_seconds(payload.time),
            current_a: payload.current_a,
            temp_c: payload.temp_c,
            pressure: payload.pressure,
            shred_kg: payload.co2_shred,
            heat_kg: payload.co2_heating,
            mould_kg: payload.co2_mould,
        }
    }

    /// Recomputed total, kilograms. The reported `co2_total` is ignored.
    pub fn total_kg(&self) -> f64 {
        self.shred_kg + self.heat_kg + self.mould_kg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_seconds_passthrough() {
        assert_eq!(normalize_epoch_seconds(1_700_000_000), 1_700_000_000);
        assert_eq!(normalize_epoch_seconds(500), 500);
        assert_eq!(normalize_epoch_seconds(0), 0);
    }

    #[test]
    fn test_normalize_milliseconds() {
        assert_eq!(normalize_epoch_seconds(1_700_000_000_000), 1_700_000_000);
        assert_eq!(normalize_epoch_seconds(1_700_000_000_999), 1_700_000_000);
    }

    #[test]
    fn test_payload_deserializes_wire_names() {
        let json = r#"{
            "time": 1700000000,
            "current_A": 0.42,
            "temp_C": 31.5,
            "pressure": 55.0,
            "co2_shred": 0.001,
            "co2_heating": 0.002,
            "co2_mould": 0.0005,
            "co2_total": 9.9
        }"#;
        let payload: SensorPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.time, 1_700_000_000);
        assert_eq!(payload.current_a, 0.42);
        assert_eq!(payload.temp_c, 31.5);
        assert_eq!(payload.co2_total, Some(9.9));
    }

    #[test]
    fn test_payload_total_is_optional() {
        let json = r#"{
            "time": 1700000000,
            "current_A": 0.1,
            "temp_C": 30.0,
            "pressure": 10.0,
            "co2_shred": 0.0,
            "co2_heating": 0.0,
            "co2_mould": 0.0
        }"#;
        let payload: SensorPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.co2_total, None);
    }

    #[test]
    fn test_reported_total_is_ignored() {
        let payload = SensorPayload {
            time: 1_700_000_000,
            current_a: 0.1,
            temp_c: 30.0,
            pressure: 10.0,
            co2_shred: 0.001,
            co2_heating: 0.002,
            co2_mould: 0.0005,
            co2_total: Some(42.0),
        };
        let reading = Reading::from_payload(&payload);
        assert!((reading.total_kg() - 0.0035).abs() < 1e-12);
    }

    #[test]
    fn test_from_payload_normalizes_ms() {
        let payload = SensorPayload {
            time: 1_700_000_000_000,
            current_a: 0.0,
            temp_c: 0.0,
            pressure: 0.0,
            co2_shred: 0.0,
            co2_heating: 0.0,
            co2_mould: 0.0,
            co2_total: None,
        };
        assert_eq!(Reading::from_payload(&payload).timestamp, 1_700_000_000);
    }
}
