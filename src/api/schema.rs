/// Validation of backend payloads at the ingestion boundary
///
/// Every response is decoded here into the typed models. Malformed
/// entries are dropped with a warning; a payload whose overall shape is
/// wrong is rejected with `ApiError::Schema`.
use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::ApiError;
use crate::gas::{canonical_gas_name, coerce_ppm};
use crate::models::{HistoricalPoint, SensorReading};
use crate::timestamp::{parse_timestamp, RawTimestamp};

#[derive(Debug, Deserialize)]
struct RawReading {
    #[serde(rename = "GasName")]
    gas_name: String,
    #[serde(rename = "PPM", default)]
    ppm: Option<Value>,
    #[serde(default)]
    timestamp: Option<RawTimestamp>,
}

#[derive(Debug, Deserialize)]
struct RawHistoricalPoint {
    #[serde(default)]
    timestamp: Option<RawTimestamp>,
    #[serde(default)]
    ppm: Option<Value>,
}

/// Decode `{ body: { Readings: [...] } }`. A missing body or list means no readings.
pub fn decode_readings(payload: Value) -> Result<Vec<SensorReading>, ApiError> {
    let list = match payload.get("body").and_then(|body| body.get("Readings")) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(list)) => list,
        Some(other) => {
            return Err(ApiError::Schema(format!(
                "Readings is not a list: {}",
                type_name(other)
            )))
        }
    };

    let readings = list
        .iter()
        .filter_map(|item| match RawReading::deserialize(item) {
            Ok(raw) => Some(SensorReading {
                gas_name: canonical_gas_name(&raw.gas_name),
                ppm: coerce_ppm(raw.ppm.as_ref()),
                timestamp: raw.timestamp.as_ref().and_then(parse_timestamp),
            }),
            Err(e) => {
                warn!("Dropping malformed reading {}: {}", item, e);
                None
            }
        })
        .collect();

    Ok(readings)
}

/// Decode `{ gasName: [{timestamp, ppm}] }` keyed by canonical gas name
pub fn decode_history(payload: Value) -> Result<HashMap<String, Vec<HistoricalPoint>>, ApiError> {
    let series = match payload {
        Value::Object(series) => series,
        other => {
            return Err(ApiError::Schema(format!(
                "historical data is not an object: {}",
                type_name(&other)
            )))
        }
    };

    let mut history: HashMap<String, Vec<HistoricalPoint>> = HashMap::new();
    for (gas_name, points) in series {
        let points = match points {
            Value::Array(points) => points,
            Value::Null => Vec::new(),
            other => {
                warn!("Dropping series {}: expected a list, got {}", gas_name, type_name(&other));
                continue;
            }
        };

        let mut dropped = 0usize;
        let decoded: Vec<HistoricalPoint> = points
            .iter()
            .filter_map(|item| {
                let raw = RawHistoricalPoint::deserialize(item).ok()?;
                let at = raw.timestamp.as_ref().and_then(parse_timestamp);
                if at.is_none() {
                    dropped += 1;
                }
                Some(HistoricalPoint {
                    at: at?,
                    ppm: coerce_ppm(raw.ppm.as_ref()),
                })
            })
            .collect();

        if dropped > 0 {
            warn!("Dropped {} points without a usable timestamp from {}", dropped, gas_name);
        }

        history
            .entry(canonical_gas_name(&gas_name))
            .or_default()
            .extend(decoded);
    }

    Ok(history)
}

/// Decode a JSON array of records, dropping entries that do not match `T`
pub fn decode_list<T: DeserializeOwned>(payload: Value, what: &str) -> Result<Vec<T>, ApiError> {
    let items = match payload {
        Value::Array(items) => items,
        other => {
            return Err(ApiError::Schema(format!(
                "{} is not a list: {}",
                what,
                type_name(&other)
            )))
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Dropping malformed {} entry: {}", what, e);
                None
            }
        })
        .collect())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
