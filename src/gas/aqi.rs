/// Weighted-threshold air quality score
///
/// This is a bespoke heuristic, not an EPA AQI. Each gas is normalized
/// against its threshold, clamped to 1, weighted, and the weighted sum is
/// divided by the sum of the whole weight table.
use crate::gas::normalizer::{ALCOHOL, C2H5OH, CH4, CO, DUST_CONCENTRATION, H2, HUMIDITY, TEMPERATURE};
use crate::models::GasSnapshot;

const DEFAULT_THRESHOLD: f64 = 500.0;
const DEFAULT_WEIGHT: f64 = 0.125;

// (gas, threshold in ppm, weight)
const GAS_TABLE: [(&str, f64, f64); 8] = [
    (H2, 100.0, 0.1),
    (ALCOHOL, 50.0, 0.1),
    (CH4, 1000.0, 0.05),  // less harmful in small amounts
    (CO, 50.0, 0.3),      // WHO 8 hour guideline
    (C2H5OH, 50.0, 0.1),
    (DUST_CONCENTRATION, 150.0, 0.2),
    (HUMIDITY, 100.0, 0.05), // percent
    (TEMPERATURE, 40.0, 0.1), // degrees Celsius
];

/// Dashboard banding of the score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AqiLevel {
    NoData,
    Good,
    Moderate,
    Unhealthy,
}

impl AqiLevel {
    pub fn from_score(score: i64) -> Self {
        match score {
            0 => AqiLevel::NoData,
            s if s < 50 => AqiLevel::Good,
            s if s < 100 => AqiLevel::Moderate,
            _ => AqiLevel::Unhealthy,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AqiLevel::NoData => "N/A",
            AqiLevel::Good => "Good",
            AqiLevel::Moderate => "Moderate",
            AqiLevel::Unhealthy => "Unhealthy",
        }
    }
}

pub fn threshold_for(gas: &str) -> f64 {
    GAS_TABLE
        .iter()
        .find(|(name, _, _)| *name == gas)
        .map(|(_, threshold, _)| *threshold)
        .unwrap_or(DEFAULT_THRESHOLD)
}

pub fn weight_for(gas: &str) -> f64 {
    GAS_TABLE
        .iter()
        .find(|(name, _, _)| *name == gas)
        .map(|(_, _, weight)| *weight)
        .unwrap_or(DEFAULT_WEIGHT)
}

/// Sum of the full weight table, used as the fixed denominator
pub fn weight_sum() -> f64 {
    GAS_TABLE.iter().map(|(_, _, weight)| weight).sum()
}

/// Compute the score for a snapshot. Absent or empty snapshots score 0.
///
/// The denominator is the sum of the full weight table even when the
/// snapshot lacks some gases, so a partial snapshot cannot reach 100.
/// Gases outside the table use the default threshold and weight and can
/// push the score past 100.
pub fn calculate_aqi(snapshot: Option<&GasSnapshot>) -> i64 {
    let snapshot = match snapshot {
        Some(snapshot) if !snapshot.is_empty() => snapshot,
        _ => return 0,
    };

    let weighted: f64 = snapshot
        .values
        .iter()
        .map(|(gas, ppm)| {
            let normalized = (ppm / threshold_for(gas)).min(1.0);
            normalized * weight_for(gas)
        })
        .sum();

    (weighted / weight_sum() * 100.0).round() as i64
}
