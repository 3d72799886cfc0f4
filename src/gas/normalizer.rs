/// Canonical gas names and PPM sanitizing applied at ingestion
use serde_json::Value;

/// Canonical keys for the gases the sensors report
pub const H2: &str = "H2";
pub const ALCOHOL: &str = "ALCOHOL";
pub const CH4: &str = "CH4";
pub const CO: &str = "CO";
pub const C2H5OH: &str = "C2H5OH";
pub const DUST_CONCENTRATION: &str = "DUST CONCENTRATION";
pub const HUMIDITY: &str = "HUMIDITY";
pub const TEMPERATURE: &str = "TEMPERATURE";

// Backend spellings seen in the wild. The firmware truncates long names to 16 chars.
const ALIASES: &[(&str, &str)] = &[
    ("Dust Concentrati", DUST_CONCENTRATION),
    ("DUST CONCENTRATI", DUST_CONCENTRATION),
    ("DustConcentration", DUST_CONCENTRATION),
    ("DUST_CONCENTRATION", DUST_CONCENTRATION),
    ("Alcohol", ALCOHOL),
    ("Humidity", HUMIDITY),
    ("Temperature", TEMPERATURE),
];

/// Map a backend gas name onto its canonical key. Unknown names pass through.
pub fn canonical_gas_name(name: &str) -> String {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Replace NaN and infinite values with zero
pub fn sanitize_ppm(ppm: f64) -> f64 {
    if ppm.is_finite() {
        ppm
    } else {
        0.0
    }
}

/// Coerce a raw JSON PPM value into a finite number
///
/// Numbers are taken as-is, strings are parsed (so "NaN" and "Infinity"
/// are recognised), anything else counts as zero.
pub fn coerce_ppm(raw: Option<&Value>) -> f64 {
    let value = match raw {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    sanitize_ppm(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_finite_ppm_becomes_zero() {
        assert_eq!(sanitize_ppm(f64::NAN), 0.0);
        assert_eq!(sanitize_ppm(f64::INFINITY), 0.0);
        assert_eq!(sanitize_ppm(f64::NEG_INFINITY), 0.0);
        assert_eq!(sanitize_ppm(42.5), 42.5);
        assert_eq!(sanitize_ppm(-3.0), -3.0);
    }

    #[test]
    fn raw_values_are_coerced() {
        assert_eq!(coerce_ppm(Some(&json!(12.5))), 12.5);
        assert_eq!(coerce_ppm(Some(&json!("7.25"))), 7.25);
        assert_eq!(coerce_ppm(Some(&json!("NaN"))), 0.0);
        assert_eq!(coerce_ppm(Some(&json!("Infinity"))), 0.0);
        assert_eq!(coerce_ppm(Some(&json!(null))), 0.0);
        assert_eq!(coerce_ppm(Some(&json!({"v": 1}))), 0.0);
        assert_eq!(coerce_ppm(None), 0.0);
    }

    #[test]
    fn aliases_map_to_canonical_keys() {
        assert_eq!(canonical_gas_name("Dust Concentrati"), DUST_CONCENTRATION);
        assert_eq!(canonical_gas_name("DUST CONCENTRATI"), DUST_CONCENTRATION);
        assert_eq!(canonical_gas_name("Alcohol"), ALCOHOL);
        assert_eq!(canonical_gas_name("CO"), CO);
        assert_eq!(canonical_gas_name("NO2"), "NO2");
    }
}
