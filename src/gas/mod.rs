pub mod aqi;
pub mod normalizer;

pub use aqi::{calculate_aqi, AqiLevel};
pub use normalizer::{canonical_gas_name, coerce_ppm};
