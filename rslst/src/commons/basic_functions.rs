use std::f64::consts::PI;

/// Metres per degree of latitude (equirectangular approximation)
pub const DEG_TO_M_LAT: f64 = 111_320.0;

/// Equatorial circumference used for the longitude conversion
const EARTH_CIRCUMFERENCE_M: f64 = 40_075_000.0;

pub fn deg_to_m_lat() -> f64 {
    DEG_TO_M_LAT
}

/// Metres per degree of longitude at the given latitude
pub fn deg_to_m_lon(lat: f64) -> f64 {
    EARTH_CIRCUMFERENCE_M * (lat * PI / 180.0).cos() / 360.0
}

/// Format a temperature the way legend labels show it
pub fn format_celsius(value: f64) -> String {
    format!("{:.1}°C", value)
}
