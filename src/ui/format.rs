//! Formato de fechas y tamaños para mostrar en pantalla.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

pub const UNKNOWN_SIZE: &str = "Unknown size";
pub const UNKNOWN_DATE: &str = "Unknown date";

const KB: f64 = 1024.0;
const MB: f64 = 1024.0 * 1024.0;

pub fn format_size(size: Option<f64>) -> String {
    match size {
        None => UNKNOWN_SIZE.to_string(),
        Some(s) if s.is_nan() => UNKNOWN_SIZE.to_string(),
        Some(s) if s < KB => format!("{s} bytes"),
        Some(s) if s < MB => format!("{:.1} KB", s / KB),
        Some(s) => format!("{:.1} MB", s / MB),
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
}

pub fn format_date(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.contains("Unknown")) else {
        return UNKNOWN_DATE.to_string();
    };
    match parse_date(raw) {
        Some(date) => date.format("%b %-d, %Y").to_string(),
        None => UNKNOWN_DATE.to_string(),
    }
}
