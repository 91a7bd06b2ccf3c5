//! Timestamp parsing and formatting.
//!
//! Highlight producers report times either as plain seconds (`"8.96"`) or as
//! clock strings (`HH:MM:SS`, `HH:MM:SS.mmm`, `MM:SS`). Everything downstream
//! works in seconds.

use thiserror::Error;

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'. Use SS, MM:SS or HH:MM:SS with optional .mmm")]
    InvalidFormat(String),
}

/// Parse a timestamp string to total seconds.
///
/// # Examples
/// ```
/// use reel_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("8.96").unwrap(), 8.96);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    let names: &[&'static str] = match parts.len() {
        1 => &["seconds"],
        2 => &["minutes", "seconds"],
        3 => &["hours", "minutes", "seconds"],
        _ => return Err(TimestampError::InvalidFormat(ts.to_string())),
    };

    let mut total = 0.0;
    for (part, name) in parts.iter().zip(names) {
        let value: f64 = part
            .trim()
            .parse()
            .map_err(|_| TimestampError::InvalidValue(*name, part.to_string()))?;
        if !value.is_finite() {
            return Err(TimestampError::InvalidValue(*name, part.to_string()));
        }
        if value < 0.0 {
            return Err(TimestampError::Negative);
        }
        total = total * 60.0 + value;
    }
    Ok(total)
}

/// Format seconds as `HH:MM:SS.mm` for transcripts and logs.
pub fn format_timestamp(total_secs: f64) -> String {
    let centis = (total_secs.max(0.0) * 100.0).round() as u64;
    let hours = centis / 360_000;
    let mins = (centis / 6_000) % 60;
    let secs = (centis % 6_000) as f64 / 100.0;
    format!("{:02}:{:02}:{:05.2}", hours, mins, secs)
}
