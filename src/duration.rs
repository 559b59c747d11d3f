//! Human-friendly duration syntax for query parameters.
//!
//! Durations are written as digits followed by a unit (`ns`, `us`, `ms`,
//! `s`, `m`, `h`), concatenation permitted (`1h45m`). The literal `0` means
//! "disabled" and maps to [`Duration::ZERO`].

use std::time::Duration;

/// Parse a duration token. `0` parses to [`Duration::ZERO`] (disabled).
pub fn parse(s: &str) -> Result<Duration, humantime::DurationError> {
    let s = s.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(s)
}

/// Format a duration for logs and error messages. Zero formats as `0`.
pub fn format(d: Duration) -> String {
    if d.is_zero() {
        "0".to_string()
    } else {
        humantime::format_duration(d).to_string()
    }
}
