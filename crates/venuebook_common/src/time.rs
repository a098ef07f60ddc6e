//! Rendering of UTC instants in the configured display timezone.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::error::{config_error, VenuebookError};

/// Parses an IANA timezone name such as `Europe/Zurich`.
pub fn parse_timezone(name: &str) -> Result<Tz, VenuebookError> {
    name.parse::<Tz>()
        .map_err(|err| config_error(format!("invalid display timezone '{}': {}", name, err)))
}

/// Formats an instant as local wall-clock time, e.g. `2025-05-05 11:00`.
pub fn format_local(instant: DateTime<Utc>, tz: Tz) -> String {
    instant.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()
}

/// Formats an interval, omitting whichever bound is unknown.
pub fn format_span(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>, tz: Tz) -> String {
    match (start, end) {
        (Some(s), Some(e)) => format!("{} - {}", format_local(s, tz), format_local(e, tz)),
        (Some(s), None) => format_local(s, tz),
        (None, Some(e)) => format!("- {}", format_local(e, tz)),
        (None, None) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_local_applies_offset() {
        let tz = parse_timezone("Europe/Zurich").unwrap();
        // CEST is UTC+2 in May
        let instant = Utc.with_ymd_and_hms(2025, 5, 5, 9, 0, 0).unwrap();
        assert_eq!(format_local(instant, tz), "2025-05-05 11:00");
    }

    #[test]
    fn test_format_span_partial_bounds() {
        let tz = parse_timezone("UTC").unwrap();
        let start = Utc.with_ymd_and_hms(2025, 1, 2, 8, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 2, 9, 30, 0).unwrap();
        assert_eq!(format_span(Some(start), Some(end), tz), "2025-01-02 08:30 - 2025-01-02 09:30");
        assert_eq!(format_span(Some(start), None, tz), "2025-01-02 08:30");
        assert_eq!(format_span(None, None, tz), "");
    }

    #[test]
    fn test_invalid_timezone_is_config_error() {
        assert!(matches!(
            parse_timezone("Mars/Olympus"),
            Err(VenuebookError::ConfigError(_))
        ));
    }
}
