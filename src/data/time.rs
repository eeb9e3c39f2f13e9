//! Timestamp → fractional year.
//!
//! All model times are fractional years (`2003.5` is mid-2003), so cycle
//! frequencies are in cycles per year. Leap years are handled by dividing by
//! the actual length of the calendar year.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

use crate::error::AppError;

pub fn fractional_year(dt: NaiveDateTime) -> f64 {
    let year = dt.year();
    let start = year_start(year);
    let end = year_start(year + 1);
    let elapsed = (dt - start).num_milliseconds() as f64;
    let length = (end - start).num_milliseconds() as f64;
    year as f64 + elapsed / length
}

fn year_start(year: i32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Parse a time field: a plain number is taken as a fractional year, otherwise
/// RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD`.
pub fn parse_time(field: &str) -> Result<f64, AppError> {
    let s = field.trim();
    if let Ok(v) = s.parse::<f64>() {
        return Ok(v);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(fractional_year(dt.naive_utc()));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(fractional_year(dt));
        }
    }
    if let Some(dt) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(fractional_year(dt));
    }
    Err(AppError::input(format!("Unrecognized time '{s}'.")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_middle_of_year() {
        let jan1 = NaiveDate::from_ymd_opt(2003, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert!((fractional_year(jan1) - 2003.0).abs() < 1e-12);

        // 2004 is a leap year: 183 of its 366 days have elapsed on July 2.
        let mid = NaiveDate::from_ymd_opt(2004, 7, 2).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert!((fractional_year(mid) - 2004.5).abs() < 1e-9);
    }

    #[test]
    fn parses_supported_formats() {
        assert_eq!(parse_time("2001.25").unwrap(), 2001.25);
        let a = parse_time("2003-01-01").unwrap();
        let b = parse_time("2003-01-01T00:00:00Z").unwrap();
        let c = parse_time("2003-01-01 00:00:00").unwrap();
        assert!((a - 2003.0).abs() < 1e-12);
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert!(parse_time("yesterday").is_err());
    }
}
