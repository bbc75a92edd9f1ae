//! Best-effort date parsing for `format_date` and `add_days`

use std::fmt::Write;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta};
use tracing::debug;

use super::TransformError;

const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%d %B %Y",
    "%Y%m%d",
];

const MS_PER_DAY: f64 = 86_400_000.0;

/// A parsed date, keeping its offset when the input carried one
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedDate {
    Zoned(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl ParsedDate {
    /// Try the known layouts in order: RFC 3339, RFC 2822, zoned, naive
    /// date-time, then plain dates at midnight.
    pub fn parse(input: &str) -> Result<Self, TransformError> {
        debug!(%input, "ParsedDate::parse: called");
        let s = input.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::Zoned(dt));
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
            return Ok(Self::Zoned(dt));
        }
        for fmt in ZONED_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
                return Ok(Self::Zoned(dt));
            }
        }
        for fmt in DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(Self::Naive(dt));
            }
        }
        for fmt in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
                return Ok(Self::Naive(date.and_time(chrono::NaiveTime::MIN)));
            }
        }

        debug!(%input, "ParsedDate::parse: no layout matched");
        Err(TransformError::DateParse(input.to_string()))
    }

    /// Render with a strftime pattern; unknown or unsatisfiable items are an error
    pub fn format(&self, pattern: &str) -> Result<String, TransformError> {
        let mut out = String::new();
        let written = match self {
            Self::Zoned(dt) => write!(out, "{}", dt.format(pattern)),
            Self::Naive(dt) => write!(out, "{}", dt.format(pattern)),
        };
        written.map_err(|_| TransformError::DateFormat(pattern.to_string()))?;
        Ok(out)
    }

    /// Shift by a possibly fractional number of days
    pub fn add_days(&self, days: f64) -> Result<Self, TransformError> {
        let millis = days * MS_PER_DAY;
        if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
            return Err(TransformError::DateOverflow);
        }
        let delta = TimeDelta::try_milliseconds(millis.round() as i64).ok_or(TransformError::DateOverflow)?;
        match self {
            Self::Zoned(dt) => dt.checked_add_signed(delta).map(Self::Zoned),
            Self::Naive(dt) => dt.checked_add_signed(delta).map(Self::Naive),
        }
        .ok_or(TransformError::DateOverflow)
    }

    /// ISO-8601 rendering: `YYYY-MM-DDTHH:MM:SS[.f][+HH:MM]`
    pub fn to_iso(&self) -> String {
        match self {
            Self::Zoned(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.f%:z").to_string(),
            Self::Naive(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        }
    }
}
