use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Offset the vendor's clock uses when a timestamp carries no zone (UTC+8).
///
/// Inferred from observed payloads, not documented by the vendor.
pub const UPSTREAM_NAIVE_UTC_OFFSET_HOURS: i32 = 8;

/// Offset the stored display strings are rendered in (UTC+7).
pub const DISPLAY_UTC_OFFSET_HOURS: i32 = 7;

/// Output format of normalized timestamps
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static DATE_TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([0-9]{4})[-/]([0-9]{1,2})[-/]([0-9]{1,2})[ T]([0-9]{1,2}):([0-9]{2})(?::([0-9]{2}))?(?:\.([0-9]{1,3}))?(?:\s?(Z|[+-][0-9]{2}:?[0-9]{2}))?$",
    )
    .expect("date-time pattern is valid")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Invalid datetime format: {0}")]
    UnrecognizedFormat(String),

    #[error("Invalid calendar date or time: {0}")]
    InvalidCalendarDate(String),

    #[error("Invalid timezone offset: {0}")]
    InvalidOffset(String),

    #[error("Timestamp out of range: {0}")]
    OutOfRange(String),
}

/// Converts upstream timestamps into the canonical display string.
///
/// Accepted shapes, in order:
/// - 10 digits (epoch seconds) or 13 digits (epoch milliseconds)
/// - `YYYY[-/]MM[-/]DD (space|T) HH:MM[:SS][.fff][ ](Z|±HH:MM|±HHMM)?`
///
/// Zone-less date-times are read in `naive_offset`. The resulting instant is
/// clamped to `now` and rendered in `display_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampNormalizer {
    naive_offset: FixedOffset,
    display_offset: FixedOffset,
}

impl Default for TimestampNormalizer {
    fn default() -> Self {
        Self {
            naive_offset: hours_offset(UPSTREAM_NAIVE_UTC_OFFSET_HOURS)
                .expect("upstream offset constant is valid"),
            display_offset: hours_offset(DISPLAY_UTC_OFFSET_HOURS)
                .expect("display offset constant is valid"),
        }
    }
}

impl TimestampNormalizer {
    /// Builds a normalizer from whole-hour offsets; `None` if either is outside ±23h.
    pub fn with_offsets(naive_offset_hours: i32, display_offset_hours: i32) -> Option<Self> {
        Some(Self {
            naive_offset: hours_offset(naive_offset_hours)?,
            display_offset: hours_offset(display_offset_hours)?,
        })
    }

    pub fn naive_offset(&self) -> FixedOffset {
        self.naive_offset
    }

    pub fn display_offset(&self) -> FixedOffset {
        self.display_offset
    }

    /// Normalize `raw` against the injected current instant
    pub fn normalize(&self, raw: &str, now: DateTime<Utc>) -> Result<String, NormalizeError> {
        let instant = self.parse_instant(raw.trim())?;
        let clamped = instant.min(now);
        Ok(self.render(clamped))
    }

    /// Render an instant in the display timezone without clamping
    pub fn render(&self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.display_offset)
            .format(DISPLAY_FORMAT)
            .to_string()
    }

    fn parse_instant(&self, value: &str) -> Result<DateTime<Utc>, NormalizeError> {
        if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
            return parse_epoch(value);
        }

        let captures = DATE_TIME_PATTERN
            .captures(value)
            .ok_or_else(|| NormalizeError::UnrecognizedFormat(value.to_string()))?;

        let unrecognized = || NormalizeError::UnrecognizedFormat(value.to_string());
        // absent optional groups (seconds) read as zero
        let number = |index: usize| -> Result<u32, NormalizeError> {
            match captures.get(index) {
                Some(m) => m.as_str().parse().map_err(|_| unrecognized()),
                None => Ok(0),
            }
        };
        let year = i32::try_from(number(1)?).map_err(|_| unrecognized())?;
        let (month, day) = (number(2)?, number(3)?);
        let (hour, minute, second) = (number(4)?, number(5)?, number(6)?);
        let millis = match captures.get(7) {
            Some(fraction) => pad_millis(fraction.as_str()).ok_or_else(unrecognized)?,
            None => 0,
        };

        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| NormalizeError::InvalidCalendarDate(value.to_string()))?;
        let time = NaiveTime::from_hms_milli_opt(hour, minute, second, millis)
            .ok_or_else(|| NormalizeError::InvalidCalendarDate(value.to_string()))?;
        let naive = NaiveDateTime::new(date, time);

        let offset = match captures.get(8) {
            Some(zone) => parse_offset(zone.as_str())?,
            None => self.naive_offset,
        };

        offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| NormalizeError::OutOfRange(value.to_string()))
    }
}

/// Normalize with the default vendor and display offsets
pub fn normalize_timestamp(raw: &str, now: DateTime<Utc>) -> Result<String, NormalizeError> {
    TimestampNormalizer::default().normalize(raw, now)
}

fn hours_offset(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours.checked_mul(3600)?)
}

fn parse_epoch(value: &str) -> Result<DateTime<Utc>, NormalizeError> {
    let millis = match value.len() {
        10 => value
            .parse::<i64>()
            .ok()
            .and_then(|secs| secs.checked_mul(1000)),
        13 => value.parse::<i64>().ok(),
        _ => return Err(NormalizeError::UnrecognizedFormat(value.to_string())),
    };

    millis
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| NormalizeError::OutOfRange(value.to_string()))
}

fn pad_millis(fraction: &str) -> Option<u32> {
    format!("{fraction:0<3}").parse().ok()
}

fn parse_offset(zone: &str) -> Result<FixedOffset, NormalizeError> {
    if zone == "Z" {
        return Ok(FixedOffset::east_opt(0).expect("zero offset is valid"));
    }

    let invalid = || NormalizeError::InvalidOffset(zone.to_string());
    let sign = if zone.starts_with('-') { -1 } else { 1 };
    let digits: String = zone[1..].chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 {
        return Err(invalid());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
