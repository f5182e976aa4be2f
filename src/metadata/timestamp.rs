//! Canonical capture timestamps.
//!
//! Every timestamp, whatever its source (EXIF `2019:09:10 06:49:11`, a sidecar
//! `2019-09-10T06:49:11+02:00`, a bare `2019-09-10`, a file mtime), is held as
//! one local date-time plus an optional UTC offset and the number of
//! sub-second digits the source actually carried. Two sources describing the
//! same instant with the same precision compare equal.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("unrecognised timestamp {0:?}")]
    Invalid(String),
    #[error("invalid sub-second value {0:?}")]
    SubSecond(String),
    #[error("invalid UTC offset {0:?}")]
    Offset(String),
}

const MAX_SUBSEC_DIGITS: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp {
    datetime: NaiveDateTime,
    offset: Option<FixedOffset>,
    subsec_digits: u8,
}

impl Timestamp {
    /// A whole-second timestamp with no sub-second precision.
    pub fn new(datetime: NaiveDateTime, offset: Option<FixedOffset>) -> Self {
        Self {
            datetime: datetime.with_nanosecond(0).unwrap_or(datetime),
            offset,
            subsec_digits: 0,
        }
    }

    /// Parse the EXIF triple `DateTimeOriginal`, `SubSecTimeOriginal`,
    /// `OffsetTimeOriginal`.
    ///
    /// Returns `Ok(None)` for the all-zero value cameras write when the clock
    /// was never set.
    pub fn from_exif(
        datetime: &str,
        subsec: Option<&str>,
        offset: Option<&str>,
    ) -> Result<Option<Self>, TimestampError> {
        let datetime = clean(datetime);
        if datetime.is_empty() || datetime.starts_with("0000:00:00") {
            return Ok(None);
        }
        let naive = NaiveDateTime::parse_from_str(datetime, "%Y:%m:%d %H:%M:%S")
            .map_err(|_| TimestampError::Invalid(datetime.to_string()))?;
        let mut ts = Self::new(naive, None);

        if let Some(subsec) = subsec.map(clean).filter(|s| !s.is_empty()) {
            ts = ts.with_subsec_digits(subsec)?;
        }
        if let Some(offset) = offset.map(clean).filter(|s| !s.is_empty()) {
            ts.offset = Some(parse_offset(offset)?);
        }
        Ok(Some(ts))
    }

    /// Parse an author-supplied timestamp.
    ///
    /// Accepts RFC 3339 (`2019-09-10T06:49:11.25+02:00`), naive ISO forms with
    /// `T` or a space separator, the EXIF colon form, and bare dates.
    pub fn parse(input: &str) -> Result<Self, TimestampError> {
        let s = input.trim();
        let invalid = || TimestampError::Invalid(s.to_string());

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            let mut ts = Self::new(dt.naive_local(), Some(*dt.offset()));
            if let Some(frac) = fraction_digits(s) {
                ts = ts.with_subsec_digits(frac)?;
            }
            return Ok(ts);
        }

        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                let mut ts = Self::new(naive, None);
                if let Some(frac) = fraction_digits(s) {
                    ts = ts.with_subsec_digits(frac)?;
                }
                return Ok(ts);
            }
        }

        if let Some(ts) = Self::from_exif(s, None, None).ok().flatten() {
            return Ok(ts);
        }

        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| invalid())?;
        let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
        Ok(Self::new(midnight, None))
    }

    /// Whole-second UTC timestamp from a filesystem time.
    pub fn from_system_time(time: SystemTime) -> Self {
        let utc: DateTime<Utc> = time.into();
        Self::new(utc.naive_utc(), FixedOffset::east_opt(0))
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.datetime
    }

    pub fn offset(&self) -> Option<FixedOffset> {
        self.offset
    }

    /// Number of sub-second digits the source carried (0 for whole seconds).
    pub fn subsec_digits(&self) -> u8 {
        self.subsec_digits
    }

    /// The absolute instant, when the source recorded an offset.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        let offset = self.offset?;
        self.datetime
            .and_local_timezone(offset)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// `YYYY-MM-DDTHH:MM:SS[.fff][±HH:MM]`
    pub fn canonical(&self) -> String {
        let mut out = self.datetime.format("%Y-%m-%dT%H:%M:%S").to_string();
        if self.subsec_digits > 0 {
            let nanos = format!("{:09}", self.datetime.nanosecond());
            out.push('.');
            out.push_str(&nanos[..self.subsec_digits as usize]);
        }
        if let Some(offset) = self.offset {
            out.push_str(&offset.to_string());
        }
        out
    }

    /// Human-readable date, e.g. `10 September 2019`.
    pub fn display_date(&self) -> String {
        self.datetime.format("%-d %B %Y").to_string()
    }

    fn with_subsec_digits(mut self, digits: &str) -> Result<Self, TimestampError> {
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TimestampError::SubSecond(digits.to_string()));
        }
        let kept = &digits[..digits.len().min(MAX_SUBSEC_DIGITS as usize)];
        let value: u32 = kept
            .parse()
            .map_err(|_| TimestampError::SubSecond(digits.to_string()))?;
        let nanos = value * 10u32.pow(u32::from(MAX_SUBSEC_DIGITS) - kept.len() as u32);
        self.datetime = self
            .datetime
            .with_nanosecond(nanos)
            .ok_or_else(|| TimestampError::SubSecond(digits.to_string()))?;
        self.subsec_digits = kept.len() as u8;
        Ok(self)
    }
}

/// EXIF ASCII values are NUL-terminated and often space-padded.
fn clean(s: &str) -> &str {
    s.trim_matches(|c: char| c == '\0' || c.is_whitespace())
}

/// Digits following the seconds field's decimal point, if any.
fn fraction_digits(s: &str) -> Option<&str> {
    let time_start = s.find(['T', ' '])?;
    let dot = time_start + s[time_start..].find('.')?;
    let rest = &s[dot + 1..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}

fn parse_offset(s: &str) -> Result<FixedOffset, TimestampError> {
    let err = || TimestampError::Offset(s.to_string());
    if s == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(err);
    }
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return Err(err()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(err)?;
    let hours: i32 = hours.parse().map_err(|_| err())?;
    let minutes: i32 = minutes.parse().map_err(|_| err())?;
    if hours > 23 || minutes > 59 {
        return Err(err());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(err)
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Timestamp::parse(&s).map_err(serde::de::Error::custom)
    }
}
