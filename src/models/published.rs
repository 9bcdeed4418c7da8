//! Publication dates and date-range filtering.
//!
//! Source metadata frequently carries dates that do not parse. Those papers
//! get an explicit `DateUnknown` state instead of a placeholder timestamp, so
//! they never look "recent" and never receive an age-normalized score.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Mean Gregorian month length in days.
pub const DAYS_PER_MONTH: f64 = 30.436875;

/// Smallest paper age used for age normalization: one day, in months.
pub const MIN_AGE_MONTHS: f64 = 1.0 / DAYS_PER_MONTH;

const SECONDS_PER_MONTH: f64 = DAYS_PER_MONTH * 86_400.0;

/// Publication timestamp of a paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishedDate {
    /// A parseable timestamp (normalized to UTC)
    Known { date: DateTime<Utc> },

    /// The source value was missing or unparseable
    DateUnknown {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw: Option<String>,
    },
}

impl PublishedDate {
    pub fn known(date: DateTime<Utc>) -> Self {
        PublishedDate::Known { date }
    }

    /// Parse a raw source date.
    ///
    /// Accepts RFC 3339, `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS`,
    /// `YYYY-MM-DD HH:MM:SS`, `YYYY/MM/DD`, `YYYY-MM` and `YYYY`. Anything else
    /// yields `DateUnknown` carrying the raw text.
    pub fn parse(raw: &str) -> Self {
        match parse_timestamp(raw) {
            Some(date) => PublishedDate::Known { date },
            None => PublishedDate::DateUnknown {
                raw: if raw.trim().is_empty() {
                    None
                } else {
                    Some(raw.to_string())
                },
            },
        }
    }

    pub fn from_optional(raw: Option<&str>) -> Self {
        match raw {
            Some(raw) => Self::parse(raw),
            None => PublishedDate::DateUnknown { raw: None },
        }
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        match self {
            PublishedDate::Known { date } => Some(*date),
            PublishedDate::DateUnknown { .. } => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, PublishedDate::DateUnknown { .. })
    }

    /// Age in months at `now`, clamped below at [`MIN_AGE_MONTHS`].
    ///
    /// Returns `None` for unknown dates. Future-dated papers also clamp to the
    /// minimum age.
    pub fn months_since(&self, now: DateTime<Utc>) -> Option<f64> {
        let date = self.date()?;
        let seconds = (now - date).num_seconds() as f64;
        Some((seconds / SECONDS_PER_MONTH).max(MIN_AGE_MONTHS))
    }
}

/// Parse a timestamp in any of the accepted source formats.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(day) = NaiveDate::parse_from_str(s, format) {
            return start_of_day(day);
        }
    }

    if s.len() == 7 {
        if let Ok(day) = NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d") {
            return start_of_day(day);
        }
    }

    if s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()) {
        let year: i32 = s.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, 1, 1).and_then(start_of_day);
    }

    None
}

fn start_of_day(day: NaiveDate) -> Option<DateTime<Utc>> {
    day.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Inclusive publication date range; either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    /// A range is valid when it is not inverted.
    pub fn is_valid(&self) -> bool {
        match (self.from, self.to) {
            (Some(from), Some(to)) => from <= to,
            _ => true,
        }
    }

    /// Papers with an unknown date never fall inside any range.
    pub fn contains(&self, published: &PublishedDate) -> bool {
        let Some(date) = published.date() else {
            return false;
        };
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}
