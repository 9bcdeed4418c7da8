//! Search filter vocabulary.
//!
//! Filters form a closed set; any other parameter name is rejected with
//! `UnknownFilter` instead of being silently ignored. Each filter reports the
//! exact predicate it evaluates, so callers can see for example that
//! `has_code` is a proxy (deep analysis plus a reproducibility threshold)
//! and not a check for a code link. The direct check is `has_github_link`.
//!
//! Papers whose relevant field is unknown (unscored, `DateUnknown`) never
//! satisfy a filter on that field.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::{QueryError, QueryResult};
use crate::models::{parse_timestamp, DateRange, Difficulty, Paper};

/// Reproducibility threshold used by the `has_code` proxy.
pub const HAS_CODE_MIN_REPRODUCIBILITY: f64 = 6.0;

const HAS_CODE_PREDICATE: &str = "has_deep_analysis && reproducibility_score >= 6";
const HAS_GITHUB_LINK_PREDICATE: &str = "github_urls contains a github.com/<owner>/<repo> link";

/// Parameter names accepted by [`FilterSet::from_params`], snake_case first.
pub const FILTER_PARAMS: &[&str] = &[
    "category",
    "difficulty",
    "has_code",
    "has_github_link",
    "min_impact_score",
    "min_reproducibility",
    "date_from",
    "date_to",
];

/// One recognized filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Case-insensitive category equality
    Category(String),
    /// Effective difficulty equality
    Difficulty(Difficulty),
    /// `true`: deep analysis and reproducibility >= 6; `false`: the complement
    HasCode(bool),
    /// Direct GitHub repository link presence (or absence)
    HasGithubLink(bool),
    MinImpactScore(f64),
    MinReproducibility(f64),
    /// Inclusive publication range; unknown dates never match
    DateRange(DateRange),
}

/// A filter as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedFilter {
    pub name: String,
    pub value: String,
    pub predicate: String,
}

impl Filter {
    pub fn name(&self) -> &'static str {
        match self {
            Filter::Category(_) => "category",
            Filter::Difficulty(_) => "difficulty",
            Filter::HasCode(_) => "has_code",
            Filter::HasGithubLink(_) => "has_github_link",
            Filter::MinImpactScore(_) => "min_impact_score",
            Filter::MinReproducibility(_) => "min_reproducibility",
            Filter::DateRange(_) => "date_range",
        }
    }

    /// Human-readable predicate this filter evaluates.
    pub fn predicate(&self) -> String {
        match self {
            Filter::Category(c) => format!("category == \"{}\" (case-insensitive)", c),
            Filter::Difficulty(d) => format!("difficulty == {}", d),
            Filter::HasCode(true) => HAS_CODE_PREDICATE.to_string(),
            Filter::HasCode(false) => format!("!({})", HAS_CODE_PREDICATE),
            Filter::HasGithubLink(true) => HAS_GITHUB_LINK_PREDICATE.to_string(),
            Filter::HasGithubLink(false) => format!("!({})", HAS_GITHUB_LINK_PREDICATE),
            Filter::MinImpactScore(min) => format!("impact_score >= {}", min),
            Filter::MinReproducibility(min) => format!("reproducibility_score >= {}", min),
            Filter::DateRange(range) => {
                let from = range
                    .from
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_else(|| "-inf".to_string());
                let to = range
                    .to
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_else(|| "+inf".to_string());
                format!("published in [{}, {}], unknown dates excluded", from, to)
            }
        }
    }

    fn value(&self) -> String {
        match self {
            Filter::Category(c) => c.clone(),
            Filter::Difficulty(d) => d.to_string(),
            Filter::HasCode(b) | Filter::HasGithubLink(b) => b.to_string(),
            Filter::MinImpactScore(v) | Filter::MinReproducibility(v) => v.to_string(),
            Filter::DateRange(range) => format!(
                "{}..{}",
                range.from.map(|d| d.date_naive().to_string()).unwrap_or_default(),
                range.to.map(|d| d.date_naive().to_string()).unwrap_or_default()
            ),
        }
    }

    pub fn describe(&self) -> AppliedFilter {
        AppliedFilter {
            name: self.name().to_string(),
            value: self.value(),
            predicate: self.predicate(),
        }
    }

    pub fn matches(&self, paper: &Paper) -> bool {
        match self {
            Filter::Category(c) => paper.category.eq_ignore_ascii_case(c),
            Filter::Difficulty(d) => paper.difficulty_level() == Some(*d),
            Filter::HasCode(wanted) => match has_code(paper) {
                Some(actual) => actual == *wanted,
                None => false,
            },
            Filter::HasGithubLink(wanted) => paper.has_github_link() == *wanted,
            Filter::MinImpactScore(min) => paper.impact_score().map_or(false, |s| s >= *min),
            Filter::MinReproducibility(min) => {
                paper.reproducibility_score().map_or(false, |s| s >= *min)
            }
            Filter::DateRange(range) => range.contains(&paper.published),
        }
    }
}

/// The `has_code` proxy: deep analysis and reproducibility >= 6.
///
/// `None` for unscored papers that have a deep analysis, whose outcome
/// depends on a score that does not exist yet.
pub fn has_code(paper: &Paper) -> Option<bool> {
    if !paper.has_deep_analysis {
        return Some(false);
    }
    paper
        .reproducibility_score()
        .map(|score| score >= HAS_CODE_MIN_REPRODUCIBILITY)
}

/// Conjunction of filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter, replacing any earlier filter with the same name.
    pub fn with(mut self, filter: Filter) -> Self {
        self.filters.retain(|f| f.name() != filter.name());
        self.filters.push(filter);
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Names of the filters `paper` satisfies, or `None` if it fails any.
    pub fn evaluate(&self, paper: &Paper) -> Option<Vec<String>> {
        let mut matched = Vec::with_capacity(self.filters.len());
        for filter in &self.filters {
            if !filter.matches(paper) {
                return None;
            }
            matched.push(filter.name().to_string());
        }
        Some(matched)
    }

    pub fn matches(&self, paper: &Paper) -> bool {
        self.filters.iter().all(|f| f.matches(paper))
    }

    pub fn describe(&self) -> Vec<AppliedFilter> {
        self.filters.iter().map(Filter::describe).collect()
    }

    /// Parse filters from request parameters.
    ///
    /// Accepts the snake_case names in [`FILTER_PARAMS`] and their camelCase
    /// forms (`hasCode`, `minImpactScore`, ...). A `date_to` naming a day,
    /// month or year covers that whole period.
    ///
    /// # Errors
    /// - `UnknownFilter` for any other name
    /// - `InvalidQuery` for empty or malformed values, repeated names or an
    ///   inverted date range
    pub fn from_params<'a, I>(params: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut set = FilterSet::new();
        let mut seen: Vec<&'static str> = Vec::new();
        let mut date_from = None;
        let mut date_to = None;

        for (raw_key, raw_value) in params {
            let key = canonical_name(raw_key)
                .ok_or_else(|| QueryError::UnknownFilter(raw_key.to_string()))?;
            if seen.contains(&key) {
                return Err(QueryError::InvalidQuery(format!("filter '{}' given twice", key)));
            }
            seen.push(key);

            let value = raw_value.trim();
            if value.is_empty() {
                return Err(QueryError::InvalidQuery(format!("filter '{}' has no value", key)));
            }

            let filter = match key {
                "category" => Filter::Category(value.to_string()),
                "difficulty" => Filter::Difficulty(
                    value
                        .parse::<Difficulty>()
                        .map_err(|e| QueryError::InvalidQuery(e.to_string()))?,
                ),
                "has_code" => Filter::HasCode(parse_bool(key, value)?),
                "has_github_link" => Filter::HasGithubLink(parse_bool(key, value)?),
                "min_impact_score" => Filter::MinImpactScore(parse_score(key, value)?),
                "min_reproducibility" => Filter::MinReproducibility(parse_score(key, value)?),
                "date_from" => {
                    date_from = Some(parse_date(key, value)?);
                    continue;
                }
                "date_to" => {
                    date_to = Some(end_of_period(value, parse_date(key, value)?));
                    continue;
                }
                _ => return Err(QueryError::UnknownFilter(raw_key.to_string())),
            };
            set = set.with(filter);
        }

        if date_from.is_some() || date_to.is_some() {
            let range = DateRange::new(date_from, date_to);
            if !range.is_valid() {
                return Err(QueryError::InvalidQuery(
                    "date_from must not be after date_to".to_string(),
                ));
            }
            set = set.with(Filter::DateRange(range));
        }

        Ok(set)
    }
}

fn canonical_name(raw: &str) -> Option<&'static str> {
    let key = raw.trim();
    FILTER_PARAMS.iter().copied().find(|name| {
        *name == key || to_camel_case(name) == key
    })
}

fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_bool(key: &str, value: &str) -> QueryResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(QueryError::InvalidQuery(format!(
            "{} must be true or false, got '{}'",
            key, value
        ))),
    }
}

fn parse_score(key: &str, value: &str) -> QueryResult<f64> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| QueryError::InvalidQuery(format!("{} must be a number, got '{}'", key, value)))?;
    if !(0.0..=10.0).contains(&parsed) {
        return Err(QueryError::InvalidQuery(format!(
            "{} must lie in [0, 10], got {}",
            key, parsed
        )));
    }
    Ok(parsed)
}

fn parse_date(key: &str, value: &str) -> QueryResult<DateTime<Utc>> {
    parse_timestamp(value)
        .ok_or_else(|| QueryError::InvalidQuery(format!("{} is not a date: '{}'", key, value)))
}

/// Last second of the year, month or day `value` names, starting at `start`.
/// Full timestamps come back unchanged.
fn end_of_period(value: &str, start: DateTime<Utc>) -> DateTime<Utc> {
    let next = match value.len() {
        4 => Utc.with_ymd_and_hms(start.year() + 1, 1, 1, 0, 0, 0).single(),
        7 => {
            let (year, month) = if start.month() == 12 {
                (start.year() + 1, 1)
            } else {
                (start.year(), start.month() + 1)
            };
            Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
        }
        10 if !value.contains('T') && !value.contains(' ') => Some(start + Duration::days(1)),
        _ => None,
    };
    next.map_or(start, |next| next - Duration::seconds(1))
}
