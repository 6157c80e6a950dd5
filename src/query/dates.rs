// Publish-date expressions: absolute ISO-8601 or relative `today-<N><unit>`
use chrono::{Days, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::errors::{QueryError, Result};

/// Inclusive publish-date window applied as an index range filter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange", into = "RawDateRange")]
pub struct PublishDateRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

/// Wire form: both bounds as date expressions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDateRange {
    pub start: String,
    pub end: String,
}

impl PublishDateRange {
    /// Build a range, rejecting `start > end`
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if start > end {
            return Err(QueryError::InputError(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse both bounds relative to the current local time
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let now = chrono::Local::now().naive_local();
        Self::parse_at(start, end, now)
    }

    pub fn parse_at(start: &str, end: &str, now: NaiveDateTime) -> Result<Self> {
        Self::new(parse_date_expr(start, now)?, parse_date_expr(end, now)?)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }
}

impl TryFrom<RawDateRange> for PublishDateRange {
    type Error = QueryError;

    fn try_from(raw: RawDateRange) -> Result<Self> {
        PublishDateRange::parse(&raw.start, &raw.end)
    }
}

impl From<PublishDateRange> for RawDateRange {
    fn from(range: PublishDateRange) -> Self {
        RawDateRange {
            start: range.start.format("%Y-%m-%dT%H:%M:%S").to_string(),
            end: range.end.format("%Y-%m-%dT%H:%M:%S").to_string(),
        }
    }
}

/// Parse an absolute or relative date expression.
///
/// Absolute: `2020-01-01T00:00:00`, RFC 3339, or `2020-01-01`.
/// Relative: `today`, `today-3d`, `today-2w`, `today-1m`, `today-1y`.
pub fn parse_date_expr(expr: &str, now: NaiveDateTime) -> Result<NaiveDateTime> {
    let expr = expr.trim();

    if let Some(dt) = parse_absolute(expr) {
        return Ok(dt);
    }

    let invalid = || QueryError::InputError(format!("invalid date string: {}", expr));

    let rest = expr.strip_prefix("today").ok_or_else(invalid)?;
    if rest.is_empty() {
        return Ok(now);
    }

    let rest = rest.strip_prefix('-').ok_or_else(invalid)?;
    let unit_at = rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
    let (digits, unit) = rest.split_at(unit_at);
    let amount: u32 = digits.parse().map_err(|_| invalid())?;

    let shifted = match unit {
        "d" => now.checked_sub_days(Days::new(amount as u64)),
        "w" => now.checked_sub_days(Days::new(amount as u64 * 7)),
        "m" => now.checked_sub_months(Months::new(amount)),
        "y" => amount
            .checked_mul(12)
            .and_then(|months| now.checked_sub_months(Months::new(months))),
        _ => return Err(invalid()),
    };

    shifted.ok_or_else(|| QueryError::InputError(format!("date out of range: {}", expr)))
}

fn parse_absolute(expr: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(expr) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(expr, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(expr, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(expr, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
