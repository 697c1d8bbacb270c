//! Typed, comparable values for comparison operators.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Days, Local, Months, NaiveDate, NaiveDateTime, TimeZone};

use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Bool,
    Integer,
    DateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchValue {
    String(String),
    Bool(bool),
    Integer(i64),
    /// `day_only` values carry no time of day and compare by calendar date.
    DateTime {
        value: DateTime<Local>,
        day_only: bool,
    },
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

impl SearchValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            SearchValue::String(_) => ValueKind::String,
            SearchValue::Bool(_) => ValueKind::Bool,
            SearchValue::Integer(_) => ValueKind::Integer,
            SearchValue::DateTime { .. } => ValueKind::DateTime,
        }
    }

    pub fn parse(kind: ValueKind, text: &str) -> Result<Self, ParseError> {
        match kind {
            ValueKind::String => Ok(SearchValue::String(text.to_string())),
            ValueKind::Bool => parse_bool(text).map(SearchValue::Bool),
            ValueKind::Integer => parse_integer(text).map(SearchValue::Integer),
            ValueKind::DateTime => parse_date(text, Local::now()),
        }
    }

    pub fn date(value: DateTime<Local>) -> Self {
        SearchValue::DateTime {
            value,
            day_only: false,
        }
    }

    /// Orders `self` against `reference`.
    ///
    /// A day-only reference compares by calendar date only.
    ///
    /// # Panics
    /// Panics if the two values are of different kinds.
    pub fn compare(&self, reference: &SearchValue) -> Ordering {
        match (self, reference) {
            (SearchValue::String(a), SearchValue::String(b)) => a.cmp(b),
            (SearchValue::Bool(a), SearchValue::Bool(b)) => a.cmp(b),
            (SearchValue::Integer(a), SearchValue::Integer(b)) => a.cmp(b),
            (
                SearchValue::DateTime { value: a, .. },
                SearchValue::DateTime {
                    value: b,
                    day_only,
                },
            ) => {
                if *day_only {
                    a.date_naive().cmp(&b.date_naive())
                } else {
                    a.cmp(b)
                }
            }
            (a, b) => panic!(
                "cannot compare {:?} value with {:?} value",
                a.kind(),
                b.kind()
            ),
        }
    }
}

impl fmt::Display for SearchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchValue::String(s) => f.write_str(s),
            SearchValue::Bool(b) => write!(f, "{b}"),
            SearchValue::Integer(i) => write!(f, "{i}"),
            SearchValue::DateTime { value, .. } => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

fn parse_bool(text: &str) -> Result<bool, ParseError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ParseError::BadBoolean(text.to_string())),
    }
}

/// Parses an integer with an optional binary unit suffix (`K`, `KB`, `M`, ...).
fn parse_integer(text: &str) -> Result<i64, ParseError> {
    let bad = || ParseError::BadInteger(text.to_string());
    let trimmed = text.trim();
    let upper = trimmed.to_ascii_uppercase();
    let digits_end = upper
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map_or(upper.len(), |(i, _)| i);
    let (number, suffix) = upper.split_at(digits_end);
    let number: i64 = number.parse().map_err(|_| bad())?;
    let shift = match suffix.trim() {
        "" | "B" => 0,
        "K" | "KB" => 10,
        "M" | "MB" => 20,
        "G" | "GB" => 30,
        "T" | "TB" => 40,
        _ => return Err(bad()),
    };
    number.checked_mul(1i64 << shift).ok_or_else(bad)
}

/// Parses an absolute date, or an offset like `-5day` relative to `now`.
fn parse_date(text: &str, now: DateTime<Local>) -> Result<SearchValue, ParseError> {
    let bad = || ParseError::BadDate(text.to_string());
    let trimmed = text.trim();

    if let Some(offset) = parse_relative(trimmed) {
        let value = offset.apply(now).ok_or_else(bad)?;
        return Ok(SearchValue::DateTime {
            value,
            day_only: true,
        });
    }

    for format in DATE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            let value = Local.from_local_datetime(&naive).earliest().ok_or_else(bad)?;
            return Ok(SearchValue::DateTime {
                value,
                day_only: false,
            });
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            let naive = date.and_hms_opt(0, 0, 0).ok_or_else(bad)?;
            let value = Local.from_local_datetime(&naive).earliest().ok_or_else(bad)?;
            return Ok(SearchValue::DateTime {
                value,
                day_only: true,
            });
        }
    }
    Err(bad())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelativeUnit {
    Day,
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RelativeOffset {
    amount: i64,
    unit: RelativeUnit,
}

impl RelativeOffset {
    fn apply(self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        let magnitude = u32::try_from(self.amount.unsigned_abs()).ok()?;
        let forward = self.amount >= 0;
        match self.unit {
            RelativeUnit::Day => {
                let days = Days::new(u64::from(magnitude));
                if forward {
                    now.checked_add_days(days)
                } else {
                    now.checked_sub_days(days)
                }
            }
            RelativeUnit::Month | RelativeUnit::Year => {
                let months = if self.unit == RelativeUnit::Year {
                    magnitude.checked_mul(12)?
                } else {
                    magnitude
                };
                if forward {
                    now.checked_add_months(Months::new(months))
                } else {
                    now.checked_sub_months(Months::new(months))
                }
            }
        }
    }
}

/// `[+-]?<integer>(day|days|month|months|year|years)`
fn parse_relative(text: &str) -> Option<RelativeOffset> {
    let lower = text.to_ascii_lowercase();
    let unit_start = lower.find(|c: char| c.is_ascii_alphabetic())?;
    let (number, unit) = lower.split_at(unit_start);
    if number.is_empty() || number == "+" || number == "-" {
        return None;
    }
    let amount: i64 = number.parse().ok()?;
    let unit = match unit {
        "day" | "days" => RelativeUnit::Day,
        "month" | "months" => RelativeUnit::Month,
        "year" | "years" => RelativeUnit::Year,
        _ => return None,
    };
    Some(RelativeOffset { amount, unit })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn integers_accept_binary_units() {
        assert_eq!(parse_integer("42").unwrap(), 42);
        assert_eq!(parse_integer("10K").unwrap(), 10 * 1024);
        assert_eq!(parse_integer("2mb").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_integer("-3").unwrap(), -3);
        assert_eq!(parse_integer("1TB").unwrap(), 1 << 40);
        assert!(matches!(parse_integer("12X"), Err(ParseError::BadInteger(_))));
        assert!(matches!(parse_integer("K"), Err(ParseError::BadInteger(_))));
    }

    #[test]
    fn booleans() {
        assert_eq!(SearchValue::parse(ValueKind::Bool, "TRUE").unwrap(), SearchValue::Bool(true));
        assert_eq!(SearchValue::parse(ValueKind::Bool, "no").unwrap(), SearchValue::Bool(false));
        assert!(matches!(
            SearchValue::parse(ValueKind::Bool, "maybe"),
            Err(ParseError::BadBoolean(_))
        ));
    }

    #[test]
    fn absolute_dates_without_time_compare_by_day() {
        let reference = SearchValue::parse(ValueKind::DateTime, "2018-01-01").unwrap();
        let same_day = SearchValue::date(local(2018, 1, 1, 15));
        let next_day = SearchValue::date(local(2018, 1, 2, 0));
        assert_eq!(same_day.compare(&reference), Ordering::Equal);
        assert_eq!(next_day.compare(&reference), Ordering::Greater);

        let precise = SearchValue::parse(ValueKind::DateTime, "2018-01-01 12:00:00").unwrap();
        assert_eq!(same_day.compare(&precise), Ordering::Greater);
    }

    #[test]
    fn relative_dates_resolve_against_now() {
        let now = local(2020, 3, 31, 12);
        let SearchValue::DateTime { value, day_only } = parse_date("-5day", now).unwrap() else {
            panic!("expected a date");
        };
        assert!(day_only);
        assert_eq!(value.date_naive(), NaiveDate::from_ymd_opt(2020, 3, 26).unwrap());

        let SearchValue::DateTime { value, .. } = parse_date("+1month", now).unwrap() else {
            panic!("expected a date");
        };
        assert_eq!(value.date_naive(), NaiveDate::from_ymd_opt(2020, 4, 30).unwrap());

        let SearchValue::DateTime { value, .. } = parse_date("-2years", now).unwrap() else {
            panic!("expected a date");
        };
        assert_eq!(value.date_naive(), NaiveDate::from_ymd_opt(2018, 3, 31).unwrap());
    }

    #[test]
    fn malformed_dates_are_reported() {
        assert_eq!(
            SearchValue::parse(ValueKind::DateTime, "5fortnights"),
            Err(ParseError::BadDate("5fortnights".into()))
        );
        assert!(SearchValue::parse(ValueKind::DateTime, "2018-13-01").is_err());
    }

    #[test]
    #[should_panic(expected = "cannot compare")]
    fn mismatched_kinds_panic() {
        SearchValue::Integer(1).compare(&SearchValue::Bool(true));
    }
}
