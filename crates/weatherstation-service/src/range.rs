//! Query range resolution.
//!
//! A [`RangeRequest`] is the raw query string of `GET /api/weather`. It is
//! resolved into a [`ResolvedRange`], a half-open `[start, end)` instant range
//! plus an optional [`BucketWidth`], before anything touches the store.
//!
//! Three addressing styles are understood, checked in this order:
//!
//! 1. explicit `start` + `end` dates, optionally with `everySec` bucketing
//! 2. `mode=hourly` with an optional `day` (one calendar day)
//! 3. `mode=daily` with an optional `end` (seven calendar days ending on `end`)
//!
//! Dates are `YYYY-MM-DD` calendar days at midnight in the server offset.

use serde::Deserialize;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, UtcOffset};
use weatherstation_store::ReadingQuery;
use weatherstation_store::aggregate::{BucketWidth, MAX_BUCKET_SECS, MIN_BUCKET_SECS};

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Days covered by `mode=daily` before its end day.
const DAILY_LOOKBACK_DAYS: i64 = 6;

/// Raw range parameters as they arrive on the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RangeRequest {
    pub start: Option<String>,
    pub end: Option<String>,
    pub mode: Option<String>,
    pub day: Option<String>,
    #[serde(rename = "everySec")]
    pub every_sec: Option<String>,
}

/// Errors produced while resolving a [`RangeRequest`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("start and end required (YYYY-MM-DD)")]
    IncompleteRange,
    #[error("{param} must be YYYY-MM-DD")]
    InvalidDate { param: &'static str, value: String },
    #[error("mode must be hourly|daily")]
    UnknownMode(String),
    #[error("use start/end or mode")]
    Unaddressed,
}

/// A resolved, immutable query range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    start: OffsetDateTime,
    end: OffsetDateTime,
    bucket: Option<BucketWidth>,
}

impl ResolvedRange {
    /// Inclusive lower bound.
    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> OffsetDateTime {
        self.end
    }

    /// Bucket width, when the request asked for aggregation.
    pub fn bucket(&self) -> Option<BucketWidth> {
        self.bucket
    }

    /// Store query covering this range, oldest first.
    pub fn to_query(&self) -> ReadingQuery {
        ReadingQuery::new().since(self.start).before(self.end)
    }
}

/// Which addressing style a request uses.
#[derive(Debug, PartialEq, Eq)]
enum Addressing<'a> {
    Explicit {
        start: Option<&'a str>,
        end: Option<&'a str>,
        every_sec: Option<&'a str>,
    },
    Hourly {
        day: Option<&'a str>,
    },
    Daily {
        end: Option<&'a str>,
    },
    UnknownMode(&'a str),
    Unaddressed,
}

impl RangeRequest {
    fn addressing(&self) -> Addressing<'_> {
        let start = present(&self.start);
        let end = present(&self.end);
        let mode = present(&self.mode);

        if start.is_some() || (end.is_some() && mode != Some("daily")) {
            return Addressing::Explicit {
                start,
                end,
                every_sec: present(&self.every_sec),
            };
        }

        match mode {
            Some("hourly") => Addressing::Hourly {
                day: present(&self.day),
            },
            Some("daily") => Addressing::Daily { end },
            Some(other) => Addressing::UnknownMode(other),
            None => Addressing::Unaddressed,
        }
    }

    /// Resolve the request against `today` in the server `offset`.
    pub fn resolve(&self, today: Date, offset: UtcOffset) -> Result<ResolvedRange, RangeError> {
        match self.addressing() {
            Addressing::Explicit {
                start,
                end,
                every_sec,
            } => {
                let (Some(start), Some(end)) = (start, end) else {
                    return Err(RangeError::IncompleteRange);
                };
                let first = parse_date("start", start)?;
                let last = parse_date("end", end)?;
                Ok(ResolvedRange {
                    start: midnight(first, offset),
                    end: midnight(day_after("end", last)?, offset),
                    bucket: every_sec.and_then(parse_bucket_width),
                })
            }
            Addressing::Hourly { day } => {
                let day = match day {
                    Some(day) => parse_date("day", day)?,
                    None => today,
                };
                Ok(ResolvedRange {
                    start: midnight(day, offset),
                    end: midnight(day_after("day", day)?, offset),
                    bucket: None,
                })
            }
            Addressing::Daily { end } => {
                let last = match end {
                    Some(end) => parse_date("end", end)?,
                    None => today,
                };
                let first = last
                    .checked_sub(Duration::days(DAILY_LOOKBACK_DAYS))
                    .ok_or_else(|| invalid_date("end", last))?;
                Ok(ResolvedRange {
                    start: midnight(first, offset),
                    end: midnight(day_after("end", last)?, offset),
                    bucket: None,
                })
            }
            Addressing::UnknownMode(mode) => Err(RangeError::UnknownMode(mode.to_string())),
            Addressing::Unaddressed => Err(RangeError::Unaddressed),
        }
    }
}

/// Parse an `everySec` value into a bucket width.
///
/// Anything that is not a number in `[10, 86400]` yields `None`,
/// which means "return raw readings". Fractions are floored.
pub fn parse_bucket_width(raw: &str) -> Option<BucketWidth> {
    let seconds: f64 = raw.trim().parse().ok()?;
    let bounds = f64::from(MIN_BUCKET_SECS)..=f64::from(MAX_BUCKET_SECS);
    if !bounds.contains(&seconds) {
        return None;
    }
    BucketWidth::new(seconds.floor() as u32)
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Strict `YYYY-MM-DD` that also names a real calendar day.
fn parse_date(param: &'static str, value: &str) -> Result<Date, RangeError> {
    let bytes = value.as_bytes();
    let shaped = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });

    if !shaped {
        return Err(RangeError::InvalidDate {
            param,
            value: value.to_string(),
        });
    }

    Date::parse(value, DATE_FORMAT).map_err(|_| RangeError::InvalidDate {
        param,
        value: value.to_string(),
    })
}

fn day_after(param: &'static str, date: Date) -> Result<Date, RangeError> {
    date.next_day().ok_or_else(|| invalid_date(param, date))
}

fn invalid_date(param: &'static str, date: Date) -> RangeError {
    RangeError::InvalidDate {
        param,
        value: date.to_string(),
    }
}

fn midnight(date: Date, offset: UtcOffset) -> OffsetDateTime {
    date.midnight().assume_offset(offset)
}
