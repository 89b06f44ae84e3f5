use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Reserved,
    Confirmed,
    Cancelled,
}

impl EventStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Reserved | Self::Confirmed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventSummary {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub status: EventStatus,
}

/// Everything the calendar knows about one date: the administrative block
/// flag, the events touching the day and how many tastings are scheduled.
///
/// The block flag is independent of the other facts. A blocked day may still
/// carry events that predate the block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayFact {
    pub date: NaiveDate,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default)]
    pub events: Vec<EventSummary>,
    #[serde(default)]
    pub tastings_count: u32,
}

impl DayFact {
    pub fn free(date: NaiveDate) -> Self {
        Self {
            date,
            is_blocked: false,
            events: Vec::new(),
            tastings_count: 0,
        }
    }

    pub fn has_active_event(&self) -> bool {
        self.events.iter().any(|event| event.status.is_active())
    }

    pub fn validate(&self) -> Result<(), String> {
        for event in &self.events {
            validate_non_empty(&event.id, "day.events[].id")?;
        }
        Ok(())
    }
}

/// Identity of a persisted day record, returned by get-or-create.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayRecord {
    pub id: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DayClass {
    Blocked,
    ActiveEvent,
    TastingOnly,
    Free,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BulkDayStatus {
    Blocked,
    Unblocked,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkDayResult {
    pub date: NaiveDate,
    pub status: BulkDayStatus,
}

/// One rendered cell of a month grid.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DayCell {
    pub date: NaiveDate,
    pub class: DayClass,
    pub selectable: bool,
    pub selected: bool,
}

/// Calendar month used as the cache key, formatted as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Result<Self, String> {
        if !(1..=12).contains(&month) {
            return Err(format!("month must be within 1..=12, got {month}"));
        }
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(format!("year {year} is out of range"));
        }
        Ok(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    pub fn first_day(self) -> NaiveDate {
        // Constructors guarantee the first of the month exists.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(self) -> NaiveDate {
        let next = self.next().first_day();
        next.pred_opt().unwrap_or(next)
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn days(self) -> impl Iterator<Item = NaiveDate> {
        let first = self.first_day();
        let count = self.last_day().day();
        (0..count).map(move |offset| first + Duration::days(i64::from(offset)))
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let (year, month) = value
            .split_once('-')
            .ok_or_else(|| format!("invalid month key '{value}': expected YYYY-MM"))?;
        if year.len() != 4 || month.len() != 2 {
            return Err(format!("invalid month key '{value}': expected YYYY-MM"));
        }
        let year = year
            .parse::<i32>()
            .map_err(|error| format!("invalid month key '{value}': {error}"))?;
        let month = month
            .parse::<u32>()
            .map_err(|error| format!("invalid month key '{value}': {error}"))?;
        Self::new(year, month)
    }
}

/// Day facts of one month, indexed by date.
pub type MonthBucket = BTreeMap<NaiveDate, DayFact>;

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn parse_iso_date(value: &str, field: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("{field} must be YYYY-MM-DD, got '{value}'"))
}

fn validate_non_empty(value: &str, field: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    Ok(())
}
