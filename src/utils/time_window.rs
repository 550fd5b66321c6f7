use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer};
use std::fmt;

const TIME_FORMAT: &str = "%H:%M:%S";

/// When a completed daily job becomes eligible again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetRule {
    /// As soon as the current time leaves the window.
    WindowExit,
    /// When the window's next occurrence begins on a new date.
    DateRollover,
}

/// Daily UTC time-of-day window, half-open `[start, end)`.
///
/// `start > end` is a window crossing midnight, e.g. 23:00:00 to 00:00:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, chrono::ParseError> {
        Ok(Self::new(
            NaiveTime::parse_from_str(start, TIME_FORMAT)?,
            NaiveTime::parse_from_str(end, TIME_FORMAT)?,
        ))
    }

    pub fn crosses_midnight(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.crosses_midnight() {
            self.start <= time || time < self.end
        } else {
            self.start <= time && time < self.end
        }
    }

    /// Two non-empty circular intervals overlap iff one holds the other's start.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        if self.start == self.end || other.start == other.end {
            return false;
        }
        self.contains(other.start) || other.contains(self.start)
    }

    /// Date on which the occurrence of this window covering `now` started.
    ///
    /// For a midnight-crossing window the early-morning part belongs to the
    /// previous day's occurrence.
    pub fn occurrence_date(&self, now: NaiveDateTime) -> NaiveDate {
        let date = now.date();
        if self.crosses_midnight() && now.time() < self.end {
            date.pred_opt().unwrap_or(date)
        } else {
            date
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} UTC",
            self.start.format(TIME_FORMAT),
            self.end.format(TIME_FORMAT)
        )
    }
}

#[derive(Deserialize)]
struct RawWindow {
    start_time: String,
    end_time: String,
}

impl<'de> Deserialize<'de> for TimeWindow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawWindow::deserialize(deserializer)?;
        TimeWindow::parse(&raw.start_time, &raw.end_time).map_err(|e| {
            serde::de::Error::custom(format!(
                "invalid window {}-{}: {}",
                raw.start_time, raw.end_time, e
            ))
        })
    }
}
