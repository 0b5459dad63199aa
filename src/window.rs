//! Report time window

use chrono::NaiveDateTime;
use thiserror::Error;

/// Accepted input formats for window boundaries.
const INPUT_FORMATS: &[&str] = &["%Y/%m/%d %H:%M", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

/// Display format used in titles, subjects and the report filename.
const DISPLAY_FORMAT: &str = "%Y/%m/%d %H:%M";

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("unparseable window boundary: {0}")]
    InvalidTimestamp(String),
}

/// The half-open time window `[start, end)` a report covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ReportWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Parse CLI-style boundaries (e.g. `2018/03/28 06:30`).
    pub fn parse(start: &str, end: &str) -> Result<Self, WindowError> {
        Ok(Self {
            start: parse_boundary(start)?,
            end: parse_boundary(end)?,
        })
    }

    pub fn start_display(&self) -> String {
        self.start.format(DISPLAY_FORMAT).to_string()
    }

    pub fn end_display(&self) -> String {
        self.end.format(DISPLAY_FORMAT).to_string()
    }

    /// ISO boundaries for the backend range filter.
    pub fn start_iso(&self) -> String {
        self.start.format("%Y-%m-%dT%H:%M:%S").to_string()
    }

    pub fn end_iso(&self) -> String {
        self.end.format("%Y-%m-%dT%H:%M:%S").to_string()
    }

    /// Epoch milliseconds of both boundaries, for dashboard deep links.
    pub fn epoch_millis(&self) -> (i64, i64) {
        (
            self.start.and_utc().timestamp_millis(),
            self.end.and_utc().timestamp_millis(),
        )
    }

    /// Apply a strftime-style index pattern (e.g. `gracc.osg.raw-%Y.%m`)
    /// to the window start.
    pub fn index(&self, pattern: &str) -> String {
        self.start.format(pattern).to_string()
    }
}

fn parse_boundary(value: &str) -> Result<NaiveDateTime, WindowError> {
    let trimmed = value.trim();
    for format in INPUT_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(parsed);
        }
    }
    Err(WindowError::InvalidTimestamp(value.to_string()))
}
