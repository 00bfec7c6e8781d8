use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::LstError;

/// Inclusive acquisition date range used to filter the imagery archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, LstError> {
        if end < start {
            return Err(LstError::InvalidDateWindow(format!(
                "window ends ({}) before it starts ({})",
                end, start
            )));
        }
        Ok(DateWindow { start, end })
    }

    /// Parse `YYYY-MM-DD` bounds
    pub fn parse(start: &str, end: &str) -> anyhow::Result<Self> {
        let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
            .map_err(|e| anyhow::anyhow!("invalid start date '{}': {}", start, e))?;
        let end = NaiveDate::parse_from_str(end, "%Y-%m-%d")
            .map_err(|e| anyhow::anyhow!("invalid end date '{}': {}", end, e))?;
        Ok(DateWindow::new(start, end)?)
    }

    /// The first to the last day of a calendar month
    pub fn month(year: i32, month: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        let end = next.pred_opt()?;
        Some(DateWindow { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// RFC 3339 interval covering whole days, as used by STAC `datetime`
    pub fn to_rfc3339_interval(&self) -> String {
        format!(
            "{}T00:00:00Z/{}T23:59:59Z",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }

    pub fn label(&self) -> String {
        let whole_month = DateWindow::month(self.start.year(), self.start.month());
        if self.start.day() == 1 && Some(*self) == whole_month {
            self.start.format("%B %Y").to_string()
        } else {
            format!("{} to {}", self.start, self.end)
        }
    }
}
