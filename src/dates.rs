// Date range generation for the search window

use chrono::NaiveDate;
use thiserror::Error;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug, PartialEq)]
pub enum DateRangeError {
    #[error("Malformed date: {0}")]
    Malformed(String),

    #[error("Invalid range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

pub fn parse_date(value: &str) -> Result<NaiveDate, DateRangeError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| DateRangeError::Malformed(value.to_string()))
}

// Every date from start to end, both inclusive, ascending
pub fn date_range(start: &str, end: &str) -> Result<Vec<NaiveDate>, DateRangeError> {
    date_range_between(parse_date(start)?, parse_date(end)?)
}

pub fn date_range_between(
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<NaiveDate>, DateRangeError> {
    if start > end {
        return Err(DateRangeError::InvalidRange { start, end });
    }

    Ok(start.iter_days().take_while(|day| *day <= end).collect())
}
