//! Validation and clamping of incoming history parameters

use crate::core::error::RateError;
use crate::core::rate::{CurrencyPair, DATE_FORMAT, DateRange};
use chrono::NaiveDate;
use tracing::debug;

/// Validates the raw request parameters and builds the range and pair for a history fetch.
///
/// `end` is clamped to `today` and `start` is clamped to `end`. Dates must use the
/// `YYYY-MM-DD` format; anything else is rejected instead of silently collapsing
/// to the zero date.
pub fn normalize(
    from: &str,
    to: &str,
    start_date: &str,
    end_date: &str,
    today: NaiveDate,
) -> Result<(DateRange, CurrencyPair), RateError> {
    if from.is_empty() || to.is_empty() || start_date.is_empty() || end_date.is_empty() {
        return Err(RateError::invalid(
            "invalid parameters: a parameter can't be empty",
        ));
    }

    let pair = CurrencyPair::new(from, to)?;

    let mut start = parse_date("start_date", start_date)?;
    let mut end = parse_date("end_date", end_date)?;

    if end > today {
        debug!(%end, %today, "Clamping end date to today");
        end = today;
    }
    if start > end {
        debug!(%start, %end, "Clamping start date to end date");
        start = end;
    }

    Ok((DateRange::new(start, end)?, pair))
}

/// Parses a date written as exactly `dddd-dd-dd`.
///
/// `%Y` alone accepts signed and short years, so the shape is checked first.
fn parse_date(name: &str, value: &str) -> Result<NaiveDate, RateError> {
    let malformed = || {
        RateError::invalid(format!(
            "invalid parameter: {name} must be formatted as YYYY-MM-DD"
        ))
    };
    if !has_date_shape(value) {
        return Err(malformed());
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| malformed())
}

fn has_date_shape(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}
