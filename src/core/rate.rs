//! Request-scoped rate values

use crate::core::error::RateError;
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::fmt::Display;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CurrencyPair {
    from: String,
    to: String,
}

impl CurrencyPair {
    pub fn new(from: &str, to: &str) -> Result<Self, RateError> {
        if from.is_empty() || to.is_empty() {
            return Err(RateError::invalid(
                "invalid parameters: a parameter can't be empty",
            ));
        }
        if from == to {
            return Err(RateError::invalid(
                "invalid parameter: from & to can't be same",
            ));
        }
        Ok(CurrencyPair {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &str {
        &self.to
    }
}

impl Display for CurrencyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.from, self.to)
    }
}

/// Inclusive calendar date range with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, RateError> {
        if start > end {
            return Err(RateError::invalid(format!(
                "invalid parameter: start_date {start} is after end_date {end}"
            )));
        }
        Ok(DateRange { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days in the range, both ends included.
    pub fn day_count(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// Every date of the range in chronological order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let start = self.start;
        (0..self.day_count() as u64)
            .filter_map(move |offset| start.checked_add_days(Days::new(offset)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyRate {
    pub date: NaiveDate,
    pub value: f64,
}

/// One rate per day of a range, in date order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RangeResult(Vec<DailyRate>);

impl RangeResult {
    pub(crate) fn from_ordered(rates: Vec<DailyRate>) -> Self {
        RangeResult(rates)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DailyRate> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<DailyRate> {
        self.0
    }
}

impl std::ops::Index<usize> for RangeResult {
    type Output = DailyRate;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<'a> IntoIterator for &'a RangeResult {
    type Item = &'a DailyRate;
    type IntoIter = std::slice::Iter<'a, DailyRate>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
