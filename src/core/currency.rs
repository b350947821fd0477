//! Historical currency rate abstractions

use crate::core::context::FetchContext;
use crate::core::error::RateError;
use crate::core::rate::{CurrencyPair, DailyRate};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Resolves the rate of a currency pair for one calendar day.
#[async_trait]
pub trait DayRateProvider: Send + Sync {
    async fn fetch_day(
        &self,
        ctx: &FetchContext,
        pair: &CurrencyPair,
        date: NaiveDate,
    ) -> Result<DailyRate, RateError>;
}
