//! Concurrent range fetch: one day task per calendar day, first error wins.

use crate::core::{
    CurrencyPair, DailyRate, DateRange, DayRateProvider, FetchContext, RangeResult, RateError,
};
use chrono::NaiveDate;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeState {
    Scheduled,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl Display for RangeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                RangeState::Scheduled => "scheduled",
                RangeState::Running => "running",
                RangeState::Succeeded => "succeeded",
                RangeState::Failed => "failed",
                RangeState::Canceled => "canceled",
            }
        )
    }
}

/// Fetches a rate for every day of a range through a [`DayRateProvider`].
pub struct HistoryService {
    provider: Arc<dyn DayRateProvider>,
    max_concurrency: usize,
}

impl HistoryService {
    pub fn new(provider: Arc<dyn DayRateProvider>) -> Self {
        HistoryService {
            provider,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Caps the number of day tasks fetching at the same time. Zero is treated as one.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Returns one rate per day of `range` in date order, or the first error observed.
    ///
    /// Every day is scheduled as its own task. The first failure cancels the
    /// remaining tasks, and the call still waits for all of them before
    /// returning. Canceling `ctx` aborts the whole range with
    /// [`RateError::Canceled`]. Partial results are never returned.
    #[instrument(
        name = "RangeFetch",
        skip_all,
        fields(pair = %pair, start = %range.start(), end = %range.end())
    )]
    pub async fn fetch_range(
        &self,
        ctx: &FetchContext,
        pair: &CurrencyPair,
        range: &DateRange,
    ) -> Result<RangeResult, RateError> {
        let days = range.day_count();
        let mut slots: Vec<Option<DailyRate>> = vec![None; days];
        let group = ctx.child();
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        debug!(
            state = %RangeState::Scheduled,
            days,
            max_concurrency = self.max_concurrency,
            "Scheduling day tasks"
        );

        let mut tasks = JoinSet::new();
        for (index, date) in range.days().enumerate() {
            let provider = Arc::clone(&self.provider);
            let group = group.clone();
            let pair = pair.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let result = run_day(provider.as_ref(), &group, &pair, date, &permits).await;
                (index, result)
            });
        }
        debug!(state = %RangeState::Running, "Day tasks launched");

        let mut first_error: Option<RateError> = None;
        let mut parent_canceled = false;
        loop {
            let joined = tokio::select! {
                biased;
                joined = tasks.join_next() => joined,
                _ = ctx.canceled(), if !parent_canceled => {
                    parent_canceled = true;
                    group.cancel();
                    if first_error.is_none() {
                        warn!("Caller canceled range fetch");
                        first_error = Some(RateError::Canceled);
                    }
                    continue;
                }
            };
            let Some(joined) = joined else {
                break;
            };

            let outcome = match joined {
                Ok((index, result)) => result.map(|rate| (index, rate)),
                Err(e) => Err(RateError::Task(e.to_string())),
            };
            match outcome {
                // Each index is owned by exactly one task.
                Ok((index, rate)) => slots[index] = Some(rate),
                Err(err) if first_error.is_none() => {
                    warn!(error = %err, "Day task failed, canceling remaining tasks");
                    group.cancel();
                    first_error = Some(err);
                }
                Err(err) => debug!(error = %err, "Ignoring failure after first error"),
            }
        }

        if let Some(err) = first_error {
            let state = if err.is_canceled() {
                RangeState::Canceled
            } else {
                RangeState::Failed
            };
            info!(state = %state, error = %err, "Range fetch aborted");
            return Err(err);
        }

        let rates = slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| RateError::Task("day task finished without a result".to_string()))?;
        info!(state = %RangeState::Succeeded, days, "Range fetch completed");
        Ok(RangeResult::from_ordered(rates))
    }
}

async fn run_day(
    provider: &dyn DayRateProvider,
    ctx: &FetchContext,
    pair: &CurrencyPair,
    date: NaiveDate,
    permits: &Semaphore,
) -> Result<DailyRate, RateError> {
    let _permit = tokio::select! {
        biased;
        _ = ctx.canceled() => return Err(RateError::Canceled),
        permit = permits.acquire() => permit.map_err(|_| RateError::Canceled)?,
    };
    if ctx.is_canceled() {
        return Err(RateError::Canceled);
    }
    provider.fetch_day(ctx, pair, date).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Datelike;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn pair() -> CurrencyPair {
        CurrencyPair::new("USD", "EUR").unwrap()
    }

    /// Succeeds for every day; later days finish first.
    struct ReversedDelayProvider {
        end: NaiveDate,
    }

    #[async_trait]
    impl DayRateProvider for ReversedDelayProvider {
        async fn fetch_day(
            &self,
            _ctx: &FetchContext,
            _pair: &CurrencyPair,
            date: NaiveDate,
        ) -> Result<DailyRate, RateError> {
            let remaining = (self.end - date).num_days() as u64;
            tokio::time::sleep(Duration::from_millis(remaining * 5)).await;
            Ok(DailyRate {
                date,
                value: date.day() as f64,
            })
        }
    }

    /// Fails on `failing`, every other day blocks until canceled.
    struct FailingProvider {
        failing: NaiveDate,
        canceled: AtomicUsize,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl DayRateProvider for FailingProvider {
        async fn fetch_day(
            &self,
            ctx: &FetchContext,
            pair: &CurrencyPair,
            date: NaiveDate,
        ) -> Result<DailyRate, RateError> {
            let result = if date == self.failing {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err(RateError::NotFound {
                    code: pair.from().to_string(),
                    date,
                })
            } else {
                tokio::select! {
                    _ = ctx.canceled() => {
                        self.canceled.fetch_add(1, Ordering::SeqCst);
                        Err(RateError::Canceled)
                    }
                    _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(DailyRate { date, value: 1.0 }),
                }
            };
            self.finished.fetch_add(1, Ordering::SeqCst);
            result
        }
    }

    /// Records the peak number of concurrent calls.
    #[derive(Default)]
    struct CountingProvider {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        seen: Mutex<Vec<NaiveDate>>,
    }

    #[async_trait]
    impl DayRateProvider for CountingProvider {
        async fn fetch_day(
            &self,
            _ctx: &FetchContext,
            _pair: &CurrencyPair,
            date: NaiveDate,
        ) -> Result<DailyRate, RateError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.seen.lock().unwrap().push(date);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(DailyRate { date, value: 0.5 })
        }
    }

    /// Fails the first call it receives, later calls succeed slowly.
    #[derive(Default)]
    struct FirstCallFailsProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DayRateProvider for FirstCallFailsProvider {
        async fn fetch_day(
            &self,
            _ctx: &FetchContext,
            pair: &CurrencyPair,
            date: NaiveDate,
        ) -> Result<DailyRate, RateError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(RateError::NotFound {
                    code: pair.from().to_string(),
                    date,
                });
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(DailyRate { date, value: 1.0 })
        }
    }

    struct PanickingProvider;

    #[async_trait]
    impl DayRateProvider for PanickingProvider {
        async fn fetch_day(
            &self,
            _ctx: &FetchContext,
            _pair: &CurrencyPair,
            _date: NaiveDate,
        ) -> Result<DailyRate, RateError> {
            panic!("provider bug");
        }
    }

    #[tokio::test]
    async fn test_results_are_in_date_order() {
        for (start, end) in [
            (date(2024, 1, 1), date(2024, 1, 1)),
            (date(2024, 1, 1), date(2024, 1, 3)),
            (date(2024, 2, 20), date(2024, 3, 5)),
        ] {
            let range = DateRange::new(start, end).unwrap();
            let service = HistoryService::new(Arc::new(ReversedDelayProvider { end }))
                .with_max_concurrency(64);

            let result = service
                .fetch_range(&FetchContext::new(), &pair(), &range)
                .await
                .unwrap();

            assert_eq!(result.len(), (end - start).num_days() as usize + 1);
            for (i, rate) in result.iter().enumerate() {
                let expected = start + chrono::Duration::days(i as i64);
                assert_eq!(rate.date, expected);
                assert_eq!(rate.value, expected.day() as f64);
            }
        }
    }

    #[tokio::test]
    async fn test_first_error_cancels_siblings() {
        let provider = Arc::new(FailingProvider {
            failing: date(2024, 1, 3),
            canceled: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        });
        let service = HistoryService::new(provider.clone()).with_max_concurrency(16);
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 5)).unwrap();

        let started = std::time::Instant::now();
        let err = service
            .fetch_range(&FetchContext::new(), &pair(), &range)
            .await
            .unwrap_err();

        assert!(matches!(err, RateError::NotFound { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(provider.canceled.load(Ordering::SeqCst), 4);
        // Every launched task finished before the call returned.
        assert_eq!(provider.finished.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_queued_tasks_skip_fetch_after_failure() {
        let provider = Arc::new(FirstCallFailsProvider::default());
        let service = HistoryService::new(provider.clone()).with_max_concurrency(1);
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 10)).unwrap();

        let err = service
            .fetch_range(&FetchContext::new(), &pair(), &range)
            .await
            .unwrap_err();

        assert!(matches!(err, RateError::NotFound { .. }));
        assert!(provider.calls.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let provider = Arc::new(CountingProvider::default());
        let service = HistoryService::new(provider.clone()).with_max_concurrency(3);
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 12)).unwrap();

        let result = service
            .fetch_range(&FetchContext::new(), &pair(), &range)
            .await
            .unwrap();

        assert_eq!(result.len(), 12);
        assert!(provider.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(provider.seen.lock().unwrap().len(), 12);
    }

    #[tokio::test]
    async fn test_caller_cancellation_aborts_range() {
        let provider = Arc::new(FailingProvider {
            failing: date(1999, 1, 1),
            canceled: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        });
        let service = HistoryService::new(provider.clone());
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 3)).unwrap();

        let ctx = FetchContext::new();
        let canceler = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                ctx.cancel();
            })
        };

        let err = service.fetch_range(&ctx, &pair(), &range).await.unwrap_err();
        canceler.await.unwrap();

        assert!(err.is_canceled());
        assert_eq!(provider.canceled.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_panicking_task_is_reported() {
        let service = HistoryService::new(Arc::new(PanickingProvider));
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 2)).unwrap();

        let err = service
            .fetch_range(&FetchContext::new(), &pair(), &range)
            .await
            .unwrap_err();
        assert!(matches!(err, RateError::Task(_)));
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        let service = HistoryService::new(Arc::new(PanickingProvider)).with_max_concurrency(0);
        assert_eq!(service.max_concurrency(), 1);
    }
}
