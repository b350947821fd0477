use crate::core::rate::DATE_FORMAT;
use crate::core::{
    CurrencyPair, DailyRate, DayRateProvider, Document, DocumentFetcher, FetchContext,
    FetchRequest, RateError,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Url;
use scraper::Selector;
use std::sync::{Arc, LazyLock};
use tracing::{debug, instrument};

static RATE_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".ratesTable tbody tr td").expect("valid selector"));
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").expect("valid selector"));

/// Finds the rate for `target_code` in an x-rates historical table.
///
/// Cells are scanned in document order. A cell matches when its link points at
/// `...?from=XXX&to=<target_code>` and its text parses as a number; a cell with
/// a matching link but non-numeric text is skipped. Returns `None` when nothing
/// matches.
pub fn extract_rate(doc: &Document, target_code: &str, date: NaiveDate) -> Option<DailyRate> {
    doc.html().select(&RATE_CELL).find_map(|cell| {
        let link = cell.select(&LINK).next()?;
        let href = link.value().attr("href")?;
        if linked_currency(href) != Some(target_code) {
            return None;
        }

        let text: String = link.text().collect();
        match text.trim().parse::<f64>() {
            Ok(value) => Some(DailyRate { date, value }),
            Err(_) => {
                debug!(%href, %text, "Skipping non-numeric rate cell");
                None
            }
        }
    })
}

/// The `to` query parameter of a graph link such as `/graph/?from=JPY&to=IDR`.
fn linked_currency(href: &str) -> Option<&str> {
    let (_, query) = href.split_once('?')?;
    let query = query.split('#').next().unwrap_or(query);
    query
        .split('&')
        .find_map(|param| param.strip_prefix("to="))
}

/// Day rate provider backed by the x-rates historical page.
pub struct XRatesProvider {
    endpoint: Url,
    fetcher: Arc<dyn DocumentFetcher>,
}

impl XRatesProvider {
    pub fn new(base_url: &str, fetcher: Arc<dyn DocumentFetcher>) -> Result<Self> {
        let base = format!("{}/", base_url.trim_end_matches('/'));
        let endpoint = Url::parse(&base)
            .and_then(|url| url.join("historical/"))
            .with_context(|| format!("Invalid x-rates base url: {base_url}"))?;
        Ok(XRatesProvider { endpoint, fetcher })
    }

    /// The page is requested in the inverse direction so the table lists every
    /// currency against `pair.to()`, and the cell linking to `pair.from()` holds the rate.
    fn history_url(&self, pair: &CurrencyPair, date: NaiveDate) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("from", pair.to())
            .append_pair("amount", "1")
            .append_pair("date", &date.format(DATE_FORMAT).to_string());
        url
    }
}

#[async_trait]
impl DayRateProvider for XRatesProvider {
    #[instrument(name = "XRatesDayFetch", skip_all, fields(pair = %pair, %date))]
    async fn fetch_day(
        &self,
        ctx: &FetchContext,
        pair: &CurrencyPair,
        date: NaiveDate,
    ) -> Result<DailyRate, RateError> {
        let url = self.history_url(pair, date);
        debug!(%url, "Requesting historical rates page");

        let doc = self.fetcher.fetch(ctx, FetchRequest::get(url.as_str())).await?;

        extract_rate(&doc, pair.from(), date).ok_or_else(|| RateError::NotFound {
            code: pair.from().to_string(),
            date,
        })
    }
}
