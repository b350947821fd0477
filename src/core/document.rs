//! Document fetching abstractions

use crate::core::context::FetchContext;
use crate::core::error::RateError;
use async_trait::async_trait;
use reqwest::Method;
use scraper::Html;
use std::time::Duration;

/// Parsed markup returned by a [`DocumentFetcher`]. Read-only once built.
#[derive(Debug, Clone)]
pub struct Document {
    html: Html,
    cookies: Vec<(String, String)>,
}

impl Document {
    pub fn parse(markup: &str) -> Self {
        Document {
            html: Html::parse_document(markup),
            cookies: Vec::new(),
        }
    }

    pub fn with_cookies(mut self, cookies: Vec<(String, String)>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    /// Cookies set by the response, as `(name, value)` pairs.
    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    /// Overrides the fetcher's default per-call timeout.
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        FetchRequest {
            method,
            url: url.into(),
            headers: Vec::new(),
            cookies: Vec::new(),
            form: Vec::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((name.to_string(), value.to_string()));
        self
    }

    pub fn form_field(mut self, name: &str, value: &str) -> Self {
        self.form.push((name.to_string(), value.to_string()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(
        &self,
        ctx: &FetchContext,
        request: FetchRequest,
    ) -> Result<Document, RateError>;
}
