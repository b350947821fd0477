use crate::core::{Document, DocumentFetcher, FetchContext, FetchRequest, RateError};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use std::time::Duration;
use tracing::{debug, instrument};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches pages over HTTP and parses them into [`Document`]s.
pub struct HttpDocumentFetcher {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl HttpDocumentFetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(HttpDocumentFetcher {
            client,
            default_timeout: DEFAULT_FETCH_TIMEOUT,
        })
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// The request's own timeout, else the default, capped by the context deadline.
    fn effective_timeout(
        &self,
        ctx: &FetchContext,
        request: &FetchRequest,
    ) -> Result<Duration, RateError> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        match ctx.remaining() {
            Some(remaining) if remaining.is_zero() => Err(RateError::DeadlineExceeded {
                url: request.url.clone(),
            }),
            Some(remaining) => Ok(timeout.min(remaining)),
            None => Ok(timeout),
        }
    }

    async fn execute(
        &self,
        request: FetchRequest,
        timeout: Duration,
    ) -> Result<Document, RateError> {
        let FetchRequest {
            method,
            url,
            headers,
            cookies,
            form,
            ..
        } = request;

        let mut builder = self.client.request(method, &url).timeout(timeout);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !cookies.is_empty() {
            let cookie_header = cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(COOKIE, cookie_header);
        }
        if !form.is_empty() {
            builder = builder.form(&form);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| RateError::Transport {
                url: url.clone(),
                source,
            })?;
        debug!(status = %response.status(), "Received upstream response");

        let status = response.status();
        if !status.is_success() {
            return Err(RateError::Status { url, status });
        }

        let set_cookies: Vec<(String, String)> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|source| RateError::Transport {
                url: url.clone(),
                source,
            })?;

        if body.is_empty() {
            return Err(RateError::Parse {
                url,
                reason: "empty response body".to_string(),
            });
        }
        let markup = String::from_utf8_lossy(&body);

        Ok(Document::parse(&markup).with_cookies(set_cookies))
    }
}

#[async_trait]
impl DocumentFetcher for HttpDocumentFetcher {
    #[instrument(
        name = "DocumentFetch",
        skip_all,
        fields(method = %request.method, url = %request.url)
    )]
    async fn fetch(
        &self,
        ctx: &FetchContext,
        request: FetchRequest,
    ) -> Result<Document, RateError> {
        if ctx.is_canceled() {
            return Err(RateError::Canceled);
        }
        let timeout = self.effective_timeout(ctx, &request)?;
        debug!(?timeout, "Requesting document");

        tokio::select! {
            biased;
            _ = ctx.canceled() => {
                debug!("Fetch canceled while in flight");
                Err(RateError::Canceled)
            }
            result = self.execute(request, timeout) => result,
        }
    }
}

/// Extracts `name=value` from a `Set-Cookie` header, ignoring attributes.
fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Selector;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpDocumentFetcher {
        HttpDocumentFetcher::new("fxhistory-test/1.0").unwrap()
    }

    async fn mount_page(server: &MockServer, body: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_parses_document() {
        let server = MockServer::start().await;
        mount_page(&server, "<html><body><p class='x'>hello</p></body></html>", 200).await;

        let doc = fetcher()
            .fetch(
                &FetchContext::new(),
                FetchRequest::get(format!("{}/page", server.uri())),
            )
            .await
            .unwrap();

        let selector = Selector::parse("p.x").unwrap();
        let text: String = doc.html().select(&selector).flat_map(|e| e.text()).collect();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_fetch_sends_headers_cookies_and_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(header("x-api-key", "secret"))
            .and(header("cookie", "session=abc; lang=en"))
            .and(body_string("amount=1&date=2024-01-01"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "token=xyz; Path=/; HttpOnly")
                    .set_body_string("<html></html>"),
            )
            .mount(&server)
            .await;

        let request = FetchRequest::new(reqwest::Method::POST, format!("{}/submit", server.uri()))
            .header("x-api-key", "secret")
            .cookie("session", "abc")
            .cookie("lang", "en")
            .form_field("amount", "1")
            .form_field("date", "2024-01-01");

        let doc = fetcher().fetch(&FetchContext::new(), request).await.unwrap();
        assert_eq!(
            doc.cookies(),
            &[("token".to_string(), "xyz".to_string())]
        );
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let server = MockServer::start().await;
        mount_page(&server, "oops", 503).await;

        let err = fetcher()
            .fetch(
                &FetchContext::new(),
                FetchRequest::get(format!("{}/page", server.uri())),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RateError::Status { status, .. } if status.as_u16() == 503));
    }

    #[tokio::test]
    async fn test_fetch_empty_body_is_parse_error() {
        let server = MockServer::start().await;
        mount_page(&server, "", 200).await;

        let err = fetcher()
            .fetch(
                &FetchContext::new(),
                FetchRequest::get(format!("{}/page", server.uri())),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RateError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_fetch_accepts_non_utf8_body() {
        let server = MockServer::start().await;
        let mut body = b"<html><body><p class='x'>caf".to_vec();
        body.push(0xE9);
        body.extend_from_slice(b" ok</p></body></html>");
        Mock::given(method("GET"))
            .and(path("/latin1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;

        let doc = fetcher()
            .fetch(
                &FetchContext::new(),
                FetchRequest::get(format!("{}/latin1", server.uri())),
            )
            .await
            .unwrap();

        let selector = Selector::parse("p.x").unwrap();
        let text: String = doc.html().select(&selector).flat_map(|e| e.text()).collect();
        assert!(text.starts_with("caf"));
        assert!(text.ends_with(" ok"));
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html></html>")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let request = FetchRequest::get(format!("{}/slow", server.uri()))
            .timeout(Duration::from_millis(100));
        let err = fetcher()
            .fetch(&FetchContext::new(), request)
            .await
            .unwrap_err();
        match err {
            RateError::Transport { source, .. } => assert!(source.is_timeout()),
            other => panic!("Expected transport timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_observes_cancellation_in_flight() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html></html>")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let ctx = FetchContext::new();
        let canceler = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                ctx.cancel();
            })
        };

        let started = std::time::Instant::now();
        let err = fetcher()
            .fetch(&ctx, FetchRequest::get(format!("{}/slow", server.uri())))
            .await
            .unwrap_err();
        canceler.await.unwrap();
        assert!(err.is_canceled());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_fetch_fails_fast_when_deadline_passed() {
        let ctx = FetchContext::new().with_deadline(tokio::time::Instant::now());
        let err = fetcher()
            .fetch(&ctx, FetchRequest::get("http://127.0.0.1:9/unreachable"))
            .await
            .unwrap_err();
        assert!(matches!(err, RateError::DeadlineExceeded { .. }));
    }

    #[test]
    fn test_parse_set_cookie() {
        assert_eq!(
            parse_set_cookie("a=b; Path=/"),
            Some(("a".to_string(), "b".to_string()))
        );
        assert_eq!(parse_set_cookie("novalue"), None);
        assert_eq!(parse_set_cookie("=x"), None);
    }
}
