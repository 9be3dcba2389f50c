//! Live registry feed over HTTP.
//!
//! Blocking reqwest client (no Tokio runtime required). Each call to
//! `fetch_records` is one GET with bounded retry on 429 / 5xx / transport
//! errors.

use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use roadsigns_recon::{FetchError, SourceAdapter, SourceId, SourceRecord};

use crate::wire::parse_payload;

pub const USER_AGENT: &str = concat!("rsign/", env!("CARGO_PKG_VERSION"));
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// One registry endpoint.
#[derive(Clone)]
pub struct HttpFeed {
    http: reqwest::blocking::Client,
    source: SourceId,
    url: String,
    max_retries: u32,
    backoff: Duration,
}

impl HttpFeed {
    /// `api_base` and `path` are joined with exactly one slash between them.
    pub fn new(
        source: SourceId,
        api_base: &str,
        path: &str,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Unreachable(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            source,
            url: join_url(api_base, path),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Retry budget for 429 / 5xx / transport failures. Backoff doubles per attempt.
    pub fn with_retry(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn get_json(&self) -> Result<Value, FetchError> {
        let mut backoff = self.backoff;
        let mut attempt = 0;

        loop {
            let retry_reason = match self.http.get(&self.url).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if status == 429 || status >= 500 {
                        let message = error_message(resp);
                        if attempt == self.max_retries {
                            return Err(FetchError::Http { status, message });
                        }
                        format!("HTTP {status}")
                    } else if !(200..300).contains(&status) {
                        return Err(FetchError::Http {
                            status,
                            message: error_message(resp),
                        });
                    } else {
                        return read_json(resp);
                    }
                }
                Err(e) => {
                    if attempt == self.max_retries {
                        return Err(FetchError::Unreachable(e.to_string()));
                    }
                    e.to_string()
                }
            };

            attempt += 1;
            log::warn!(
                "{} feed: retry {}/{} in {:?} ({})",
                self.source,
                attempt,
                self.max_retries,
                backoff,
                retry_reason
            );
            thread::sleep(backoff);
            backoff *= 2;
        }
    }
}

impl SourceAdapter for HttpFeed {
    fn source(&self) -> SourceId {
        self.source
    }

    fn fetch_records(&self) -> Result<Vec<SourceRecord>, FetchError> {
        log::debug!("GET {}", self.url);
        let fetched_at = Utc::now();
        let body = self.get_json()?;
        parse_payload(self.source, &body, fetched_at)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn read_json(resp: reqwest::blocking::Response) -> Result<Value, FetchError> {
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !content_type.contains("application/json") {
        let shown: &str = if content_type.is_empty() {
            "unknown"
        } else {
            &content_type
        };
        return Err(FetchError::Malformed(format!(
            "expected a JSON response, got content type {shown}"
        )));
    }

    let text = resp
        .text()
        .map_err(|e| FetchError::Unreachable(format!("failed to read response body: {e}")))?;
    let trimmed = text.trim_start_matches('\u{feff}');
    serde_json::from_str(trimmed).map_err(|e| {
        FetchError::Malformed(format!(
            "{e} (body: {})",
            trimmed.chars().take(200).collect::<String>()
        ))
    })
}

/// Prefer the server's `detail` / `error` field, fall back to the body text.
fn error_message(resp: reqwest::blocking::Response) -> String {
    let reason = resp
        .status()
        .canonical_reason()
        .unwrap_or("error")
        .to_string();
    let text = resp.text().unwrap_or_default();
    let from_json = serde_json::from_str::<Value>(&text).ok().and_then(|v| {
        ["detail", "error", "message"]
            .iter()
            .find_map(|k| v.get(*k)?.as_str().map(String::from))
    });
    match from_json {
        Some(msg) => msg,
        None if text.trim().is_empty() => reason,
        None => text.chars().take(200).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn feed(server: &MockServer, source: SourceId, path: &str) -> HttpFeed {
        HttpFeed::new(source, &server.base_url(), path, Duration::from_secs(5))
            .unwrap()
            .with_retry(1, Duration::from_millis(1))
    }

    #[test]
    fn joins_base_and_path() {
        assert_eq!(join_url("http://h/api/", "/authority-signs/"), "http://h/api/authority-signs/");
        assert_eq!(join_url("http://h/api", "x"), "http://h/api/x");
    }

    #[test]
    fn fetches_and_decodes() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/authority-signs/");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    json!([
                        {"gibdd_unical_id": "G1", "name": "Stop", "latitude": "55.75", "longitude": "37.61"},
                        {"gibdd_unical_id": "G2", "name": "Yield", "latitude": 55.76, "longitude": 37.62}
                    ])
                    .to_string(),
                );
        });

        let recs = feed(&server, SourceId::Authority, "/authority-signs/")
            .fetch_records()
            .unwrap();
        mock.assert();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[1].external_id.as_deref(), Some("G2"));
        assert!(recs.iter().all(|r| r.source == SourceId::Authority));
    }

    #[test]
    fn not_found_fails_without_retry() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/commercial-signs/");
            then.status(404)
                .header("content-type", "application/json")
                .body(r#"{"detail": "Not found."}"#);
        });

        let err = feed(&server, SourceId::Commercial, "/commercial-signs/")
            .fetch_records()
            .unwrap_err();
        mock.assert_hits(1);
        assert_eq!(
            err,
            FetchError::Http {
                status: 404,
                message: "Not found.".into()
            }
        );
    }

    #[test]
    fn server_errors_are_retried_then_reported() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/commercial-signs/");
            then.status(503);
        });

        let err = feed(&server, SourceId::Commercial, "/commercial-signs/")
            .fetch_records()
            .unwrap_err();
        mock.assert_hits(2);
        assert!(matches!(err, FetchError::Http { status: 503, .. }));
    }

    #[test]
    fn html_response_is_malformed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/authority-signs/");
            then.status(200)
                .header("content-type", "text/html")
                .body("<html>login</html>");
        });

        let err = feed(&server, SourceId::Authority, "/authority-signs/")
            .fetch_records()
            .unwrap_err();
        assert_eq!(
            err,
            FetchError::Malformed("expected a JSON response, got content type text/html".into())
        );
    }

    #[test]
    fn closed_port_is_unreachable() {
        let feed = HttpFeed::new(
            SourceId::Authority,
            "http://127.0.0.1:1",
            "/authority-signs/",
            Duration::from_secs(2),
        )
        .unwrap()
        .with_retry(0, Duration::from_millis(1));
        assert!(matches!(feed.fetch_records(), Err(FetchError::Unreachable(_))));
    }
}
