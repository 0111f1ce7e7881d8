//! Pooled HTTP GET capability used by the registry backends

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::HttpConfig;
use crate::error::CrossfireError;

/// Status codes worth another try
const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Response of a JSON GET. `body` is `Null` unless the status was 2xx.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET `url` with query parameters, bounded by `timeout` per request
    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<HttpResponse>;
}

/// Shared `reqwest` client with bounded retries
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    retries: u32,
    backoff: Duration,
}

impl ReqwestHttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            retries: config.retries,
            backoff: Duration::from_millis(config.backoff_ms),
        })
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff * 2u32.saturating_pow(attempt)
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<HttpResponse> {
        let mut attempt = 0;

        loop {
            let sent = self
                .client
                .get(url)
                .query(query)
                .header(ACCEPT, "application/json")
                .timeout(timeout)
                .send()
                .await;

            match sent {
                Ok(response) => {
                    let status = response.status();
                    if RETRY_STATUSES.contains(&status.as_u16()) && attempt < self.retries {
                        debug!("GET {} returned {}, retrying", url, status);
                        tokio::time::sleep(self.backoff_for(attempt)).await;
                        attempt += 1;
                        continue;
                    }

                    if !status.is_success() {
                        return Ok(HttpResponse {
                            status: status.as_u16(),
                            body: Value::Null,
                        });
                    }

                    let body = if status == StatusCode::NO_CONTENT {
                        Value::Null
                    } else {
                        response
                            .json::<Value>()
                            .await
                            .with_context(|| format!("Invalid JSON from {url}"))?
                    };

                    return Ok(HttpResponse {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) if attempt < self.retries && (e.is_timeout() || e.is_connect()) => {
                    debug!("GET {} failed ({}), retrying", url, e);
                    tokio::time::sleep(self.backoff_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(CrossfireError::Http {
                        url: url.to_string(),
                        message: e.to_string(),
                    }
                    .into());
                }
            }
        }
    }
}

/// Percent-encode one URL path segment
pub fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn client(retries: u32) -> ReqwestHttpClient {
        let config = HttpConfig {
            retries,
            backoff_ms: 1,
            ..HttpConfig::default()
        };
        ReqwestHttpClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_get_json_success_with_query() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/-/v1/search")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("text".into(), "left pad".into()),
                mockito::Matcher::UrlEncoded("size".into(), "10".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"objects": []}"#)
            .create_async()
            .await;

        let response = client(0)
            .get_json(
                &format!("{}/-/v1/search", server.url()),
                &[("text", "left pad".to_string()), ("size", "10".to_string())],
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(response.is_success());
        assert_eq!(response.body["objects"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_not_found_is_not_an_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/pypi/nope/json")
            .with_status(404)
            .create_async()
            .await;

        let response = client(3)
            .get_json(
                &format!("{}/pypi/nope/json", server.url()),
                &[],
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(response.body, Value::Null);
    }

    #[tokio::test]
    async fn test_retries_on_unavailable() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let response = client(2)
            .get_json(
                &format!("{}/flaky", server.url()),
                &[],
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 503);
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("@types/node"), "%40types%2Fnode");
        assert_eq!(encode_segment("requests"), "requests");
    }
}
