use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::http::{encode_segment, HttpClient};
use super::scoring::{pypi_variation_score, pypi_variations, PYPI_EXACT, PYPI_MAX_VARIATIONS};
use super::{SearchBackend, SearchResult};
use crate::managers::ManagerKind;

pub const PYPI_BASE_URL: &str = "https://pypi.org";

/// Looks packages up by name on the PyPI JSON API
pub struct PypiBackend {
    http: Arc<dyn HttpClient>,
    base_url: String,
    exact_timeout: Duration,
    variation_timeout: Duration,
}

impl PypiBackend {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self::with_base_url(http, PYPI_BASE_URL)
    }

    pub fn with_base_url(http: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            exact_timeout: Duration::from_secs(8),
            variation_timeout: Duration::from_secs(5),
        }
    }

    async fn lookup(&self, name: &str, timeout: Duration) -> Result<Option<Value>> {
        let url = format!("{}/pypi/{}/json", self.base_url, encode_segment(name));
        let response = self.http.get_json(&url, &[], timeout).await?;
        if response.is_success() {
            Ok(Some(response.body))
        } else {
            Ok(None)
        }
    }
}

fn project_to_result(body: &Value, fallback_name: &str, score: f64) -> SearchResult {
    let info = &body["info"];
    let text = |key: &str| info[key].as_str().filter(|s| !s.is_empty());

    let mut result = SearchResult::new(
        text("name").unwrap_or(fallback_name),
        text("summary").unwrap_or(""),
        ManagerKind::Pip,
        score,
    );
    if let Some(version) = text("version") {
        result.version = version.to_string();
    }
    result.homepage = text("home_page")
        .or_else(|| text("project_url"))
        .map(str::to_string);
    result
}

#[async_trait]
impl SearchBackend for PypiBackend {
    fn manager(&self) -> ManagerKind {
        ManagerKind::Pip
    }

    fn timeout(&self) -> Duration {
        self.exact_timeout + self.variation_timeout * PYPI_MAX_VARIATIONS as u32
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        match self.lookup(query, self.exact_timeout).await {
            Ok(Some(body)) => return Ok(vec![project_to_result(&body, query, PYPI_EXACT)]),
            Ok(None) => {}
            Err(e) => debug!("PyPI exact lookup for {} failed: {:#}", query, e),
        }

        let mut results = Vec::new();
        for (index, variation) in pypi_variations(query)
            .into_iter()
            .take(PYPI_MAX_VARIATIONS)
            .enumerate()
        {
            match self.lookup(&variation, self.variation_timeout).await {
                Ok(Some(body)) => {
                    results.push(project_to_result(
                        &body,
                        &variation,
                        pypi_variation_score(index),
                    ));
                    if results.len() >= PYPI_MAX_VARIATIONS {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("PyPI lookup for {} failed: {:#}", variation, e),
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::http::HttpResponse;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakePypi {
        projects: HashMap<String, Value>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpClient for FakePypi {
        async fn get_json(
            &self,
            url: &str,
            _query: &[(&str, String)],
            _timeout: Duration,
        ) -> Result<HttpResponse> {
            self.requested.lock().unwrap().push(url.to_string());
            let name = url
                .trim_end_matches("/json")
                .rsplit('/')
                .next()
                .unwrap_or_default();
            Ok(match self.projects.get(name) {
                Some(body) => HttpResponse {
                    status: 200,
                    body: body.clone(),
                },
                None => HttpResponse {
                    status: 404,
                    body: Value::Null,
                },
            })
        }
    }

    fn fake(projects: &[(&str, Value)]) -> Arc<FakePypi> {
        Arc::new(FakePypi {
            projects: projects
                .iter()
                .map(|(name, body)| (name.to_string(), body.clone()))
                .collect(),
            requested: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_exact_match_short_circuits() {
        let http = fake(&[(
            "requests",
            serde_json::json!({"info": {
                "name": "requests",
                "summary": "Python HTTP for Humans.",
                "version": "2.31.0",
                "home_page": "https://requests.readthedocs.io"
            }}),
        )]);
        let backend = PypiBackend::with_base_url(http.clone(), "http://pypi.test");

        let results = backend.search("requests").await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].relevance_score, PYPI_EXACT);
        assert_eq!(results[0].version, "2.31.0");
        assert_eq!(
            results[0].homepage.as_deref(),
            Some("https://requests.readthedocs.io")
        );
        assert_eq!(http.requested.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_variations_are_bounded_and_scored() {
        let http = fake(&[(
            "Flask-Login",
            serde_json::json!({"info": {"name": "Flask-Login", "summary": "", "version": "0.6.3"}}),
        )]);
        let backend = PypiBackend::with_base_url(http.clone(), "http://pypi.test");

        let results = backend.search("Flask_Login").await.unwrap();

        // exact lookup plus at most three variations
        assert!(http.requested.lock().unwrap().len() <= 1 + PYPI_MAX_VARIATIONS);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Flask-Login");
        assert_eq!(results[0].relevance_score, pypi_variation_score(2));
    }

    #[tokio::test]
    async fn test_nothing_found() {
        let backend = PypiBackend::with_base_url(fake(&[]), "http://pypi.test");
        assert!(backend.search("zzzz").await.unwrap().is_empty());
    }
}
