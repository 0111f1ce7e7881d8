use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::http::HttpClient;
use super::scoring::npm_score;
use super::{SearchBackend, SearchResult};
use crate::managers::ManagerKind;

pub const NPM_REGISTRY_URL: &str = "https://registry.npmjs.org";

const PAGE_SIZE: usize = 10;

/// Queries the npm registry search endpoint
pub struct NpmBackend {
    http: Arc<dyn HttpClient>,
    base_url: String,
    request_timeout: Duration,
}

impl NpmBackend {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self::with_base_url(http, NPM_REGISTRY_URL)
    }

    pub fn with_base_url(http: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(12),
        }
    }
}

fn object_to_result(object: &Value, query: &str) -> Option<SearchResult> {
    let package = &object["package"];
    let name = package["name"].as_str().filter(|name| !name.is_empty())?;
    let final_score = object["score"]["final"].as_f64().unwrap_or(0.0);

    let mut result = SearchResult::new(
        name,
        package["description"].as_str().unwrap_or(""),
        ManagerKind::Npm,
        npm_score(final_score, name, query),
    );
    if let Some(version) = package["version"].as_str() {
        result.version = version.to_string();
    }
    result.homepage = package["links"]["homepage"]
        .as_str()
        .or_else(|| package["homepage"].as_str())
        .or_else(|| package["repository"]["url"].as_str())
        .or_else(|| package["links"]["repository"].as_str())
        .map(str::to_string);
    Some(result)
}

#[async_trait]
impl SearchBackend for NpmBackend {
    fn manager(&self) -> ManagerKind {
        ManagerKind::Npm
    }

    fn timeout(&self) -> Duration {
        self.request_timeout + Duration::from_secs(3)
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let url = format!("{}/-/v1/search", self.base_url);
        let response = self
            .http
            .get_json(
                &url,
                &[("text", query.to_string()), ("size", PAGE_SIZE.to_string())],
                self.request_timeout,
            )
            .await?;

        if !response.is_success() {
            bail!("npm registry returned HTTP {}", response.status);
        }

        Ok(response.body["objects"]
            .as_array()
            .map(|objects| {
                objects
                    .iter()
                    .filter_map(|object| object_to_result(object, query))
                    .collect()
            })
            .unwrap_or_default())
    }
}
