//! Tavily Extract: batch page extraction with per-URL partial failures.

use crate::base::{ProcessingBase, ProcessingOptions};
use omnisearch_core::{
    AuthType, ProcessingProvider, ProcessingResult, ProviderConfig, ProviderError, Result,
    UrlInput,
};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    results: Vec<Extracted>,
    #[serde(default)]
    failed_results: Vec<FailedExtraction>,
}

#[derive(Debug, Deserialize)]
struct Extracted {
    url: String,
    #[serde(default)]
    raw_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FailedExtraction {
    url: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TavilyExtractProvider {
    base: ProcessingBase,
}

impl TavilyExtractProvider {
    pub const NAME: &'static str = "tavily_extract";
    pub const DEFAULT_BASE_URL: &'static str = "https://api.tavily.com";

    pub fn default_config(api_key: impl Into<String>) -> ProviderConfig {
        ProviderConfig::new(api_key, Self::DEFAULT_BASE_URL, AuthType::Bearer)
    }

    pub fn new(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self {
            base: ProcessingBase::new(client, Self::NAME, config, ProcessingOptions::default()),
        }
    }
}

fn normalize(url: &str) -> String {
    url.trim().trim_end_matches('/').to_ascii_lowercase()
}

/// Pair each requested URL with its upstream outcome, preserving request order.
fn settle(urls: &[String], resp: ExtractResponse, provider: &str) -> Vec<(String, Result<String>)> {
    let mut ok: HashMap<String, String> = HashMap::new();
    for r in resp.results {
        if let Some(c) = r.raw_content.filter(|c| !c.trim().is_empty()) {
            ok.entry(normalize(&r.url)).or_insert(c);
        }
    }
    let failed: HashMap<String, Option<String>> = resp
        .failed_results
        .into_iter()
        .map(|f| (normalize(&f.url), f.error))
        .collect();

    urls.iter()
        .map(|u| {
            let key = normalize(u);
            let outcome = match ok.remove(&key) {
                Some(c) => Ok(c),
                None => {
                    let why = failed
                        .get(&key)
                        .cloned()
                        .flatten()
                        .unwrap_or_else(|| "no content returned".to_string());
                    Err(ProviderError::provider(format!("{u}: {why}"), provider))
                }
            };
            (u.clone(), outcome)
        })
        .collect()
}

#[async_trait::async_trait]
impl ProcessingProvider for TavilyExtractProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Tavily Extract: raw page content for up to 20 URLs in one call"
    }

    async fn process_content(
        &self,
        url: &UrlInput,
        extract_depth: Option<&str>,
    ) -> Result<ProcessingResult> {
        let (urls, depth) = self.base.validate_input(url, extract_depth)?;
        let body = serde_json::json!({
            "urls": urls,
            "extract_depth": depth.as_str(),
            "include_images": false,
        });
        let resp: ExtractResponse = self
            .base
            .execute_with_retry(|| self.base.http().post_json("/extract", &body))
            .await?;
        self.base.finish_settled(settle(&urls, resp, Self::NAME), depth, None)
    }
}
