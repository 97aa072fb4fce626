//! Firecrawl: single-page scrape, site crawl and structured extraction.
//!
//! Crawl and extract are asynchronous upstream jobs: the submit call is retried, the status
//! polling that follows is not.

use crate::base::{ProcessingBase, ProcessingOptions};
use crate::http::ResponseBody;
use crate::polling::PollStatus;
use omnisearch_core::{
    AuthType, ExtractDepth, ProcessingMetadata, ProcessingProvider, ProcessingResult,
    ProviderConfig, ProviderError, RawContent, Result, UrlInput,
};
use serde::Deserialize;
use std::collections::BTreeMap;

pub const DEFAULT_BASE_URL: &str = "https://api.firecrawl.dev";

pub fn default_config(api_key: impl Into<String>) -> ProviderConfig {
    ProviderConfig::new(api_key, DEFAULT_BASE_URL, AuthType::Bearer)
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    success: bool,
    data: Option<ScrapeData>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    markdown: Option<String>,
    metadata: Option<PageMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageMetadata {
    title: Option<String>,
    #[serde(rename = "sourceURL")]
    source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobSubmitted {
    success: bool,
    id: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrawlStatus {
    status: String,
    #[serde(default)]
    data: Vec<ScrapeData>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractStatus {
    status: String,
    data: Option<serde_json::Value>,
    error: Option<String>,
}

fn job_status<T>(status: &str, error: Option<String>, done: impl FnOnce() -> T) -> PollStatus<T> {
    match status {
        "completed" => PollStatus::Completed(done()),
        "failed" | "cancelled" => {
            PollStatus::Failed(error.unwrap_or_else(|| format!("job {status}")))
        }
        _ => PollStatus::Processing,
    }
}

fn submitted_id(resp: JobSubmitted, provider: &str) -> Result<String> {
    match resp {
        JobSubmitted {
            success: true,
            id: Some(id),
            ..
        } if !id.trim().is_empty() => Ok(id),
        JobSubmitted { error, .. } => Err(ProviderError::provider(
            format!(
                "Failed to start job: {}",
                error.unwrap_or_else(|| "no job id returned".to_string())
            ),
            provider,
        )),
    }
}

#[derive(Debug, Clone)]
pub struct FirecrawlScrapeProvider {
    base: ProcessingBase,
}

#[derive(Debug, Clone)]
pub struct FirecrawlCrawlProvider {
    base: ProcessingBase,
}

#[derive(Debug, Clone)]
pub struct FirecrawlExtractProvider {
    base: ProcessingBase,
}

impl FirecrawlScrapeProvider {
    pub const NAME: &'static str = "firecrawl_scrape";

    pub fn new(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self::with_options(client, config, ProcessingOptions::default())
    }

    pub fn with_options(
        client: reqwest::Client,
        config: ProviderConfig,
        options: ProcessingOptions,
    ) -> Self {
        Self {
            base: ProcessingBase::new(client, Self::NAME, config, options),
        }
    }

    async fn scrape_one(
        &self,
        url: &str,
        depth: ExtractDepth,
    ) -> Result<(String, Option<String>)> {
        let body = serde_json::json!({
            "url": url,
            "formats": ["markdown"],
            "onlyMainContent": depth == ExtractDepth::Basic,
            "timeout": self.base.core().config().timeout_ms,
        });
        let parsed: ScrapeResponse = self.base.http().post_json("/v1/scrape", &body).await?;
        if !parsed.success {
            return Err(ProviderError::provider(
                format!(
                    "Scrape failed for {url}: {}",
                    parsed.error.unwrap_or_else(|| "success=false".to_string())
                ),
                Self::NAME,
            ));
        }
        let data = parsed
            .data
            .ok_or_else(|| ProviderError::api(format!("No data returned for {url}"), Self::NAME))?;
        let markdown = data.markdown.filter(|m| !m.trim().is_empty()).ok_or_else(|| {
            ProviderError::provider(format!("No content extracted from {url}"), Self::NAME)
        })?;
        Ok((markdown, data.metadata.and_then(|m| m.title)))
    }
}

#[async_trait::async_trait]
impl ProcessingProvider for FirecrawlScrapeProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Scrape one or more pages to clean markdown; failed URLs are reported, not fatal"
    }

    async fn process_content(
        &self,
        url: &UrlInput,
        extract_depth: Option<&str>,
    ) -> Result<ProcessingResult> {
        let (urls, depth) = self.base.validate_input(url, extract_depth)?;
        let outcomes = self
            .base
            .process_each(&urls, |u| async move {
                self.base
                    .execute_with_retry(|| self.scrape_one(&u, depth))
                    .await
            })
            .await;

        let mut title = None;
        let outcomes = outcomes
            .into_iter()
            .map(|(u, r)| {
                let r = r.map(|(content, t)| {
                    if title.is_none() {
                        title = t;
                    }
                    content
                });
                (u, r)
            })
            .collect();
        self.base.finish_settled(outcomes, depth, title)
    }
}

impl FirecrawlCrawlProvider {
    pub const NAME: &'static str = "firecrawl_crawl";

    pub fn new(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self::with_options(client, config, ProcessingOptions::default())
    }

    pub fn with_options(
        client: reqwest::Client,
        config: ProviderConfig,
        options: ProcessingOptions,
    ) -> Self {
        Self {
            base: ProcessingBase::new(
                client,
                Self::NAME,
                config,
                ProcessingOptions {
                    allow_multiple: false,
                    ..options
                },
            ),
        }
    }

    fn page_limit(depth: ExtractDepth) -> u32 {
        match depth {
            ExtractDepth::Basic => 10,
            ExtractDepth::Advanced => 50,
        }
    }
}

#[async_trait::async_trait]
impl ProcessingProvider for FirecrawlCrawlProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Crawl a site from a start URL and return markdown for every page found"
    }

    async fn process_content(
        &self,
        url: &UrlInput,
        extract_depth: Option<&str>,
    ) -> Result<ProcessingResult> {
        let (urls, depth) = self.base.validate_input(url, extract_depth)?;
        let start = urls[0].clone();
        let body = serde_json::json!({
            "url": start,
            "limit": Self::page_limit(depth),
            "scrapeOptions": { "formats": ["markdown"], "onlyMainContent": true },
        });
        let submitted: JobSubmitted = self
            .base
            .execute_with_retry(|| self.base.http().post_json("/v1/crawl", &body))
            .await?;
        let id = submitted_id(submitted, Self::NAME)?;
        tracing::debug!(provider = Self::NAME, job_id = %id, "crawl started");

        let pages = self
            .base
            .poll_for_completion(&format!("/v1/crawl/{id}"), |body: ResponseBody| {
                let s: CrawlStatus = body.decode(Self::NAME)?;
                Ok(job_status(&s.status, s.error, || s.data))
            })
            .await?;

        let mut title = None;
        let raw: Vec<RawContent> = pages
            .into_iter()
            .filter_map(|p| {
                let meta = p.metadata.unwrap_or_default();
                if title.is_none() {
                    title = meta.title;
                }
                let content = p.markdown.filter(|m| !m.trim().is_empty())?;
                Some(RawContent {
                    url: meta.source_url.unwrap_or_else(|| start.clone()),
                    content,
                })
            })
            .collect();
        if raw.is_empty() {
            return Err(ProviderError::provider(
                format!("Crawl of {start} returned no content"),
                Self::NAME,
            ));
        }

        // Pages are folded into one entry for the start URL; the page list goes to `extra`.
        let agg = self.base.aggregate_content(&raw);
        let page_urls: Vec<String> = raw.into_iter().map(|p| p.url).collect();
        let mut extra = BTreeMap::new();
        extra.insert("job_id".to_string(), id.into());
        extra.insert("pages_crawled".to_string(), page_urls.len().into());
        extra.insert("pages".to_string(), page_urls.into());
        let metadata = self.base.calculate_metadata(
            urls.len(),
            depth,
            ProcessingMetadata {
                title,
                word_count: Some(agg.total_word_count),
                successful_extractions: Some(1),
                extra,
                ..ProcessingMetadata::default()
            },
        );
        Ok(ProcessingResult {
            raw_contents: vec![RawContent {
                url: start,
                content: agg.content.clone(),
            }],
            content: agg.content,
            metadata,
            source_provider: Self::NAME.to_string(),
        })
    }
}

impl FirecrawlExtractProvider {
    pub const NAME: &'static str = "firecrawl_extract";
    const PROMPT: &'static str =
        "Extract the main content of these pages as structured data: title, summary, key facts.";

    pub fn new(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self::with_options(client, config, ProcessingOptions::default())
    }

    pub fn with_options(
        client: reqwest::Client,
        config: ProviderConfig,
        options: ProcessingOptions,
    ) -> Self {
        Self {
            base: ProcessingBase::new(client, Self::NAME, config, options),
        }
    }
}

#[async_trait::async_trait]
impl ProcessingProvider for FirecrawlExtractProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "LLM-backed structured extraction across one or more URLs"
    }

    async fn process_content(
        &self,
        url: &UrlInput,
        extract_depth: Option<&str>,
    ) -> Result<ProcessingResult> {
        let (urls, depth) = self.base.validate_input(url, extract_depth)?;
        let body = serde_json::json!({
            "urls": urls,
            "prompt": Self::PROMPT,
            "enableWebSearch": depth == ExtractDepth::Advanced,
        });
        let submitted: JobSubmitted = self
            .base
            .execute_with_retry(|| self.base.http().post_json("/v1/extract", &body))
            .await?;
        let id = submitted_id(submitted, Self::NAME)?;
        tracing::debug!(provider = Self::NAME, job_id = %id, "extract started");

        let data = self
            .base
            .poll_for_completion(&format!("/v1/extract/{id}"), |body: ResponseBody| {
                let s: ExtractStatus = body.decode(Self::NAME)?;
                Ok(job_status(&s.status, s.error, || s.data))
            })
            .await?
            .filter(|d| !d.is_null())
            .ok_or_else(|| ProviderError::provider("Extraction returned no data", Self::NAME))?;

        let content = serde_json::to_string_pretty(&data).map_err(|e| {
            ProviderError::provider(format!("Unserializable extraction result: {e}"), Self::NAME)
        })?;
        let word_count = crate::base::word_count(&content);
        let mut extra = BTreeMap::new();
        extra.insert("job_id".to_string(), id.into());
        extra.insert("data".to_string(), data);
        let metadata = self.base.calculate_metadata(
            urls.len(),
            depth,
            ProcessingMetadata {
                word_count: Some(word_count),
                successful_extractions: Some(1),
                extra,
                ..ProcessingMetadata::default()
            },
        );
        // One combined extraction, attributed to the first URL.
        Ok(ProcessingResult {
            raw_contents: vec![RawContent {
                url: urls[0].clone(),
                content: content.clone(),
            }],
            content,
            metadata,
            source_provider: Self::NAME.to_string(),
        })
    }
}
