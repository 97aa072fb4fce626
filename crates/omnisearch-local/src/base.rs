//! Reusable skeletons for concrete providers.
//!
//! A concrete provider owns one of these and only supplies the request body and the
//! response-to-result mapping. Validation, retry, HTTP classification and polling live here.

use crate::http::{HttpClient, ResponseBody};
use crate::polling::{poll_status_url, PollStatus};
use crate::retry::{retry_with_backoff_when, RetryPolicy};
use futures_util::future::join_all;
use omnisearch_core::operators::{self, DomainFilters, ParsedQuery};
use omnisearch_core::validate::{
    self, validate_api_key, validate_limit, validate_string_array, validate_urls, ArrayPolicy,
    UrlPolicy,
};
use omnisearch_core::{
    ExtractDepth, PollingConfig, ProcessingMetadata, ProcessingResult, ProviderConfig,
    ProviderError, RawContent, Result, SearchParams, UrlInput,
};
use std::future::Future;

/// State shared by every provider: its name, immutable config, and pre-authenticated client.
#[derive(Debug, Clone)]
pub struct ProviderCore {
    name: String,
    config: ProviderConfig,
    http: HttpClient,
}

impl ProviderCore {
    /// The client does not retry on its own; `execute_with_retry` owns the retry budget so a
    /// request plus its response mapping are retried together.
    pub fn new(client: reqwest::Client, name: impl Into<String>, config: ProviderConfig) -> Self {
        let name = name.into();
        let http =
            HttpClient::for_config(client, name.clone(), &config).with_retry(RetryPolicy::none());
        Self { name, config, http }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn api_key(&self) -> Result<String> {
        validate_api_key(Some(&self.config.api_key), &self.name)
    }

    /// Trimmed, non-empty free text (enhancement input, summaries).
    pub fn require_text(&self, text: &str, field: &str, max_chars: usize) -> Result<String> {
        let t = text.trim();
        if t.is_empty() {
            return Err(ProviderError::invalid_input(
                format!("{field} must not be empty"),
                &self.name,
            ));
        }
        if t.chars().count() > max_chars {
            return Err(ProviderError::invalid_input(
                format!("{field} exceeds maximum length of {max_chars} characters"),
                &self.name,
            ));
        }
        Ok(t.to_string())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.max_retries,
            ..RetryPolicy::default()
        }
    }

    /// Retry `op` with the configured budget. Invalid input is never retried.
    pub async fn execute_with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry_with_backoff_when(op, self.retry_policy(), ProviderError::is_retryable).await
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub default_limit: u32,
    pub max_limit: u32,
    pub max_query_len: usize,
    pub max_domains: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: validate::DEFAULT_LIMIT_MAX,
            max_query_len: 2_000,
            max_domains: 50,
        }
    }
}

/// Search parameters after validation and operator parsing.
#[derive(Debug, Clone)]
pub struct ValidatedSearch {
    /// Sanitized query, operators included.
    pub query: String,
    pub parsed: ParsedQuery,
    pub limit: u32,
    pub domains: DomainFilters,
    pub api_key: String,
}

impl ValidatedSearch {
    /// Base query with exact phrases re-quoted, for engines that take domains as fields.
    pub fn base_with_phrases(&self) -> String {
        let mut q = self.parsed.base_query.clone();
        for p in &self.parsed.operators.exact_phrases {
            if !q.is_empty() {
                q.push(' ');
            }
            q.push_str(&format!("\"{p}\""));
        }
        q
    }
}

#[derive(Debug, Clone)]
pub struct SearchBase {
    core: ProviderCore,
    options: SearchOptions,
}

impl SearchBase {
    pub fn new(
        client: reqwest::Client,
        name: impl Into<String>,
        config: ProviderConfig,
        options: SearchOptions,
    ) -> Self {
        Self {
            core: ProviderCore::new(client, name, config),
            options,
        }
    }

    pub fn core(&self) -> &ProviderCore {
        &self.core
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn http(&self) -> &HttpClient {
        self.core.http()
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    pub fn validate_search_params(&self, params: &SearchParams) -> Result<ValidatedSearch> {
        let name = self.core.name();
        let api_key = self.core.api_key()?;
        let query = validate::sanitize_query(&params.query);
        if query.is_empty() {
            return Err(ProviderError::invalid_input("Query must not be empty", name));
        }
        if query.chars().count() > self.options.max_query_len {
            return Err(ProviderError::invalid_input(
                format!(
                    "Query exceeds maximum length of {} characters",
                    self.options.max_query_len
                ),
                name,
            ));
        }
        let limit = validate_limit(
            params.limit.map(f64::from),
            validate::DEFAULT_LIMIT_MIN,
            self.options.max_limit,
            "limit",
            name,
        )?
        .unwrap_or(self.options.default_limit.min(self.options.max_limit));

        let domain_policy = ArrayPolicy {
            max_items: Some(self.options.max_domains),
            max_item_len: Some(253),
            ..ArrayPolicy::default()
        };
        let include = validate_string_array(
            params.include_domains.clone(),
            &domain_policy,
            "include_domains",
            name,
        )?;
        let exclude = validate_string_array(
            params.exclude_domains.clone(),
            &domain_policy,
            "exclude_domains",
            name,
        )?;

        let parsed = self.parse_query_operators(&query);
        let domains = self.build_domain_filters(include.as_deref(), exclude.as_deref(), &parsed);
        Ok(ValidatedSearch {
            query,
            parsed,
            limit,
            domains,
            api_key,
        })
    }

    pub fn parse_query_operators(&self, query: &str) -> ParsedQuery {
        operators::parse_query_operators(query)
    }

    pub fn build_domain_filters(
        &self,
        include: Option<&[String]>,
        exclude: Option<&[String]>,
        parsed: &ParsedQuery,
    ) -> DomainFilters {
        operators::build_domain_filters(include, exclude, &parsed.operators)
    }

    pub async fn execute_with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.core.execute_with_retry(op).await
    }
}

#[derive(Debug, Clone)]
pub struct ProcessingOptions {
    pub allow_multiple: bool,
    pub max_urls: usize,
    pub url_policy: UrlPolicy,
    pub poll_max_attempts: u32,
    pub poll_interval_ms: u64,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            allow_multiple: true,
            max_urls: 20,
            url_policy: UrlPolicy::default(),
            poll_max_attempts: 30,
            poll_interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregated {
    pub content: String,
    pub raw_contents: Vec<RawContent>,
    pub total_word_count: usize,
}

pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

#[derive(Debug, Clone)]
pub struct ProcessingBase {
    core: ProviderCore,
    options: ProcessingOptions,
}

impl ProcessingBase {
    pub fn new(
        client: reqwest::Client,
        name: impl Into<String>,
        config: ProviderConfig,
        options: ProcessingOptions,
    ) -> Self {
        Self {
            core: ProviderCore::new(client, name, config),
            options,
        }
    }

    pub fn core(&self) -> &ProviderCore {
        &self.core
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn http(&self) -> &HttpClient {
        self.core.http()
    }

    pub fn options(&self) -> &ProcessingOptions {
        &self.options
    }

    /// Normalize to a URL list and enforce the URL policy; depth defaults to `basic`.
    pub fn validate_input(
        &self,
        input: &UrlInput,
        extract_depth: Option<&str>,
    ) -> Result<(Vec<String>, ExtractDepth)> {
        let name = self.core.name();
        self.core.api_key()?;
        let urls: Vec<String> = input.to_vec().into_iter().map(|u| u.trim().to_string()).collect();
        if urls.is_empty() {
            return Err(ProviderError::invalid_input("At least one URL is required", name));
        }
        if urls.len() > 1 && !self.options.allow_multiple {
            return Err(ProviderError::invalid_input(
                format!("{name} accepts a single URL per request"),
                name,
            ));
        }
        if urls.len() > self.options.max_urls {
            return Err(ProviderError::invalid_input(
                format!("Too many URLs: {} (maximum {})", urls.len(), self.options.max_urls),
                name,
            ));
        }
        let v = validate_urls(&urls, &self.options.url_policy);
        if !v.valid {
            return Err(ProviderError::invalid_input(
                format!("Invalid URL input: {}", v.errors.join("; ")),
                name,
            ));
        }
        let depth = validate::validate_enum(
            extract_depth,
            &ExtractDepth::ALLOWED,
            false,
            "extract_depth",
            name,
        )?
        .and_then(ExtractDepth::parse)
        .unwrap_or_default();
        Ok((urls, depth))
    }

    /// Join per-URL contents (with `---` separators when there is more than one).
    pub fn aggregate_content(&self, pages: &[RawContent]) -> Aggregated {
        let content = pages
            .iter()
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");
        Aggregated {
            content,
            raw_contents: pages.to_vec(),
            total_word_count: pages.iter().map(|p| word_count(&p.content)).sum(),
        }
    }

    /// Failure-tolerant aggregation: successes are kept in input order, failures listed.
    pub fn aggregate_settled(
        &self,
        outcomes: Vec<(String, Result<String>)>,
    ) -> (Aggregated, Vec<String>) {
        let mut pages = Vec::new();
        let mut failed = Vec::new();
        for (url, outcome) in outcomes {
            match outcome {
                Ok(content) => pages.push(RawContent { url, content }),
                Err(e) => {
                    tracing::debug!(
                        provider = self.core.name(),
                        url = %url,
                        error = %e,
                        "url failed"
                    );
                    failed.push(url);
                }
            }
        }
        (self.aggregate_content(&pages), failed)
    }

    pub fn calculate_metadata(
        &self,
        urls_processed: usize,
        extract_depth: ExtractDepth,
        additional: ProcessingMetadata,
    ) -> ProcessingMetadata {
        ProcessingMetadata {
            urls_processed: Some(urls_processed),
            extract_depth,
            processed_at: Some(chrono::Utc::now().to_rfc3339()),
            ..additional
        }
    }

    /// Run `fetch` for every URL concurrently; results come back in input order.
    pub async fn process_each<T, F, Fut>(
        &self,
        urls: &[String],
        fetch: F,
    ) -> Vec<(String, Result<T>)>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outs = join_all(urls.iter().map(|u| fetch(u.clone()))).await;
        urls.iter().cloned().zip(outs).collect()
    }

    /// Build a result from per-URL outcomes; fails only when every URL failed.
    pub fn finish_settled(
        &self,
        outcomes: Vec<(String, Result<String>)>,
        extract_depth: ExtractDepth,
        title: Option<String>,
    ) -> Result<ProcessingResult> {
        let urls_processed = outcomes.len();
        let last_error = outcomes
            .iter()
            .rev()
            .find_map(|(_, r)| r.as_ref().err().cloned());
        let (agg, failed_urls) = self.aggregate_settled(outcomes);
        if agg.raw_contents.is_empty() {
            let detail = last_error.map(|e| e.message).unwrap_or_default();
            return Err(ProviderError::provider(
                format!("Failed to extract content from all URLs: {detail}"),
                self.core.name(),
            ));
        }
        let metadata = self.calculate_metadata(
            urls_processed,
            extract_depth,
            ProcessingMetadata {
                title,
                word_count: Some(agg.total_word_count),
                successful_extractions: Some(agg.raw_contents.len()),
                failed_urls: (!failed_urls.is_empty()).then_some(failed_urls),
                ..ProcessingMetadata::default()
            },
        );
        Ok(ProcessingResult {
            content: agg.content,
            raw_contents: agg.raw_contents,
            metadata,
            source_provider: self.core.name().to_string(),
        })
    }

    /// Poll an async job at `status_url` with this provider's credentials and budget.
    pub async fn poll_for_completion<T, I>(&self, status_url: &str, interpret: I) -> Result<T>
    where
        I: Fn(ResponseBody) -> Result<PollStatus<T>>,
    {
        let config = PollingConfig {
            provider_name: self.core.name().to_string(),
            status_url: self.core.http().resolve(status_url),
            api_key: self.core.api_key()?,
            max_attempts: self.options.poll_max_attempts,
            poll_interval_ms: self.options.poll_interval_ms,
            timeout_ms: self.core.config().timeout_ms,
        };
        poll_status_url(self.core.http(), &config, interpret).await
    }

    pub async fn execute_with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.core.execute_with_retry(op).await
    }
}
