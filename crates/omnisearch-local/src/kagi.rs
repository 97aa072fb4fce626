//! Kagi: FastGPT answers, the Universal Summarizer and the Enrichment (small web) indexes.
//!
//! Kagi authenticates with `Authorization: Bot <key>`, so every client here is built per call
//! from the validated key.

use crate::base::{ProcessingBase, ProcessingOptions, ProviderCore, SearchBase, SearchOptions};
use crate::http::HttpClient;
use futures_util::future::try_join;
use omnisearch_core::{
    AuthType, Enhancement, EnhancementProvider, EnhancementResult, ExtractDepth,
    ProcessingProvider, ProcessingResult, ProviderConfig, ProviderError, Result, SearchParams,
    SearchProvider, SearchResult, SourceRef, UrlInput,
};
use serde::Deserialize;
use std::collections::BTreeMap;

pub const DEFAULT_BASE_URL: &str = "https://kagi.com/api/v0";

pub fn default_config(api_key: impl Into<String>) -> ProviderConfig {
    ProviderConfig::new(api_key, DEFAULT_BASE_URL, AuthType::Custom)
}

fn bot_client(http: &HttpClient, api_key: &str) -> HttpClient {
    http.with_header("Authorization", &format!("Bot {api_key}"))
}

#[derive(Debug, Deserialize)]
struct FastGptResponse {
    data: FastGptData,
}

#[derive(Debug, Deserialize)]
struct FastGptData {
    output: String,
    tokens: Option<u64>,
    #[serde(default)]
    references: Vec<Reference>,
}

#[derive(Debug, Deserialize)]
struct Reference {
    title: Option<String>,
    snippet: Option<String>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct SummarizeResponse {
    data: SummarizeData,
}

#[derive(Debug, Deserialize)]
struct SummarizeData {
    output: String,
}

#[derive(Debug, Deserialize)]
struct EnrichResponse {
    #[serde(default)]
    data: Vec<EnrichItem>,
}

#[derive(Debug, Deserialize)]
struct EnrichItem {
    t: u8,
    url: Option<String>,
    title: Option<String>,
    snippet: Option<String>,
}

#[derive(Debug, Clone)]
pub struct KagiFastGptProvider {
    base: SearchBase,
}

impl KagiFastGptProvider {
    pub const NAME: &'static str = "kagi_fastgpt";

    pub fn new(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self {
            base: SearchBase::new(client, Self::NAME, config, SearchOptions::default()),
        }
    }
}

fn fastgpt_results(data: FastGptData, provider: &str) -> Vec<SearchResult> {
    let mut metadata = BTreeMap::new();
    if let Some(t) = data.tokens {
        metadata.insert("tokens".to_string(), t.into());
    }
    metadata.insert("reference_count".to_string(), data.references.len().into());
    let mut out = vec![SearchResult {
        title: "Kagi FastGPT answer".to_string(),
        url: "https://kagi.com/fastgpt".to_string(),
        snippet: data.output,
        score: Some(1.0),
        source_provider: provider.to_string(),
        metadata,
    }];
    out.extend(data.references.into_iter().map(|r| SearchResult {
        title: r.title.unwrap_or_else(|| r.url.clone()),
        url: r.url,
        snippet: r.snippet.unwrap_or_default(),
        score: None,
        source_provider: provider.to_string(),
        metadata: BTreeMap::new(),
    }));
    out
}

#[async_trait::async_trait]
impl SearchProvider for KagiFastGptProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Kagi FastGPT quick answer with references"
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<SearchResult>> {
        let v = self.base.validate_search_params(params)?;
        let http = bot_client(self.base.http(), &v.api_key);
        let body = serde_json::json!({ "query": v.query, "cache": true });
        let resp: FastGptResponse = self
            .base
            .execute_with_retry(|| http.post_json("/fastgpt", &body))
            .await?;
        if resp.data.output.trim().is_empty() {
            return Err(ProviderError::api("Empty answer from kagi_fastgpt", Self::NAME));
        }
        Ok(fastgpt_results(resp.data, Self::NAME))
    }
}

#[derive(Debug, Clone)]
pub struct KagiSummarizerProvider {
    base: ProcessingBase,
}

impl KagiSummarizerProvider {
    pub const NAME: &'static str = "kagi_summarizer";

    pub fn new(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self {
            base: ProcessingBase::new(
                client,
                Self::NAME,
                config,
                ProcessingOptions {
                    max_urls: 10,
                    ..ProcessingOptions::default()
                },
            ),
        }
    }

    /// `advanced` asks for bullet-point takeaways instead of prose.
    fn summary_type(depth: ExtractDepth) -> &'static str {
        match depth {
            ExtractDepth::Basic => "summary",
            ExtractDepth::Advanced => "takeaway",
        }
    }
}

#[async_trait::async_trait]
impl ProcessingProvider for KagiSummarizerProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Kagi Universal Summarizer for pages, PDFs and videos"
    }

    async fn process_content(
        &self,
        url: &UrlInput,
        extract_depth: Option<&str>,
    ) -> Result<ProcessingResult> {
        let (urls, depth) = self.base.validate_input(url, extract_depth)?;
        let http = bot_client(self.base.http(), &self.base.core().api_key()?);
        let http = &http;
        let summary_type = Self::summary_type(depth);
        let outcomes = self
            .base
            .process_each(&urls, |u| async move {
                let query = [
                    ("url", u.as_str()),
                    ("summary_type", summary_type),
                    ("engine", "cecil"),
                ];
                let resp: SummarizeResponse = self
                    .base
                    .execute_with_retry(|| http.get_json("/summarize", &query))
                    .await?;
                Ok(resp.data.output)
            })
            .await;
        self.base.finish_settled(outcomes, depth, None)
    }
}

#[derive(Debug, Clone)]
pub struct KagiEnrichmentProvider {
    core: ProviderCore,
}

impl KagiEnrichmentProvider {
    pub const NAME: &'static str = "kagi_enrichment";
    const MAX_QUERY_CHARS: usize = 1_000;

    pub fn new(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self {
            core: ProviderCore::new(client, Self::NAME, config),
        }
    }

    async fn enrich(&self, http: &HttpClient, index: &str, q: &str) -> Result<Vec<SourceRef>> {
        let path = format!("/enrich/{index}");
        let query = [("q", q)];
        let resp: EnrichResponse = self
            .core
            .execute_with_retry(|| http.get_json(&path, &query))
            .await?;
        Ok(resp
            .data
            .into_iter()
            .filter(|i| i.t == 0)
            .filter_map(|i| {
                let url = i.url?;
                let title = match (i.title, i.snippet) {
                    (Some(t), _) if !t.trim().is_empty() => t,
                    (_, Some(s)) if !s.trim().is_empty() => s,
                    _ => url.clone(),
                };
                Some(SourceRef { title, url })
            })
            .collect())
    }
}

fn enrichment_result(
    original: String,
    web: Vec<SourceRef>,
    news: Vec<SourceRef>,
    provider: &str,
) -> EnhancementResult {
    let mut enhanced = original.clone();
    for (heading, refs) in [("Related web results", &web), ("Related news", &news)] {
        if refs.is_empty() {
            continue;
        }
        enhanced.push_str(&format!("\n\n## {heading}\n"));
        for r in refs {
            enhanced.push_str(&format!("\n- [{}]({})", r.title, r.url));
        }
    }
    let enhancements = vec![
        Enhancement {
            kind: "web_enrichment".to_string(),
            description: format!("Added {} results from the Kagi web index", web.len()),
        },
        Enhancement {
            kind: "news_enrichment".to_string(),
            description: format!("Added {} results from the Kagi news index", news.len()),
        },
    ];
    let sources: Vec<SourceRef> = web.into_iter().chain(news).collect();
    EnhancementResult {
        original_content: original,
        enhanced_content: enhanced,
        enhancements,
        sources: (!sources.is_empty()).then_some(sources),
        source_provider: provider.to_string(),
    }
}

#[async_trait::async_trait]
impl EnhancementProvider for KagiEnrichmentProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Enrich content with non-commercial web and news results from Kagi's own indexes"
    }

    async fn enhance_content(&self, content: &str) -> Result<EnhancementResult> {
        let api_key = self.core.api_key()?;
        let q = self.core.require_text(content, "content", Self::MAX_QUERY_CHARS)?;
        let http = bot_client(self.core.http(), &api_key);
        let (web, news) =
            try_join(self.enrich(&http, "web", &q), self.enrich(&http, "news", &q)).await?;
        Ok(enrichment_result(q, web, news, Self::NAME))
    }
}
