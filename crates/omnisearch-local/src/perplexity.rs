use crate::base::{SearchBase, SearchOptions};
use omnisearch_core::{
    AuthType, ProviderConfig, ProviderError, Result, SearchParams, SearchProvider, SearchResult,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_MODEL: &str = "sonar";

/// AI answer engine: one synthesized answer followed by its citations.
#[derive(Debug, Clone)]
pub struct PerplexitySearchProvider {
    base: SearchBase,
    model: String,
}

impl PerplexitySearchProvider {
    pub const NAME: &'static str = "perplexity";
    pub const DEFAULT_BASE_URL: &'static str = "https://api.perplexity.ai";

    pub fn default_config(api_key: impl Into<String>) -> ProviderConfig {
        ProviderConfig::new(api_key, Self::DEFAULT_BASE_URL, AuthType::Bearer)
    }

    pub fn new(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self {
            base: SearchBase::new(client, Self::NAME, config, SearchOptions::default()),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn request(&self, query: &str) -> ChatCompletionsRequest {
        ChatCompletionsRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: "Be precise and concise. Cite sources.".to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: query.to_string(),
                },
            ],
            max_tokens: Some(1024),
            temperature: Some(0.2),
            search_domain_filter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionsRequest {
    pub model: String,
    pub messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Allow-list entries as `domain`, deny-list entries as `-domain`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_domain_filter: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionsResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub citations: Option<Vec<String>>,
    #[serde(default)]
    pub usage: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub index: Option<u64>,
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    pub role: String,
    pub content: String,
}

fn to_results(resp: ChatCompletionsResponse, provider: &str) -> Result<Vec<SearchResult>> {
    let answer = resp
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ProviderError::api("Empty answer from perplexity", provider))?;

    let mut metadata = BTreeMap::new();
    if let Some(m) = resp.model {
        metadata.insert("model".to_string(), m.into());
    }
    if let Some(u) = resp.usage {
        metadata.insert("usage".to_string(), u);
    }
    let citations = resp.citations.unwrap_or_default();
    metadata.insert("citation_count".to_string(), citations.len().into());

    let mut out = vec![SearchResult {
        title: "Perplexity AI answer".to_string(),
        url: "https://perplexity.ai".to_string(),
        snippet: answer,
        score: Some(1.0),
        source_provider: provider.to_string(),
        metadata,
    }];
    out.extend(citations.into_iter().enumerate().map(|(i, url)| SearchResult {
        title: format!("Citation [{}]", i + 1),
        url,
        snippet: String::new(),
        score: None,
        source_provider: provider.to_string(),
        metadata: BTreeMap::new(),
    }));
    Ok(out)
}

#[async_trait::async_trait]
impl SearchProvider for PerplexitySearchProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Perplexity AI answer with cited sources"
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<SearchResult>> {
        let v = self.base.validate_search_params(params)?;
        let question = v.base_with_phrases();
        if question.trim().is_empty() {
            return Err(ProviderError::invalid_input(
                "Query must contain search terms besides operators",
                Self::NAME,
            ));
        }
        let mut req = self.request(&question);
        let filter: Vec<String> = v
            .domains
            .include
            .iter()
            .cloned()
            .chain(v.domains.exclude.iter().map(|d| format!("-{d}")))
            .collect();
        if !filter.is_empty() {
            req.search_domain_filter = Some(filter);
        }

        let resp: ChatCompletionsResponse = self
            .base
            .execute_with_retry(|| self.base.http().post_json("/chat/completions", &req))
            .await?;
        to_results(resp, Self::NAME)
    }
}
