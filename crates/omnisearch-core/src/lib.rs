use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub mod error;
pub mod operators;
pub mod validate;

pub use error::{ErrorKind, ProviderError, Result};

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// How a provider's API key is attached to outgoing requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum AuthType {
    /// `Authorization: Bearer <key>`.
    Bearer,
    /// `<header>: <key>`.
    ApiKey { header: String },
    /// The provider places the key itself (odd schemes, query params, body fields).
    Custom,
}

/// Per-provider connection settings, resolved once at startup and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub auth_type: AuthType,
    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,
}

impl ProviderConfig {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        auth_type: AuthType,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            auth_type,
            custom_headers: BTreeMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Join a path onto `base_url` without doubling slashes.
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        }
    }
}

/// Settings for one polling invocation against an async upstream job.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub provider_name: String,
    pub status_url: String,
    pub api_key: String,
    pub max_attempts: u32,
    pub poll_interval_ms: u64,
    /// Timeout for each individual status request.
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub query: String,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub include_domains: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_domains: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub source_provider: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractDepth {
    #[default]
    Basic,
    Advanced,
}

impl ExtractDepth {
    pub const ALLOWED: [&'static str; 2] = ["basic", "advanced"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Advanced => "advanced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "basic" => Some(Self::Basic),
            "advanced" => Some(Self::Advanced),
            _ => None,
        }
    }
}

/// A single URL or a batch, as accepted by processing tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlInput {
    One(String),
    Many(Vec<String>),
}

impl UrlInput {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(u) => vec![u.clone()],
            Self::Many(us) => us.clone(),
        }
    }

    pub fn is_many(&self) -> bool {
        matches!(self, Self::Many(_))
    }
}

impl From<&str> for UrlInput {
    fn from(s: &str) -> Self {
        Self::One(s.to_string())
    }
}

impl From<Vec<String>> for UrlInput {
    fn from(v: Vec<String>) -> Self {
        Self::Many(v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawContent {
    pub url: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls_processed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful_extractions: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_urls: Option<Vec<String>>,
    pub extract_depth: ExtractDepth,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
    /// Provider-specific additions (job ids, credits used, ...).
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub content: String,
    pub raw_contents: Vec<RawContent>,
    pub metadata: ProcessingMetadata,
    pub source_provider: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enhancement {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementResult {
    pub original_content: String,
    pub enhanced_content: String,
    pub enhancements: Vec<Enhancement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceRef>>,
    pub source_provider: String,
}

/// Web search and AI-answer engines.
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn search(&self, params: &SearchParams) -> Result<Vec<SearchResult>>;
}

/// Scraping, crawling, extraction and summarization services.
#[async_trait::async_trait]
pub trait ProcessingProvider: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn process_content(
        &self,
        input: &UrlInput,
        extract_depth: Option<&str>,
    ) -> Result<ProcessingResult>;
}

/// Fact checking and enrichment services.
#[async_trait::async_trait]
pub trait EnhancementProvider: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn enhance_content(&self, content: &str) -> Result<EnhancementResult>;
}
