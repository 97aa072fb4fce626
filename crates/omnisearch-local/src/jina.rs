//! Jina AI: the Reader (URL → markdown) and Grounding (fact check) endpoints.

use crate::base::{ProcessingBase, ProcessingOptions, ProviderCore};
use omnisearch_core::{
    AuthType, Enhancement, EnhancementProvider, EnhancementResult, ExtractDepth,
    ProcessingProvider, ProcessingResult, ProviderConfig, ProviderError, Result, SourceRef,
    UrlInput,
};
use serde::Deserialize;

pub const READER_BASE_URL: &str = "https://r.jina.ai";
pub const GROUNDING_BASE_URL: &str = "https://g.jina.ai";

#[derive(Debug, Deserialize)]
struct ReaderResponse {
    data: Option<ReaderData>,
}

#[derive(Debug, Deserialize)]
struct ReaderData {
    title: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroundingResponse {
    data: GroundingData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingData {
    factuality: Option<f64>,
    result: Option<bool>,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    references: Vec<GroundingReference>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingReference {
    url: String,
    key_quote: Option<String>,
    is_supportive: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct JinaReaderProvider {
    base: ProcessingBase,
}

impl JinaReaderProvider {
    pub const NAME: &'static str = "jina_reader";

    pub fn default_config(api_key: impl Into<String>) -> ProviderConfig {
        ProviderConfig::new(api_key, READER_BASE_URL, AuthType::Bearer)
    }

    pub fn new(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self {
            base: ProcessingBase::new(client, Self::NAME, config, ProcessingOptions::default()),
        }
    }

    async fn read_one(&self, url: &str, depth: ExtractDepth) -> Result<(String, Option<String>)> {
        let mut http = self
            .base
            .http()
            .with_header("Accept", "application/json")
            .with_header("X-Return-Format", "markdown");
        if depth == ExtractDepth::Advanced {
            http = http.with_header("X-Engine", "browser");
        }
        let resp: ReaderResponse = http
            .post_json("/", &serde_json::json!({ "url": url }))
            .await?;
        let data = resp
            .data
            .ok_or_else(|| ProviderError::api(format!("No data returned for {url}"), Self::NAME))?;
        let content = data.content.filter(|c| !c.trim().is_empty()).ok_or_else(|| {
            ProviderError::provider(format!("No content extracted from {url}"), Self::NAME)
        })?;
        Ok((content, data.title))
    }
}

#[async_trait::async_trait]
impl ProcessingProvider for JinaReaderProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Jina Reader: clean, LLM-friendly markdown for each URL"
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
                    .execute_with_retry(|| self.read_one(&u, depth))
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

#[derive(Debug, Clone)]
pub struct JinaGroundingProvider {
    core: ProviderCore,
}

impl JinaGroundingProvider {
    pub const NAME: &'static str = "jina_grounding";
    const MAX_STATEMENT_CHARS: usize = 4_000;

    pub fn default_config(api_key: impl Into<String>) -> ProviderConfig {
        ProviderConfig::new(api_key, GROUNDING_BASE_URL, AuthType::Bearer)
    }

    pub fn new(client: reqwest::Client, mut config: ProviderConfig) -> Self {
        // Grounding runs its own web search upstream before answering.
        config.timeout_ms = config.timeout_ms.max(60_000);
        Self {
            core: ProviderCore::new(client, Self::NAME, config),
        }
    }
}

fn grounding_result(statement: String, data: GroundingData, provider: &str) -> EnhancementResult {
    let verdict = match data.result {
        Some(true) => "supported",
        Some(false) => "not supported",
        None => "inconclusive",
    };
    let score = data
        .factuality
        .map(|f| format!("{f:.2}"))
        .unwrap_or_else(|| "n/a".to_string());

    let mut enhanced =
        format!("{statement}\n\n## Fact check\n\nVerdict: {verdict} (factuality {score})");
    if !data.reason.trim().is_empty() {
        enhanced.push_str(&format!("\n\n{}", data.reason.trim()));
    }

    let mut enhancements = vec![Enhancement {
        kind: "fact_check".to_string(),
        description: format!("Statement {verdict}; factuality score {score}"),
    }];
    let supporting = data
        .references
        .iter()
        .filter(|r| r.is_supportive == Some(true))
        .count();
    if !data.references.is_empty() {
        enhancements.push(Enhancement {
            kind: "references".to_string(),
            description: format!(
                "{} references checked, {supporting} supportive",
                data.references.len()
            ),
        });
    }

    let sources: Vec<SourceRef> = data
        .references
        .into_iter()
        .map(|r| SourceRef {
            title: r
                .key_quote
                .filter(|q| !q.trim().is_empty())
                .unwrap_or_else(|| r.url.clone()),
            url: r.url,
        })
        .collect();

    EnhancementResult {
        original_content: statement,
        enhanced_content: enhanced,
        enhancements,
        sources: (!sources.is_empty()).then_some(sources),
        source_provider: provider.to_string(),
    }
}

#[async_trait::async_trait]
impl EnhancementProvider for JinaGroundingProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Jina Grounding: fact-check a statement against live web sources"
    }

    async fn enhance_content(&self, content: &str) -> Result<EnhancementResult> {
        self.core.api_key()?;
        let statement = self
            .core
            .require_text(content, "content", Self::MAX_STATEMENT_CHARS)?;
        let http = self.core.http().with_header("Accept", "application/json");
        let body = serde_json::json!({ "statement": statement });
        let resp: GroundingResponse = self
            .core
            .execute_with_retry(|| http.post_json("/", &body))
            .await?;
        Ok(grounding_result(statement, resp.data, Self::NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reader_shape() {
        let resp: ReaderResponse = serde_json::from_value(serde_json::json!({
            "code": 200,
            "status": 20000,
            "data": {"title": "Example", "url": "https://a.test", "content": "# Example"}
        }))
        .unwrap();
        let d = resp.data.unwrap();
        assert_eq!(d.title.as_deref(), Some("Example"));
        assert_eq!(d.content.as_deref(), Some("# Example"));
    }

    #[test]
    fn grounding_result_reports_verdict_and_sources() {
        let data: GroundingData = serde_json::from_value(serde_json::json!({
            "factuality": 0.92,
            "result": true,
            "reason": "Multiple sources agree.",
            "references": [
                {"url": "https://a.test", "keyQuote": "water boils at 100C", "isSupportive": true},
                {"url": "https://b.test", "isSupportive": false}
            ]
        }))
        .unwrap();
        let r = grounding_result(
            "Water boils at 100C at sea level".to_string(),
            data,
            JinaGroundingProvider::NAME,
        );
        assert!(r.enhanced_content.contains("Verdict: supported (factuality 0.92)"));
        assert_eq!(r.enhancements[0].kind, "fact_check");
        assert!(r.enhancements[1].description.contains("1 supportive"));
        let sources = r.sources.unwrap();
        assert_eq!(sources[0].title, "water boils at 100C");
        assert_eq!(sources[1].title, "https://b.test");
    }

    #[test]
    fn grounding_without_references_has_no_sources() {
        let data: GroundingData =
            serde_json::from_value(serde_json::json!({ "reason": "" })).unwrap();
        let r = grounding_result("x".to_string(), data, JinaGroundingProvider::NAME);
        assert!(r.enhanced_content.contains("inconclusive"));
        assert!(r.sources.is_none());
        assert_eq!(r.enhancements.len(), 1);
    }

    #[test]
    fn grounding_timeout_is_raised_to_a_minute() {
        let p = JinaGroundingProvider::new(
            reqwest::Client::new(),
            JinaGroundingProvider::default_config("k"),
        );
        assert_eq!(p.core.http().timeout_ms(), 60_000);
    }
}
